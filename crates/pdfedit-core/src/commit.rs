//! Two-pass commit: erase every edited region, then draw the replacements.
//!
//! All erasures are applied before anything is drawn so that the white fill
//! of one edit can never cover the new text of an adjacent edit.

use std::time::Instant;

use serde::Serialize;

use crate::color::{decode, Rgb};
use crate::engine::{DocumentEngine, SaveOptions};
use crate::error::PdfEditError;
use crate::model::{BBox, Edit, TextRun};
use crate::session::{SessionId, SessionStore};
use crate::style::{resolve, FontVariant};

/// Only the first page is edited.
const PAGE: usize = 0;

/// Erased regions grow by this many points on every side.
const ERASE_MARGIN: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrawStatus {
    Drawn { variant: FontVariant },
    FellBack { requested: FontVariant, reason: String },
    Dropped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOutcome {
    pub bbox: BBox,
    pub new_text: String,
    #[serde(flatten)]
    pub status: DrawStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub drawn: usize,
    pub fell_back: usize,
    pub dropped: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CommitOutput {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub outcomes: Vec<EditOutcome>,
    pub metrics: CommitMetrics,
}

/// Apply `edits` to page 0 of `source` and serialize the result.
pub fn commit<E: DocumentEngine>(
    engine: &E,
    source: &[u8],
    original_filename: &str,
    edits: &[Edit],
) -> Result<CommitOutput, PdfEditError> {
    if edits.is_empty() {
        return Err(PdfEditError::EmptyLedger);
    }
    let start = Instant::now();

    let mut doc = engine.open(source)?;
    let pages = engine.page_count(&doc);
    if pages == 0 {
        return Err(PdfEditError::PageOutOfRange(PAGE, pages));
    }

    for edit in edits {
        let region = edit.bbox_key.inflate(ERASE_MARGIN);
        engine.register_erasure(&mut doc, PAGE, region, Rgb::WHITE)?;
    }
    engine.apply_erasures(&mut doc, PAGE)?;
    tracing::debug!(count = edits.len(), "erased edited regions");

    let outcomes: Vec<EditOutcome> = edits
        .iter()
        .map(|edit| EditOutcome {
            bbox: edit.bbox_key,
            new_text: edit.new_text.clone(),
            status: draw_edit(engine, &mut doc, edit),
        })
        .collect();

    let bytes = engine.serialize(&mut doc, SaveOptions::default())?;

    let mut metrics = CommitMetrics {
        input_size_bytes: source.len(),
        output_size_bytes: bytes.len(),
        processing_time_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    };
    for outcome in &outcomes {
        match outcome.status {
            DrawStatus::Drawn { .. } => metrics.drawn += 1,
            DrawStatus::FellBack { .. } => metrics.fell_back += 1,
            DrawStatus::Dropped { .. } => metrics.dropped += 1,
        }
    }
    tracing::debug!(
        drawn = metrics.drawn,
        fell_back = metrics.fell_back,
        dropped = metrics.dropped,
        bytes = metrics.output_size_bytes,
        "commit finished"
    );

    Ok(CommitOutput {
        filename: format!("edited_{}", original_filename),
        bytes,
        outcomes,
        metrics,
    })
}

fn draw_edit<E: DocumentEngine>(engine: &E, doc: &mut E::Handle, edit: &Edit) -> DrawStatus {
    let variant = resolve(&edit.font_name, edit.style_flags).variant();
    let color = decode(edit.color);
    let anchor = edit.bbox_key.bottom_left();

    let size = edit.font_size;

    let first = match engine.draw_text(doc, PAGE, anchor, &edit.new_text, variant, size, color) {
        Ok(()) => return DrawStatus::Drawn { variant },
        Err(e) => e.to_string(),
    };

    if variant == FontVariant::FALLBACK {
        tracing::warn!(text = %edit.new_text, error = %first, "dropping edit");
        return DrawStatus::Dropped { reason: first };
    }

    let fallback = FontVariant::FALLBACK;
    match engine.draw_text(doc, PAGE, anchor, &edit.new_text, fallback, size, color) {
        Ok(()) => {
            tracing::warn!(
                text = %edit.new_text,
                requested = %variant,
                error = %first,
                "drew edit with fallback font"
            );
            DrawStatus::FellBack {
                requested: variant,
                reason: first,
            }
        }
        Err(e) => {
            tracing::warn!(text = %edit.new_text, error = %e, "dropping edit");
            DrawStatus::Dropped {
                reason: format!("{}; fallback: {}", first, e),
            }
        }
    }
}

/// Commit the ledger of a stored session while holding its lock.
pub fn commit_session<S, E>(
    store: &S,
    engine: &E,
    id: &SessionId,
) -> Result<CommitOutput, PdfEditError>
where
    S: SessionStore,
    E: DocumentEngine,
{
    store.with_lock(id, |session| {
        if session.ledger.is_empty() {
            return Err(PdfEditError::EmptyLedger);
        }
        let source = std::fs::read(&session.source_path)?;
        tracing::info!(
            session_id = %session.id,
            edits = session.ledger.len(),
            "committing session"
        );
        commit(engine, &source, &session.filename, &session.ledger.snapshot_ordered())
    })?
}

/// Text runs of the first page.
pub fn extract_first_page<E: DocumentEngine>(
    engine: &E,
    bytes: &[u8],
) -> Result<Vec<TextRun>, PdfEditError> {
    let doc = engine.open(bytes)?;
    let pages = engine.page_count(&doc);
    if pages == 0 {
        return Err(PdfEditError::PageOutOfRange(PAGE, pages));
    }
    engine.extract_runs(&doc, PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PackedColor;
    use crate::error::DrawError;
    use crate::model::{Point, RunSnapshot};
    use crate::pdf::tests::{create_test_pdf, TestLine};
    use crate::pdf::LopdfEngine;
    use crate::session::{MemorySessionStore, SessionStore};
    use crate::style::{FLAG_BOLD, FLAG_SERIF};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::Write;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Open,
        Register(BBox),
        Apply,
        Draw(String, FontVariant),
        Serialize,
    }

    /// Records every engine call; drawing fails for texts listed in `reject`
    /// unless the fallback variant is used, and always for `reject_all`.
    #[derive(Default)]
    struct RecordingEngine {
        calls: RefCell<Vec<Call>>,
        reject: Vec<&'static str>,
        reject_all: Vec<&'static str>,
        pages: usize,
    }

    impl RecordingEngine {
        fn new() -> Self {
            Self {
                pages: 1,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }
    }

    impl DocumentEngine for RecordingEngine {
        type Handle = ();

        fn open(&self, _bytes: &[u8]) -> Result<(), PdfEditError> {
            self.calls.borrow_mut().push(Call::Open);
            Ok(())
        }

        fn page_count(&self, _doc: &()) -> usize {
            self.pages
        }

        fn extract_runs(&self, _doc: &(), _page: usize) -> Result<Vec<TextRun>, PdfEditError> {
            Ok(Vec::new())
        }

        fn register_erasure(
            &self,
            _doc: &mut (),
            _page: usize,
            rect: BBox,
            fill: Rgb,
        ) -> Result<(), PdfEditError> {
            assert_eq!(fill, Rgb::WHITE);
            self.calls.borrow_mut().push(Call::Register(rect));
            Ok(())
        }

        fn apply_erasures(&self, _doc: &mut (), _page: usize) -> Result<(), PdfEditError> {
            self.calls.borrow_mut().push(Call::Apply);
            Ok(())
        }

        fn draw_text(
            &self,
            _doc: &mut (),
            _page: usize,
            _anchor: Point,
            text: &str,
            variant: FontVariant,
            _size: f64,
            _color: Rgb,
        ) -> Result<(), DrawError> {
            self.calls
                .borrow_mut()
                .push(Call::Draw(text.to_string(), variant));
            let listed = |list: &[&str]| list.iter().any(|t| *t == text);
            let rejected = listed(&self.reject_all)
                || (listed(&self.reject) && variant != FontVariant::FALLBACK);
            if rejected {
                let ch = text.chars().next().unwrap_or(' ');
                return Err(DrawError::UnsupportedCharacter { ch, variant });
            }
            Ok(())
        }

        fn serialize(&self, _doc: &mut (), _options: SaveOptions) -> Result<Vec<u8>, PdfEditError> {
            self.calls.borrow_mut().push(Call::Serialize);
            Ok(b"%PDF-fake".to_vec())
        }
    }

    fn bbox(x0: f64, y0: f64, x1: f64, y1: f64) -> BBox {
        BBox::new(x0, y0, x1, y1).unwrap()
    }

    fn edit(b: BBox, text: &str, font: &str, flags: u32) -> Edit {
        Edit::new(
            b,
            text,
            RunSnapshot {
                font: font.to_string(),
                flags,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_empty_ledger_touches_nothing() {
        let engine = RecordingEngine::new();
        let result = commit(&engine, b"whatever", "a.pdf", &[]);
        assert!(matches!(result, Err(PdfEditError::EmptyLedger)));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_erasures_precede_draws() {
        let engine = RecordingEngine::new();
        let a = bbox(10.0, 10.0, 50.0, 22.0);
        let b = bbox(50.0, 10.0, 90.0, 22.0);
        let edits = vec![
            edit(a, "left", "Helvetica", 0),
            edit(b, "right", "Times-Roman", 0),
        ];

        let out = commit(&engine, b"src", "doc.pdf", &edits).unwrap();
        assert_eq!(out.filename, "edited_doc.pdf");
        assert_eq!(out.bytes, b"%PDF-fake");
        assert_eq!(
            engine.calls(),
            vec![
                Call::Open,
                Call::Register(a.inflate(1.0)),
                Call::Register(b.inflate(1.0)),
                Call::Apply,
                Call::Draw("left".into(), FontVariant::SansRegular),
                Call::Draw("right".into(), FontVariant::SerifRegular),
                Call::Serialize,
            ]
        );
        assert_eq!(out.metrics.drawn, 2);
        assert_eq!(out.metrics.input_size_bytes, 3);
    }

    #[test]
    fn test_failed_draw_falls_back_without_aborting() {
        let engine = RecordingEngine {
            reject: vec!["bad"],
            ..RecordingEngine::new()
        };
        let edits = vec![
            edit(bbox(0.0, 0.0, 10.0, 10.0), "bad", "Times", FLAG_BOLD),
            edit(bbox(20.0, 0.0, 30.0, 10.0), "good", "Courier", 0),
        ];

        let out = commit(&engine, b"src", "doc.pdf", &edits).unwrap();
        assert_eq!(
            out.outcomes[0].status,
            DrawStatus::FellBack {
                requested: FontVariant::SerifBold,
                reason: "Character 'b' cannot be rendered with Times-Bold".into(),
            }
        );
        assert_eq!(
            out.outcomes[1].status,
            DrawStatus::Drawn {
                variant: FontVariant::MonospaceRegular
            }
        );
        let draws: Vec<Call> = engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Draw(..)))
            .collect();
        assert_eq!(
            draws,
            vec![
                Call::Draw("bad".into(), FontVariant::SerifBold),
                Call::Draw("bad".into(), FontVariant::SansRegular),
                Call::Draw("good".into(), FontVariant::MonospaceRegular),
            ]
        );
        assert_eq!(out.metrics.fell_back, 1);
        assert_eq!(out.metrics.drawn, 1);
    }

    #[test]
    fn test_fallback_failure_drops_edit() {
        let engine = RecordingEngine {
            reject_all: vec!["nope"],
            ..RecordingEngine::new()
        };
        let edits = vec![
            edit(bbox(0.0, 0.0, 10.0, 10.0), "nope", "Courier", 0),
            // already the fallback variant: no second attempt
            edit(bbox(20.0, 0.0, 30.0, 10.0), "nope", "Helvetica", 0),
        ];
        let out = commit(&engine, b"src", "doc.pdf", &edits).unwrap();
        assert!(out
            .outcomes
            .iter()
            .all(|o| matches!(o.status, DrawStatus::Dropped { .. })));
        let draws = engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Draw(..)))
            .count();
        assert_eq!(draws, 3);
        assert_eq!(out.metrics.dropped, 2);
    }

    #[test]
    fn test_document_without_pages() {
        let engine = RecordingEngine {
            pages: 0,
            ..RecordingEngine::new()
        };
        let edits = vec![edit(bbox(0.0, 0.0, 1.0, 1.0), "x", "", 0)];
        assert!(matches!(
            commit(&engine, b"src", "a.pdf", &edits),
            Err(PdfEditError::PageOutOfRange(0, 0))
        ));
        assert!(matches!(
            extract_first_page(&engine, b"src"),
            Err(PdfEditError::PageOutOfRange(0, 0))
        ));
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = EditOutcome {
            bbox: bbox(1.0, 2.0, 3.0, 4.0),
            new_text: "hi".into(),
            status: DrawStatus::FellBack {
                requested: FontVariant::SerifBold,
                reason: "r".into(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "fell_back");
        assert_eq!(json["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(json["reason"], "r");
    }

    fn adjacent_pdf() -> Vec<u8> {
        create_test_pdf(&[
            TestLine {
                text: "Alpha",
                x: 72,
                y: 700,
                size: 12,
            },
            TestLine {
                text: "Beta",
                x: 104,
                y: 700,
                size: 12,
            },
            TestLine {
                text: "Untouched",
                x: 72,
                y: 600,
                size: 12,
            },
        ])
    }

    #[test]
    fn test_adjacent_edits_both_visible() {
        let engine = LopdfEngine::new();
        let source = adjacent_pdf();
        let runs = extract_first_page(&engine, &source).unwrap();
        assert_eq!(runs.len(), 3);

        let edits: Vec<Edit> = runs[..2]
            .iter()
            .zip(["First", "Second"])
            .map(|(run, text)| Edit::new(run.bbox, text, RunSnapshot::from(run)))
            .collect();
        let out = commit(&engine, &source, "letter.pdf", &edits).unwrap();
        assert_eq!(out.metrics.drawn, 2);

        let after = extract_first_page(&engine, &out.bytes).unwrap();
        let mut texts: Vec<&str> = after.iter().map(|r| r.text.as_str()).collect();
        texts.sort();
        assert_eq!(texts, vec!["First", "Second", "Untouched"]);

        let second = after.iter().find(|r| r.text == "Second").unwrap();
        assert_eq!(second.color, runs[1].color);
        assert_eq!(second.font, "Helvetica");
    }

    #[test]
    fn test_multiline_replacement_is_drawn() {
        let engine = LopdfEngine::new();
        let source = adjacent_pdf();
        let runs = extract_first_page(&engine, &source).unwrap();

        let edits = vec![Edit::new(
            runs[2].bbox,
            "12 Main St\nSpringfield",
            RunSnapshot::from(&runs[2]),
        )];
        let out = commit(&engine, &source, "letter.pdf", &edits).unwrap();
        assert_eq!(out.metrics.drawn, 1);
        assert_eq!(out.metrics.dropped, 0);

        let after = extract_first_page(&engine, &out.bytes).unwrap();
        let texts: Vec<&str> = after.iter().map(|r| r.text.as_str()).collect();
        assert!(texts.contains(&"12 Main St"));
        assert!(texts.contains(&"Springfield"));
        assert!(!texts.contains(&"Untouched"));
    }

    #[test]
    fn test_style_carried_into_drawn_text() {
        let engine = LopdfEngine::new();
        let source = adjacent_pdf();
        let runs = extract_first_page(&engine, &source).unwrap();

        let snapshot = RunSnapshot {
            font: "Times New Roman".into(),
            flags: FLAG_SERIF | FLAG_BOLD,
            color: PackedColor::new(0x336699).unwrap(),
            ..RunSnapshot::from(&runs[2])
        };
        let edits = vec![Edit::new(runs[2].bbox, "Styled", snapshot)];
        let out = commit(&engine, &source, "letter.pdf", &edits).unwrap();

        let after = extract_first_page(&engine, &out.bytes).unwrap();
        let styled = after.iter().find(|r| r.text == "Styled").unwrap();
        assert_eq!(styled.font, "Times-Bold");
        assert_eq!(styled.color.value(), 0x336699);
        assert!(!after.iter().any(|r| r.text == "Untouched"));
    }

    #[test]
    fn test_commit_session_reads_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&adjacent_pdf())
            .unwrap();

        let engine = LopdfEngine::new();
        let store = MemorySessionStore::default();
        let id = store.create("src.pdf".into(), path).id;

        assert!(matches!(
            commit_session(&store, &engine, &id),
            Err(PdfEditError::EmptyLedger)
        ));

        store
            .with_lock(&id, |s| {
                s.ledger.upsert(Edit::new(
                    bbox(72.0, 80.0, 100.0, 95.0),
                    "Replaced",
                    RunSnapshot::default(),
                ))
            })
            .unwrap();
        let out = commit_session(&store, &engine, &id).unwrap();
        assert_eq!(out.filename, "edited_src.pdf");
        assert_eq!(out.outcomes.len(), 1);
        // the session survives a commit
        assert_eq!(store.get(&id).unwrap().edit_count, 1);

        let missing = SessionId::from("missing");
        assert!(matches!(
            commit_session(&store, &engine, &missing),
            Err(PdfEditError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_commit_session_missing_file() {
        let engine = LopdfEngine::new();
        let store = MemorySessionStore::default();
        let id = store.create("gone.pdf".into(), "/nonexistent/gone.pdf".into()).id;
        store
            .with_lock(&id, |s| {
                s.ledger
                    .upsert(Edit::new(bbox(0.0, 0.0, 1.0, 1.0), "x", RunSnapshot::default()))
            })
            .unwrap();
        assert!(matches!(
            commit_session(&store, &engine, &id),
            Err(PdfEditError::Io(_))
        ));
    }
}
