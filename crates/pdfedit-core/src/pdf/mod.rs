//! lopdf-backed document engine
//!
//! Coordinates handed out and accepted by this engine are top-left based
//! (y grows downwards from the top of the MediaBox), matching what clients
//! get from extraction. PDF user space is bottom-left based; conversion
//! happens at this boundary only.

mod encoding;
mod fonts;
mod interpreter;

use std::collections::{BTreeMap, HashMap};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::color::{encode, Rgb};
use crate::engine::{DocumentEngine, SaveOptions};
use crate::error::{DrawError, PdfEditError};
use crate::model::{BBox, Point, TextRun};
use crate::style::FontVariant;

use fonts::FontInfo;
use interpreter::{Interpreter, ShownText};

/// Prefix for font resources added when drawing replacement text.
const FONT_RESOURCE_PREFIX: &str = "PdfEdit";
/// Baseline distance between lines of drawn text, as a multiple of the size.
const LINE_SPACING: f64 = 1.2;

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Follow a reference one level; anything else is returned as is.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

pub(crate) fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

#[derive(Debug, Clone, Copy)]
struct PageBox {
    llx: f64,
    ury: f64,
}

impl PageBox {
    fn to_top_left(self, b: &BBox) -> BBox {
        BBox {
            x0: b.x0 - self.llx,
            y0: self.ury - b.y1,
            x1: b.x1 - self.llx,
            y1: self.ury - b.y0,
        }
    }

    fn to_user_space(self, p: Point) -> (f64, f64) {
        (p.x + self.llx, self.ury - p.y)
    }
}

/// An open document plus the edits queued against it.
pub struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    erasures: BTreeMap<usize, Vec<(BBox, Rgb)>>,
    overlays: BTreeMap<usize, Vec<Operation>>,
}

impl LopdfDocument {
    fn page_id(&self, page: usize) -> Result<ObjectId, PdfEditError> {
        self.pages
            .get(page)
            .copied()
            .ok_or(PdfEditError::PageOutOfRange(page, self.pages.len()))
    }

    /// Look a key up on the page, falling back to inherited page tree values.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = self.doc.get_dictionary(page_id).ok();
        let mut depth = 0;
        while let Some(dict) = current {
            if let Ok(value) = dict.get(key) {
                return Some(resolve(&self.doc, value));
            }
            depth += 1;
            if depth > 32 {
                break;
            }
            current = dict
                .get(b"Parent")
                .ok()
                .and_then(|p| p.as_reference().ok())
                .and_then(|id| self.doc.get_dictionary(id).ok());
        }
        None
    }

    fn page_box(&self, page_id: ObjectId) -> PageBox {
        let values: Vec<f64> = self
            .inherited(page_id, b"MediaBox")
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| number(resolve(&self.doc, v)))
                    .collect()
            })
            .unwrap_or_default();
        match values[..] {
            [x0, y0, x1, y1] => PageBox {
                llx: x0.min(x1),
                ury: y0.max(y1),
            },
            // US Letter
            _ => PageBox {
                llx: 0.0,
                ury: 792.0,
            },
        }
    }

    fn page_fonts(&self, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
        let mut fonts = HashMap::new();
        let font_dict = self
            .inherited(page_id, b"Resources")
            .and_then(|r| r.as_dict().ok())
            .and_then(|r| r.get(b"Font").ok())
            .map(|f| resolve(&self.doc, f))
            .and_then(|f| f.as_dict().ok());

        if let Some(font_dict) = font_dict {
            for (name, value) in font_dict.iter() {
                if let Ok(font) = resolve(&self.doc, value).as_dict() {
                    fonts.insert(name.clone(), FontInfo::load(&self.doc, font));
                }
            }
        }
        fonts
    }

    fn page_operations(&self, page_id: ObjectId) -> Result<Vec<Operation>, PdfEditError> {
        let page = self.doc.get_dictionary(page_id)?;
        let mut data = Vec::new();
        let contents = match page.get(b"Contents") {
            Ok(obj) => resolve(&self.doc, obj),
            Err(_) => return Ok(Vec::new()),
        };
        let streams: Vec<&Object> = match contents {
            Object::Array(parts) => parts.iter().map(|p| resolve(&self.doc, p)).collect(),
            other => vec![other],
        };
        for part in streams {
            if let Object::Stream(s) = part {
                data.extend_from_slice(&stream_bytes(s));
                data.push(b'\n');
            }
        }
        let content =
            Content::decode(&data).map_err(|e| PdfEditError::ParseError(e.to_string()))?;
        Ok(content.operations)
    }

    fn shown_text(&self, page_id: ObjectId, ops: &[Operation]) -> Vec<ShownText> {
        let fonts = self.page_fonts(page_id);
        Interpreter::new(&fonts).run(ops)
    }

    /// Make the page's resource dictionary a direct, page-owned dictionary so
    /// it can be changed without touching other pages.
    fn own_resources(&mut self, page_id: ObjectId) -> Result<(), PdfEditError> {
        let mut resources = self
            .inherited(page_id, b"Resources")
            .and_then(|r| r.as_dict().ok())
            .cloned()
            .unwrap_or_default();

        let font = resources
            .get(b"Font")
            .ok()
            .and_then(|f| resolve(&self.doc, f).as_dict().ok())
            .cloned()
            .unwrap_or_default();
        resources.set("Font", Object::Dictionary(font));

        let page = self.doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    }

    /// Register a standard-14 font on the page and return its resource name.
    fn ensure_font(&mut self, page_id: ObjectId, variant: FontVariant) -> Result<Vec<u8>, PdfEditError> {
        let key = format!("{}{}", FONT_RESOURCE_PREFIX, variant.base_font().replace('-', ""));
        let has_font = self
            .doc
            .get_dictionary(page_id)?
            .get(b"Resources")
            .ok()
            .and_then(|r| r.as_dict().ok())
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|f| f.as_dict().ok())
            .map(|f| f.has(key.as_bytes()));

        match has_font {
            Some(true) => return Ok(key.into_bytes()),
            Some(false) => {}
            None => self.own_resources(page_id)?,
        }

        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => variant.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });

        let page = self.doc.get_object_mut(page_id)?.as_dict_mut()?;
        let fonts = page
            .get_mut(b"Resources")?
            .as_dict_mut()?
            .get_mut(b"Font")?
            .as_dict_mut()?;
        fonts.set(key.as_bytes().to_vec(), Object::Reference(font_id));
        Ok(key.into_bytes())
    }

    fn set_page_content(&mut self, page_id: ObjectId, ops: Vec<Operation>) -> Result<(), PdfEditError> {
        let data = Content { operations: ops }
            .encode()
            .map_err(|e| PdfEditError::OperationError(e.to_string()))?;
        let stream_id = self.doc.add_object(Stream::new(Dictionary::new(), data));
        let page = self.doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Contents", Object::Reference(stream_id));
        Ok(())
    }

    /// Move queued drawing operations into the page content, isolated from
    /// whatever graphics state the existing content leaves behind.
    fn flush_overlays(&mut self) -> Result<(), PdfEditError> {
        let overlays = std::mem::take(&mut self.overlays);
        for (page, overlay) in overlays {
            let page_id = self.page_id(page)?;
            let mut ops = vec![Operation::new("q", vec![])];
            ops.extend(self.page_operations(page_id)?);
            ops.push(Operation::new("Q", vec![]));
            ops.extend(overlay);
            self.set_page_content(page_id, ops)?;
        }
        Ok(())
    }
}

/// Replace a text-showing operation with one that moves the text cursor the
/// same distance but paints nothing.
fn blank_out(op: &Operation, shown: &ShownText) -> Vec<Operation> {
    let scale = shown.font_size * shown.h_scale;
    let spacer = if scale != 0.0 {
        let adjust = -shown.advance * 1000.0 / scale;
        vec![Operation::new(
            "TJ",
            vec![Object::Array(vec![Object::Real(adjust as f32)])],
        )]
    } else {
        Vec::new()
    };

    let mut ops = Vec::new();
    match op.operator.as_str() {
        "'" => ops.push(Operation::new("T*", vec![])),
        "\"" => {
            ops.push(Operation::new("Tw", op.operands.first().cloned().into_iter().collect()));
            ops.push(Operation::new("Tc", op.operands.get(1).cloned().into_iter().collect()));
            ops.push(Operation::new("T*", vec![]));
        }
        _ => {}
    }
    ops.extend(spacer);
    ops
}

fn fill_rect(rect: &BBox, page_box: PageBox, fill: Rgb) -> Vec<Operation> {
    let (x, y) = page_box.to_user_space(Point::new(rect.x0, rect.y1));
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "rg",
            vec![
                Object::Real(fill.r),
                Object::Real(fill.g),
                Object::Real(fill.b),
            ],
        ),
        Operation::new(
            "re",
            vec![
                Object::Real(x as f32),
                Object::Real(y as f32),
                Object::Real(rect.width() as f32),
                Object::Real(rect.height() as f32),
            ],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentEngine for LopdfEngine {
    type Handle = LopdfDocument;

    fn open(&self, bytes: &[u8]) -> Result<LopdfDocument, PdfEditError> {
        let doc =
            Document::load_mem(bytes).map_err(|e| PdfEditError::ParseError(e.to_string()))?;
        let pages = doc.get_pages().into_values().collect();
        Ok(LopdfDocument {
            doc,
            pages,
            erasures: BTreeMap::new(),
            overlays: BTreeMap::new(),
        })
    }

    fn page_count(&self, doc: &LopdfDocument) -> usize {
        doc.pages.len()
    }

    fn extract_runs(&self, doc: &LopdfDocument, page: usize) -> Result<Vec<TextRun>, PdfEditError> {
        let page_id = doc.page_id(page)?;
        let page_box = doc.page_box(page_id);
        let ops = doc.page_operations(page_id)?;

        let runs = doc
            .shown_text(page_id, &ops)
            .into_iter()
            .filter(|s| s.size > 0.0)
            .map(|s| TextRun {
                bbox: page_box.to_top_left(&s.bbox),
                text: s.text,
                font: s.font_name,
                size: s.size,
                color: encode(s.color),
                flags: s.flags,
            })
            .collect();
        Ok(runs)
    }

    fn register_erasure(
        &self,
        doc: &mut LopdfDocument,
        page: usize,
        rect: BBox,
        fill: Rgb,
    ) -> Result<(), PdfEditError> {
        doc.page_id(page)?;
        doc.erasures.entry(page).or_default().push((rect, fill));
        Ok(())
    }

    fn apply_erasures(&self, doc: &mut LopdfDocument, page: usize) -> Result<(), PdfEditError> {
        let page_id = doc.page_id(page)?;
        let regions = doc.erasures.remove(&page).unwrap_or_default();
        if regions.is_empty() {
            return Ok(());
        }

        let page_box = doc.page_box(page_id);
        let ops = doc.page_operations(page_id)?;
        let shown = doc.shown_text(page_id, &ops);

        let mut doomed: HashMap<usize, &ShownText> = HashMap::new();
        for s in &shown {
            let center = page_box.to_top_left(&s.bbox).center();
            if regions.iter().any(|(rect, _)| rect.contains(center)) {
                doomed.insert(s.op_index, s);
            }
        }
        tracing::debug!(
            page,
            regions = regions.len(),
            removed = doomed.len(),
            "applying erasures"
        );

        let mut rewritten = Vec::with_capacity(ops.len() + 2 + regions.len() * 5);
        rewritten.push(Operation::new("q", vec![]));
        for (index, op) in ops.iter().enumerate() {
            match doomed.get(&index) {
                Some(shown) => rewritten.extend(blank_out(op, shown)),
                None => rewritten.push(op.clone()),
            }
        }
        rewritten.push(Operation::new("Q", vec![]));
        for (rect, fill) in &regions {
            rewritten.extend(fill_rect(rect, page_box, *fill));
        }

        doc.set_page_content(page_id, rewritten)
    }

    fn draw_text(
        &self,
        doc: &mut LopdfDocument,
        page: usize,
        anchor: Point,
        text: &str,
        variant: FontVariant,
        size: f64,
        color: Rgb,
    ) -> Result<(), DrawError> {
        let lines = text
            .split('\n')
            .map(|line| encoding::encode(&line.trim_end_matches('\r').replace('\t', " ")))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|ch| DrawError::UnsupportedCharacter { ch, variant })?;
        if lines.iter().all(|line| line.is_empty()) {
            return Ok(());
        }

        let page_id = doc
            .page_id(page)
            .map_err(|e| DrawError::Engine(e.to_string()))?;
        let font = doc
            .ensure_font(page_id, variant)
            .map_err(|e| DrawError::Engine(e.to_string()))?;
        let (x, y) = doc.page_box(page_id).to_user_space(anchor);

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font), Object::Real(size as f32)]),
            Operation::new("TL", vec![Object::Real((size * LINE_SPACING) as f32)]),
            Operation::new(
                "rg",
                vec![
                    Object::Real(color.r),
                    Object::Real(color.g),
                    Object::Real(color.b),
                ],
            ),
            Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
        ];
        for (i, line) in lines.into_iter().enumerate() {
            if i > 0 {
                ops.push(Operation::new("T*", vec![]));
            }
            if !line.is_empty() {
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(line, StringFormat::Literal)],
                ));
            }
        }
        ops.push(Operation::new("ET", vec![]));
        ops.push(Operation::new("Q", vec![]));
        doc.overlays.entry(page).or_default().extend(ops);
        Ok(())
    }

    fn serialize(
        &self,
        doc: &mut LopdfDocument,
        options: SaveOptions,
    ) -> Result<Vec<u8>, PdfEditError> {
        doc.flush_overlays()?;

        if options.compact {
            doc.doc.prune_objects();
            doc.doc.renumber_objects();
        }
        if options.compress {
            doc.doc.compress();
        }

        let mut buffer = Vec::new();
        doc.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfEditError::SerializationError(e.to_string()))?;
        Ok(buffer)
    }
}
