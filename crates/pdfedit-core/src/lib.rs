//! In-place text replacement for PDF documents
//!
//! Clients extract the text runs of a page, queue replacements keyed by the
//! run's bounding box, and commit them in one go. A commit erases every
//! targeted region first and only then draws the new text, using one of the
//! standard PDF fonts picked to match the original style.
//!
//! The PDF work sits behind [`DocumentEngine`]; [`LopdfEngine`] implements it
//! with `lopdf`.

pub mod color;
pub mod commit;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod pdf;
pub mod session;
pub mod style;

pub use color::{PackedColor, Rgb};
pub use commit::{
    commit, commit_session, extract_first_page, CommitMetrics, CommitOutput, DrawStatus,
    EditOutcome,
};
pub use engine::{DocumentEngine, SaveOptions};
pub use error::{DrawError, PdfEditError};
pub use ledger::EditLedger;
pub use model::{BBox, Edit, Point, RunSnapshot, TextRun};
pub use pdf::{LopdfDocument, LopdfEngine};
pub use session::{
    Admission, MemorySessionStore, Session, SessionConfig, SessionId, SessionInfo, SessionStore,
};
pub use style::{resolve, CanonicalStyle, FontFamily, FontVariant};
