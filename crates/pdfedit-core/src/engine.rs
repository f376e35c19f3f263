//! Document engine seam
//!
//! The commit pipeline only talks to documents through this trait. Handles
//! are released by dropping them, so every early return closes the document.

use crate::color::Rgb;
use crate::error::{DrawError, PdfEditError};
use crate::model::{BBox, Point, TextRun};
use crate::style::FontVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Drop unreachable objects and renumber the rest.
    pub compact: bool,
    /// Deflate streams.
    pub compress: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compact: true,
            compress: true,
        }
    }
}

pub trait DocumentEngine {
    type Handle;

    fn open(&self, bytes: &[u8]) -> Result<Self::Handle, PdfEditError>;

    fn page_count(&self, doc: &Self::Handle) -> usize;

    /// Text runs of a page in content order. Coordinates are top-left based.
    fn extract_runs(&self, doc: &Self::Handle, page: usize) -> Result<Vec<TextRun>, PdfEditError>;

    /// Queue a region for removal; nothing changes until `apply_erasures`.
    fn register_erasure(
        &self,
        doc: &mut Self::Handle,
        page: usize,
        rect: BBox,
        fill: Rgb,
    ) -> Result<(), PdfEditError>;

    /// Remove text under every queued region of `page` and paint the regions.
    fn apply_erasures(&self, doc: &mut Self::Handle, page: usize) -> Result<(), PdfEditError>;

    /// Draw `text` with its baseline starting at `anchor`.
    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &self,
        doc: &mut Self::Handle,
        page: usize,
        anchor: Point,
        text: &str,
        variant: FontVariant,
        size: f64,
        color: Rgb,
    ) -> Result<(), DrawError>;

    fn serialize(&self, doc: &mut Self::Handle, options: SaveOptions)
        -> Result<Vec<u8>, PdfEditError>;
}
