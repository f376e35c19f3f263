//! Font family/style classification
//!
//! Extracted font names are free-form ("BCDEEE+ArialMT", "g_d0_f1",
//! "Times-Bold", ...). Replacement text is always drawn with one of the
//! twelve PDF standard fonts, picked from the source name and the run's
//! style flags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Style flag bit for italic text.
pub const FLAG_ITALIC: u32 = 2;
/// Style flag bit for serif fonts (reported by extraction, ignored here).
pub const FLAG_SERIF: u32 = 4;
/// Style flag bit for monospaced fonts (reported by extraction, ignored here).
pub const FLAG_MONOSPACE: u32 = 8;
/// Style flag bit for bold text.
pub const FLAG_BOLD: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFamily {
    Sans,
    Serif,
    Monospace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalStyle {
    pub family: FontFamily,
    pub bold: bool,
    pub italic: bool,
}

impl CanonicalStyle {
    pub fn variant(&self) -> FontVariant {
        use FontVariant::*;
        match self.family {
            FontFamily::Sans => match (self.bold, self.italic) {
                (true, true) => SansBoldItalic,
                (true, false) => SansBold,
                (false, true) => SansItalic,
                (false, false) => SansRegular,
            },
            FontFamily::Serif => match (self.bold, self.italic) {
                (true, true) => SerifBoldItalic,
                (true, false) => SerifBold,
                (false, true) => SerifItalic,
                (false, false) => SerifRegular,
            },
            FontFamily::Monospace => match (self.bold, self.italic) {
                (true, true) => MonospaceBoldItalic,
                (true, false) => MonospaceBold,
                (false, true) => MonospaceItalic,
                (false, false) => MonospaceRegular,
            },
        }
    }
}

/// The twelve fonts replacement text can be drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontVariant {
    SansRegular,
    SansBold,
    SansItalic,
    SansBoldItalic,
    SerifRegular,
    SerifBold,
    SerifItalic,
    SerifBoldItalic,
    MonospaceRegular,
    MonospaceBold,
    MonospaceItalic,
    MonospaceBoldItalic,
}

impl FontVariant {
    pub const ALL: [FontVariant; 12] = [
        FontVariant::SansRegular,
        FontVariant::SansBold,
        FontVariant::SansItalic,
        FontVariant::SansBoldItalic,
        FontVariant::SerifRegular,
        FontVariant::SerifBold,
        FontVariant::SerifItalic,
        FontVariant::SerifBoldItalic,
        FontVariant::MonospaceRegular,
        FontVariant::MonospaceBold,
        FontVariant::MonospaceItalic,
        FontVariant::MonospaceBoldItalic,
    ];

    /// Used when a draw with the resolved variant fails.
    pub const FALLBACK: FontVariant = FontVariant::SansRegular;

    /// PDF standard-14 BaseFont name.
    pub fn base_font(self) -> &'static str {
        match self {
            FontVariant::SansRegular => "Helvetica",
            FontVariant::SansBold => "Helvetica-Bold",
            FontVariant::SansItalic => "Helvetica-Oblique",
            FontVariant::SansBoldItalic => "Helvetica-BoldOblique",
            FontVariant::SerifRegular => "Times-Roman",
            FontVariant::SerifBold => "Times-Bold",
            FontVariant::SerifItalic => "Times-Italic",
            FontVariant::SerifBoldItalic => "Times-BoldItalic",
            FontVariant::MonospaceRegular => "Courier",
            FontVariant::MonospaceBold => "Courier-Bold",
            FontVariant::MonospaceItalic => "Courier-Oblique",
            FontVariant::MonospaceBoldItalic => "Courier-BoldOblique",
        }
    }

    pub fn style(self) -> CanonicalStyle {
        use FontVariant::*;
        let family = match self {
            SansRegular | SansBold | SansItalic | SansBoldItalic => FontFamily::Sans,
            SerifRegular | SerifBold | SerifItalic | SerifBoldItalic => FontFamily::Serif,
            _ => FontFamily::Monospace,
        };
        let bold = matches!(
            self,
            SansBold
                | SansBoldItalic
                | SerifBold
                | SerifBoldItalic
                | MonospaceBold
                | MonospaceBoldItalic
        );
        let italic = matches!(
            self,
            SansItalic
                | SansBoldItalic
                | SerifItalic
                | SerifBoldItalic
                | MonospaceItalic
                | MonospaceBoldItalic
        );
        CanonicalStyle {
            family,
            bold,
            italic,
        }
    }
}

impl fmt::Display for FontVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_font())
    }
}

/// Map a source font name to a base family. Checked in priority order, so
/// "Helvetica-Roman" is sans and "TimesMono" is serif.
fn map_font_family(name: &str) -> FontFamily {
    let lower = name.to_lowercase();

    if lower.contains("helv") || lower.contains("arial") || lower.contains("sans") {
        return FontFamily::Sans;
    }

    if lower.contains("times") || lower.contains("roman") {
        return FontFamily::Serif;
    }

    if lower.contains("cour") || lower.contains("mono") {
        return FontFamily::Monospace;
    }

    // Default
    FontFamily::Sans
}

/// Classify a run's font. Bold and italic come from the flags only; style
/// words inside the name are not consulted.
pub fn resolve(font_name: &str, style_flags: u32) -> CanonicalStyle {
    CanonicalStyle {
        family: map_font_family(font_name),
        bold: style_flags & FLAG_BOLD != 0,
        italic: style_flags & FLAG_ITALIC != 0,
    }
}
