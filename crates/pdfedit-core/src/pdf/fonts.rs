//! Font resource metrics and text decoding
//!
//! Only what extraction needs: glyph widths for positioning, ascent/descent
//! for the run's vertical extent, a readable font name, style flags and a
//! code -> Unicode mapping.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use super::{number, resolve, stream_bytes};
use crate::style::{FLAG_BOLD, FLAG_ITALIC, FLAG_MONOSPACE, FLAG_SERIF};

const DEFAULT_ASCENT: f64 = 0.8;
const DEFAULT_DESCENT: f64 = -0.2;

// Font descriptor flag bits (PDF 32000-1, table 123)
const FD_FIXED_PITCH: i64 = 1;
const FD_SERIF: i64 = 1 << 1;
const FD_ITALIC: i64 = 1 << 6;
const FD_FORCE_BOLD: i64 = 1 << 18;

#[derive(Debug, Clone)]
enum Widths {
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: f64,
    },
    Cid {
        default: f64,
        widths: HashMap<u32, f64>,
    },
}

#[derive(Debug, Clone)]
pub struct FontInfo {
    /// BaseFont without the subset tag.
    pub name: String,
    pub flags: u32,
    pub two_byte: bool,
    /// Em fractions.
    pub ascent: f64,
    pub descent: f64,
    widths: Widths,
    /// Named base encoding of a simple font.
    encoding: &'static str,
    to_unicode: Option<HashMap<u32, String>>,
}

impl FontInfo {
    /// Metrics for a `Tf` name that is missing from the page resources.
    pub fn unknown(resource_name: &[u8]) -> Self {
        let name = String::from_utf8_lossy(resource_name).to_string();
        Self {
            flags: name_flags(&name),
            widths: Widths::Simple {
                first_char: 0,
                widths: Vec::new(),
                missing: default_width(&name, false),
            },
            name,
            two_byte: false,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
            encoding: WIN_ANSI,
            to_unicode: None,
        }
    }

    pub fn load(doc: &Document, font: &Dictionary) -> Self {
        let base = font
            .get(b"BaseFont")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();
        let name = strip_subset_tag(&base).to_string();

        let subtype = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .unwrap_or_default();
        let two_byte = subtype == b"Type0";

        // Type0 keeps metrics on its descendant CIDFont
        let metrics_dict = if two_byte {
            font.get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok())
                .unwrap_or(font)
        } else {
            font
        };

        let descriptor = metrics_dict
            .get(b"FontDescriptor")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok());

        let descriptor_flags = descriptor
            .and_then(|d| d.get(b"Flags").ok())
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        let fixed_pitch = descriptor_flags & FD_FIXED_PITCH != 0;

        let mut flags = name_flags(&name);
        if fixed_pitch {
            flags |= FLAG_MONOSPACE;
        }
        if descriptor_flags & FD_SERIF != 0 {
            flags |= FLAG_SERIF;
        }
        if descriptor_flags & FD_ITALIC != 0 {
            flags |= FLAG_ITALIC;
        }
        if descriptor_flags & FD_FORCE_BOLD != 0 {
            flags |= FLAG_BOLD;
        }

        let metric = |key: &[u8]| {
            descriptor
                .and_then(|d| d.get(key).ok())
                .and_then(|o| number(resolve(doc, o)))
        };
        let ascent = metric(b"Ascent")
            .filter(|a| *a > 0.0)
            .map(|a| a / 1000.0)
            .unwrap_or(DEFAULT_ASCENT);
        let descent = metric(b"Descent")
            .filter(|d| *d < 0.0)
            .map(|d| d / 1000.0)
            .unwrap_or(DEFAULT_DESCENT);

        let widths = if two_byte {
            load_cid_widths(doc, metrics_dict)
        } else {
            let fallback = metric(b"MissingWidth")
                .filter(|w| *w > 0.0)
                .unwrap_or_else(|| default_width(&name, fixed_pitch));
            load_simple_widths(doc, font, fallback)
        };

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
            .map(|s| parse_to_unicode(&stream_bytes(s)))
            .filter(|m| !m.is_empty());

        Self {
            encoding: simple_encoding(doc, font, subtype),
            name,
            flags,
            two_byte,
            ascent,
            descent,
            widths,
            to_unicode,
        }
    }

    /// Split a shown string into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| match c {
                    [hi, lo] => (*hi as u32) << 8 | *lo as u32,
                    [b] => *b as u32,
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|&b| b as u32).collect()
        }
    }

    /// Glyph width in thousandths of an em.
    pub fn width(&self, code: u32) -> f64 {
        match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Cid { default, widths } => widths.get(&code).copied().unwrap_or(*default),
        }
    }

    pub fn decode(&self, codes: &[u32]) -> String {
        let mut out = String::new();
        for &code in codes {
            if let Some(mapped) = self.to_unicode.as_ref().and_then(|m| m.get(&code)) {
                out.push_str(mapped);
            } else if self.two_byte {
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            } else {
                let decoded = Document::decode_text(Some(self.encoding), &[code as u8]);
                if decoded.is_empty() {
                    out.push('\u{FFFD}');
                } else {
                    out.push_str(&decoded);
                }
            }
        }
        out
    }
}

const STANDARD: &str = "StandardEncoding";
const WIN_ANSI: &str = "WinAnsiEncoding";
const NAMED_ENCODINGS: [&str; 4] = [
    STANDARD,
    WIN_ANSI,
    "MacRomanEncoding",
    "MacExpertEncoding",
];

/// Base encoding of a simple font: the `Encoding` name, or the
/// `BaseEncoding` of an encoding dictionary. Without either, Type1 fonts
/// use their built-in StandardEncoding.
fn simple_encoding(doc: &Document, font: &Dictionary, subtype: &[u8]) -> &'static str {
    let named = |obj: &Object| {
        obj.as_name()
            .ok()
            .and_then(|n| NAMED_ENCODINGS.iter().find(|e| e.as_bytes() == n))
            .copied()
    };
    let declared = font.get(b"Encoding").ok().map(|o| resolve(doc, o)).and_then(|o| match o {
        Object::Dictionary(d) => d.get(b"BaseEncoding").ok().and_then(|b| named(resolve(doc, b))),
        other => named(other),
    });
    declared.unwrap_or(match subtype {
        b"Type1" | b"MMType1" => STANDARD,
        _ => WIN_ANSI,
    })
}

/// "BCDEEE+ArialMT" -> "ArialMT"
fn strip_subset_tag(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => {
            rest
        }
        _ => name,
    }
}

fn name_flags(name: &str) -> u32 {
    let lower = name.to_lowercase();
    let mut flags = 0;
    if lower.contains("italic") || lower.contains("oblique") {
        flags |= FLAG_ITALIC;
    }
    if lower.contains("bold") || lower.contains("black") || lower.contains("heavy") {
        flags |= FLAG_BOLD;
    }
    if lower.contains("courier") || lower.contains("mono") {
        flags |= FLAG_MONOSPACE;
    }
    if lower.contains("times") || (lower.contains("serif") && !lower.contains("sans")) {
        flags |= FLAG_SERIF;
    }
    flags
}

fn default_width(name: &str, fixed_pitch: bool) -> f64 {
    let lower = name.to_lowercase();
    if fixed_pitch || lower.contains("courier") || lower.contains("mono") {
        600.0
    } else {
        500.0
    }
}

fn load_simple_widths(doc: &Document, font: &Dictionary, missing: f64) -> Widths {
    let first_char = font
        .get(b"FirstChar")
        .ok()
        .and_then(|o| resolve(doc, o).as_i64().ok())
        .unwrap_or(0)
        .max(0) as u32;
    let widths = font
        .get(b"Widths")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .map(|arr| {
            arr.iter()
                .map(|w| number(resolve(doc, w)).unwrap_or(missing))
                .collect()
        })
        .unwrap_or_default();
    Widths::Simple {
        first_char,
        widths,
        missing,
    }
}

/// CIDFont `W` array: `c [w1 w2 ...]` and `c_first c_last w` entries.
fn load_cid_widths(doc: &Document, cid_font: &Dictionary) -> Widths {
    let default = cid_font
        .get(b"DW")
        .ok()
        .and_then(|o| number(resolve(doc, o)))
        .unwrap_or(1000.0);
    let mut widths = HashMap::new();

    let entries = cid_font
        .get(b"W")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok());

    if let Some(entries) = entries {
        let mut i = 0;
        while i < entries.len() {
            let Some(first) = number(resolve(doc, &entries[i])) else {
                break;
            };
            let first = first as u32;
            match entries.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, w) in list.iter().enumerate() {
                        let Some(code) = u32::try_from(offset)
                            .ok()
                            .and_then(|o| first.checked_add(o))
                        else {
                            break;
                        };
                        if let Some(w) = number(resolve(doc, w)) {
                            widths.insert(code, w);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let last = number(last).unwrap_or(first as f64) as u32;
                    let w = entries
                        .get(i + 2)
                        .and_then(|o| number(resolve(doc, o)))
                        .unwrap_or(default);
                    for code in first..=last.min(first.saturating_add(0xFFFF)) {
                        widths.insert(code, w);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    Widths::Cid { default, widths }
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                i += 1;
                let mut digits = Vec::new();
                while i < data.len() && data[i] != b'>' {
                    if data[i].is_ascii_hexdigit() {
                        digits.push(data[i]);
                    }
                    i += 1;
                }
                i += 1;
                if digits.len() % 2 == 1 {
                    digits.push(b'0');
                }
                let bytes = digits
                    .chunks(2)
                    .filter_map(|pair| {
                        std::str::from_utf8(pair)
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok())
                    })
                    .collect();
                tokens.push(Token::Hex(bytes));
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'(' => {
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !b"<>[]()%".contains(&data[i])
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                } else {
                    tokens.push(Token::Word(
                        String::from_utf8_lossy(&data[start..i]).to_string(),
                    ));
                }
            }
        }
    }
    tokens
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| match c {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [b] => *b as u16,
            _ => 0,
        })
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or('\u{FFFD}'))
        .collect()
}

/// Code -> text mapping from a ToUnicode CMap (`bfchar` and `bfrange`).
fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Char,
        Range,
    }

    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut section = Section::None;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == "beginbfchar" => section = Section::Char,
            Token::Word(w) if w == "beginbfrange" => section = Section::Range,
            Token::Word(w) if w == "endbfchar" || w == "endbfrange" => section = Section::None,
            Token::Hex(src) if section == Section::Char => {
                if let Some(Token::Hex(dst)) = tokens.get(i + 1) {
                    map.insert(code_of(src), utf16_string(dst));
                    i += 1;
                }
            }
            Token::Hex(lo) if section == Section::Range => {
                let (Some(Token::Hex(hi)), Some(dst)) = (tokens.get(i + 1), tokens.get(i + 2))
                else {
                    break;
                };
                let (lo, hi) = (code_of(lo), code_of(hi));
                let hi = hi.min(lo.saturating_add(0xFFFF));
                match dst {
                    Token::Hex(start) => {
                        let mut units: Vec<u16> = start
                            .chunks(2)
                            .map(|c| match c {
                                [a, b] => u16::from_be_bytes([*a, *b]),
                                [a] => *a as u16,
                                _ => 0,
                            })
                            .collect();
                        for code in lo..=hi {
                            map.insert(
                                code,
                                char::decode_utf16(units.iter().copied())
                                    .map(|r| r.unwrap_or('\u{FFFD}'))
                                    .collect(),
                            );
                            if let Some(last) = units.last_mut() {
                                *last = last.wrapping_add(1);
                            }
                        }
                        i += 2;
                    }
                    Token::ArrayStart => {
                        let mut j = i + 3;
                        let mut code = Some(lo);
                        while let Some(Token::Hex(item)) = tokens.get(j) {
                            if let Some(c) = code.filter(|c| *c <= hi) {
                                map.insert(c, utf16_string(item));
                            }
                            code = code.and_then(|c| c.checked_add(1));
                            j += 1;
                        }
                        // j sits on the closing bracket
                        i = j;
                    }
                    _ => i += 2,
                }
            }
            _ => {}
        }
        i += 1;
    }

    map
}
