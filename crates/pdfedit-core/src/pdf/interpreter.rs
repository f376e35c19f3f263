//! Content stream interpretation
//!
//! Walks page operations tracking just enough graphics and text state to
//! place every text-showing operation in default user space.

use std::collections::HashMap;

use lopdf::content::Operation;
use lopdf::Object;

use super::fonts::FontInfo;
use super::number;
use crate::color::Rgb;
use crate::model::BBox;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    fn from_operands(ops: &[Object]) -> Option<Self> {
        let v: Vec<f64> = ops.iter().take(6).filter_map(number).collect();
        match v[..] {
            [a, b, c, d, e, f] => Some(Matrix { a, b, c, d, e, f }),
            _ => None,
        }
    }

    /// `self` applied first, then `other` (PDF row-vector convention).
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

#[derive(Debug, Clone)]
struct TextParams {
    font: Option<Vec<u8>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    /// Tz / 100
    h_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Rgb,
    text: TextParams,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: Rgb::BLACK,
            text: TextParams::default(),
        }
    }
}

/// One text-showing operation, placed on the page.
#[derive(Debug, Clone)]
pub struct ShownText {
    pub op_index: usize,
    /// Default user space (origin bottom-left).
    pub bbox: BBox,
    pub text: String,
    pub font_name: String,
    pub flags: u32,
    /// Font size scaled by the text and graphics transforms.
    pub size: f64,
    pub color: Rgb,
    /// Horizontal displacement in text space, as `Tj` would advance.
    pub advance: f64,
    /// `Tf` size and `Tz` scale in effect, needed to express `advance` as a `TJ` adjustment.
    pub font_size: f64,
    pub h_scale: f64,
}

enum Piece<'a> {
    Text(&'a [u8]),
    Adjust(f64),
}

pub struct Interpreter<'f> {
    fonts: &'f HashMap<Vec<u8>, FontInfo>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    unknown: HashMap<Vec<u8>, FontInfo>,
}

impl<'f> Interpreter<'f> {
    pub fn new(fonts: &'f HashMap<Vec<u8>, FontInfo>) -> Self {
        Self {
            fonts,
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            unknown: HashMap::new(),
        }
    }

    /// Every text-showing operation with at least one glyph, in order.
    pub fn run(mut self, ops: &[Operation]) -> Vec<ShownText> {
        let mut shown = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            if let Some(s) = self.step(index, op) {
                shown.push(s);
            }
        }
        shown
    }

    fn step(&mut self, index: usize, op: &Operation) -> Option<ShownText> {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(number);

        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "g" => {
                if let Some(level) = num(0) {
                    self.state.fill = Rgb::gray(level as f32);
                }
            }
            "rg" => {
                if let (Some(r), Some(g), Some(b)) = (num(0), num(1), num(2)) {
                    self.state.fill = Rgb::new(r as f32, g as f32, b as f32);
                }
            }
            "k" => {
                if let (Some(c), Some(m), Some(y), Some(k)) = (num(0), num(1), num(2), num(3)) {
                    self.state.fill = Rgb::from_cmyk(c as f32, m as f32, y as f32, k as f32);
                }
            }
            "sc" | "scn" => {
                let comps: Vec<f32> = operands
                    .iter()
                    .filter_map(number)
                    .map(|v| v as f32)
                    .collect();
                match comps[..] {
                    [level] => self.state.fill = Rgb::gray(level),
                    [r, g, b] => self.state.fill = Rgb::new(r, g, b),
                    [c, m, y, k] => self.state.fill = Rgb::from_cmyk(c, m, y, k),
                    _ => {}
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.state.text.font = Some(name.clone());
                }
                if let Some(size) = num(1) {
                    self.state.text.size = size;
                }
            }
            "Tc" => self.state.text.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.state.text.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.state.text.h_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.text.leading = num(0).unwrap_or(0.0),
            "Ts" => self.state.text.rise = num(0).unwrap_or(0.0),
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.state.text.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(0.0, -self.state.text.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    return self.show(index, &[Piece::Text(bytes)]);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let pieces: Vec<Piece> = items
                        .iter()
                        .filter_map(|item| match item {
                            Object::String(bytes, _) => Some(Piece::Text(bytes)),
                            other => number(other).map(Piece::Adjust),
                        })
                        .collect();
                    return self.show(index, &pieces);
                }
            }
            "'" => {
                self.next_line(0.0, -self.state.text.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    return self.show(index, &[Piece::Text(bytes)]);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (num(0), num(1)) {
                    self.state.text.word_spacing = aw;
                    self.state.text.char_spacing = ac;
                }
                self.next_line(0.0, -self.state.text.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    return self.show(index, &[Piece::Text(bytes)]);
                }
            }
            _ => {}
        }
        None
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, index: usize, pieces: &[Piece]) -> Option<ShownText> {
        let params = self.state.text.clone();
        let name = params.font.clone().unwrap_or_default();
        let fonts = self.fonts;
        if !fonts.contains_key(&name) && !self.unknown.contains_key(&name) {
            let info = FontInfo::unknown(&name);
            self.unknown.insert(name.clone(), info);
        }
        let font = fonts.get(&name).or_else(|| self.unknown.get(&name))?;

        let mut advance = 0.0;
        let mut codes = Vec::new();
        for piece in pieces {
            match piece {
                Piece::Text(bytes) => {
                    for code in font.codes(bytes) {
                        let mut w = font.width(code) / 1000.0 * params.size + params.char_spacing;
                        if !font.two_byte && code == 32 {
                            w += params.word_spacing;
                        }
                        advance += w * params.h_scale;
                        codes.push(code);
                    }
                }
                Piece::Adjust(n) => advance -= n / 1000.0 * params.size * params.h_scale,
            }
        }

        let trm = self.tm.then(&self.state.ctm);
        self.tm = Matrix::translate(advance, 0.0).then(&self.tm);

        if codes.is_empty() {
            return None;
        }

        let bottom = font.descent * params.size + params.rise;
        let top = font.ascent * params.size + params.rise;
        let corners = [
            trm.apply(0.0, bottom),
            trm.apply(advance, bottom),
            trm.apply(0.0, top),
            trm.apply(advance, top),
        ];
        if corners.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return None;
        }

        Some(ShownText {
            op_index: index,
            bbox: BBox::enclosing(&corners),
            text: font.decode(&codes),
            font_name: font.name.clone(),
            flags: font.flags,
            size: params.size * trm.c.hypot(trm.d),
            color: self.state.fill,
            advance,
            font_size: params.size,
            h_scale: params.h_scale,
        })
    }
}
