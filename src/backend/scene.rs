//! Content-stream interpretation.
//!
//! A page's operators are replayed against a minimal graphics state to
//! produce a display list in page space: positioned glyphs, painted paths,
//! placed images and form XObjects. Every item remembers which operator
//! produced it, and through which chain of form invocations, so the
//! redaction pass can rewrite exactly that operator.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::color::FillColor;
use crate::error::{Error, Result};
use crate::geometry::{Matrix, Rect};

use super::fonts::{decode_text_simple, FontMetrics, ASCENT, DESCENT};
use super::raster::FillRule;
use super::{get_number, resolve, resolve_dict, PageGeometry};

const MAX_FORM_DEPTH: usize = 4;
const CURVE_STEPS: usize = 8;
// Zero-width glyphs still get a sliver of box so they can be hit.
const MIN_GLYPH_WIDTH: f32 = 0.05;
const MIN_STROKE_WIDTH: f32 = 0.5;
const LETTER_BOX: Rect = Rect::new(0.0, 0.0, 612.0, 792.0);

/// The operator an item came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpRef {
    /// Index into the operator list of the stream that drew the item
    pub index: usize,
    /// Indices of the `Do` operators leading from the page content to that
    /// stream; empty for the page content itself
    pub forms: Vec<usize>,
}

impl OpRef {
    pub fn is_nested(&self) -> bool {
        !self.forms.is_empty()
    }

    /// Path of the stream a `Do` at this position invokes.
    pub fn invoked(&self) -> Vec<usize> {
        let mut path = self.forms.clone();
        path.push(self.index);
        path
    }
}

/// One shown character code.
#[derive(Debug, Clone)]
pub(crate) struct Glyph {
    pub text: String,
    pub rect: Rect,
    pub code: Vec<u8>,
    /// Total advance in thousandths of text space, as a `TJ` adjustment
    /// would express it (character and word spacing included).
    pub advance: f32,
}

/// Layout of a show operator's operand, in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ShowPiece {
    Glyph(usize),
    Adjust(f32),
}

#[derive(Debug, Clone)]
pub(crate) struct TextRun {
    pub op: OpRef,
    pub glyphs: Vec<Glyph>,
    pub pieces: Vec<ShowPiece>,
    /// Font size after every transform, in page units
    pub font_size: f32,
    pub color: FillColor,
    pub invisible: bool,
    pub two_byte: bool,
}

impl TextRun {
    pub fn rect(&self) -> Rect {
        self.glyphs
            .iter()
            .fold(Rect::default(), |acc, g| acc.union(&g.rect))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PaintedPath {
    pub op: OpRef,
    pub rect: Rect,
    pub subpaths: Vec<Vec<(f32, f32)>>,
    pub fill: Option<(FillColor, FillRule)>,
    pub stroke: Option<(FillColor, f32)>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlacedImage {
    pub op: OpRef,
    pub rect: Rect,
    /// Maps the image unit square to page space
    pub transform: Matrix,
    pub xobject: ObjectId,
}

#[derive(Debug, Clone)]
pub(crate) struct PlacedForm {
    pub op: OpRef,
    pub rect: Rect,
    pub xobject: ObjectId,
}

#[derive(Debug, Clone)]
pub(crate) enum SceneItem {
    Text(TextRun),
    Path(PaintedPath),
    Image(PlacedImage),
    Form(PlacedForm),
}

/// Display list of one page, in painting order.
#[derive(Debug, Clone)]
pub(crate) struct PageScene {
    pub geometry: PageGeometry,
    pub frame: PageFrame,
    pub items: Vec<SceneItem>,
}

impl PageScene {
    pub fn runs(&self) -> impl Iterator<Item = &TextRun> {
        self.items.iter().filter_map(|item| match item {
            SceneItem::Text(run) => Some(run),
            _ => None,
        })
    }

    pub fn paths(&self) -> impl Iterator<Item = &PaintedPath> {
        self.items.iter().filter_map(|item| match item {
            SceneItem::Path(path) => Some(path),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &PlacedImage> {
        self.items.iter().filter_map(|item| match item {
            SceneItem::Image(image) => Some(image),
            _ => None,
        })
    }

    pub fn forms(&self) -> impl Iterator<Item = &PlacedForm> {
        self.items.iter().filter_map(|item| match item {
            SceneItem::Form(form) => Some(form),
            _ => None,
        })
    }

    /// Convert a page-space rectangle to native PDF coordinates.
    pub fn to_pdf(&self, rect: &Rect) -> Rect {
        self.frame.to_pdf().apply_rect(rect)
    }

    /// Convert a native PDF rectangle to page space.
    pub fn from_pdf(&self, rect: &Rect) -> Rect {
        self.frame.to_page().apply_rect(rect)
    }
}

/// Visible page box and the rotation a viewer applies to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PageFrame {
    /// Visible page box in native PDF coordinates
    pub page_box: Rect,
    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotate: u16,
}

impl PageFrame {
    pub fn of(doc: &Document, page_id: ObjectId) -> Self {
        let rotate = inherited(doc, page_id, b"Rotate")
            .and_then(|r| r.as_i64().ok())
            .map(|r| r.rem_euclid(360))
            .filter(|r| r % 90 == 0)
            .unwrap_or(0) as u16;
        Self {
            page_box: page_box(doc, page_id),
            rotate,
        }
    }

    /// Size of the page as displayed.
    pub fn geometry(&self) -> PageGeometry {
        let (w, h) = (self.page_box.width(), self.page_box.height());
        if self.rotate % 180 == 90 {
            PageGeometry { width: h, height: w }
        } else {
            PageGeometry { width: w, height: h }
        }
    }

    /// Native PDF space to page space: shift to the box origin, flip y,
    /// then turn clockwise by the page rotation.
    pub fn to_page(&self) -> Matrix {
        let b = self.page_box;
        let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, -b.x0, b.y1);
        let (w, h) = (b.width(), b.height());
        let turn = match self.rotate {
            90 => Matrix::new(0.0, 1.0, -1.0, 0.0, h, 0.0),
            180 => Matrix::new(-1.0, 0.0, 0.0, -1.0, w, h),
            270 => Matrix::new(0.0, -1.0, 1.0, 0.0, 0.0, w),
            _ => Matrix::IDENTITY,
        };
        flip.then(&turn)
    }

    /// Page space back to native PDF space.
    pub fn to_pdf(&self) -> Matrix {
        // Flips and quarter turns are never singular.
        self.to_page().invert().unwrap_or(Matrix::IDENTITY)
    }
}

/// Decode the operators of a page's (possibly split) content.
pub(crate) fn decode_page(doc: &Document, page_id: ObjectId) -> Result<Vec<Operation>> {
    let data = page_content(doc, page_id)?;
    Content::decode(&data)
        .map(|content| content.operations)
        .map_err(|e| Error::PdfParse(format!("content stream: {}", e)))
}

/// Interpret decoded page operators into a display list.
pub(crate) fn interpret_page(doc: &Document, page_id: ObjectId, ops: &[Operation]) -> PageScene {
    let frame = PageFrame::of(doc, page_id);
    let resources = inherited(doc, page_id, b"Resources").and_then(|r| match r {
        Object::Dictionary(d) => Some(d),
        _ => None,
    });

    let mut interpreter = Interpreter {
        doc,
        items: Vec::new(),
    };
    interpreter.run(ops, resources, GraphicsState::new(frame.to_page()), &[], 0);

    PageScene {
        geometry: frame.geometry(),
        frame,
        items: interpreter.items,
    }
}

/// Visible page box: CropBox clipped to MediaBox, US Letter if neither
/// is usable.
fn page_box(doc: &Document, page_id: ObjectId) -> Rect {
    let media = inherited(doc, page_id, b"MediaBox").and_then(box_from);
    let crop = inherited(doc, page_id, b"CropBox").and_then(box_from);

    match (crop, media) {
        (Some(crop), Some(media)) => {
            let visible = crop.intersection(&media);
            if visible.is_empty() {
                media
            } else {
                visible
            }
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => LETTER_BOX,
    }
}

/// Look up a page attribute, walking up the page tree when absent.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    // Bounded so a cyclic /Parent chain cannot loop forever.
    for _ in 0..64 {
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        dict = dict.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p))?;
    }
    None
}

pub(crate) fn box_from(obj: &Object) -> Option<Rect> {
    let arr = obj.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let n: Vec<f32> = arr.iter().filter_map(get_number).collect();
    if n.len() != 4 {
        return None;
    }
    let rect = Rect::new(n[0], n[1], n[2], n[3]).normalize();
    (!rect.is_empty() && rect.is_finite()).then_some(rect)
}

/// Raw bytes of a stream, decompressed when it declares a filter.
pub(crate) fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page_dict = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::PdfParse(e.to_string()))?;

    let Ok(contents) = page_dict.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let parts: Vec<&Object> = match resolve(doc, contents) {
        Object::Array(arr) => arr.iter().collect(),
        other => vec![other],
    };

    let mut content = Vec::new();
    for part in parts {
        match resolve(doc, part) {
            Object::Stream(s) => {
                let data = stream_bytes(s)
                    .ok_or_else(|| Error::PdfParse("undecodable content stream".to_string()))?;
                content.extend_from_slice(&data);
                content.push(b'\n');
            }
            Object::Null => {}
            _ => return Err(Error::PdfParse("invalid content stream".to_string())),
        }
    }
    Ok(content)
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Vec<u8>>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: FillColor,
    stroke: FillColor,
    line_width: f32,
    text: TextState,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill: FillColor::BLACK,
            stroke: FillColor::BLACK,
            line_width: 1.0,
            text: TextState::default(),
        }
    }
}

struct LoadedFont<'a> {
    dict: &'a Dictionary,
    metrics: FontMetrics,
}

fn load_fonts<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
) -> BTreeMap<Vec<u8>, LoadedFont<'a>> {
    let mut fonts = BTreeMap::new();
    let Some(font_dict) = resources
        .and_then(|r| r.get(b"Font").ok())
        .and_then(|f| resolve_dict(doc, f))
    else {
        return fonts;
    };

    for (name, value) in font_dict.iter() {
        if let Some(dict) = resolve_dict(doc, value) {
            fonts.insert(
                name.clone(),
                LoadedFont {
                    dict,
                    metrics: FontMetrics::from_dict(doc, dict),
                },
            );
        }
    }
    fonts
}

#[derive(Debug, Default)]
struct PathBuilder {
    subpaths: Vec<Vec<(f32, f32)>>,
    current: Vec<(f32, f32)>,
}

impl PathBuilder {
    fn move_to(&mut self, p: (f32, f32)) {
        self.flush();
        self.current.push(p);
    }

    fn line_to(&mut self, p: (f32, f32)) {
        self.current.push(p);
    }

    fn curve_to(&mut self, c1: (f32, f32), c2: (f32, f32), p: (f32, f32)) {
        let p0 = self.current.last().copied().unwrap_or(p);
        for step in 1..=CURVE_STEPS {
            let t = step as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let a = mt * mt * mt;
            let b = 3.0 * mt * mt * t;
            let c = 3.0 * mt * t * t;
            let d = t * t * t;
            self.current.push((
                a * p0.0 + b * c1.0 + c * c2.0 + d * p.0,
                a * p0.1 + b * c1.1 + c * c2.1 + d * p.1,
            ));
        }
    }

    fn close(&mut self) {
        if let Some(&start) = self.current.first() {
            self.current.push(start);
            self.flush();
            self.current.push(start);
        }
    }

    fn rect(&mut self, corners: [(f32, f32); 4]) {
        self.flush();
        self.current.extend_from_slice(&corners);
        self.current.push(corners[0]);
        self.flush();
    }

    fn current_point(&self) -> Option<(f32, f32)> {
        self.current.last().copied()
    }

    fn flush(&mut self) {
        if self.current.len() >= 2 {
            self.subpaths.push(std::mem::take(&mut self.current));
        } else {
            self.current.clear();
        }
    }

    fn take(&mut self) -> Vec<Vec<(f32, f32)>> {
        self.flush();
        std::mem::take(&mut self.subpaths)
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
    items: Vec<SceneItem>,
}

impl<'a> Interpreter<'a> {
    fn run(
        &mut self,
        ops: &[Operation],
        resources: Option<&'a Dictionary>,
        initial: GraphicsState,
        forms: &[usize],
        depth: usize,
    ) {
        let fonts = load_fonts(self.doc, resources);
        let xobjects = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| resolve_dict(self.doc, x));

        let mut gs = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut tm = Matrix::IDENTITY;
        let mut tlm = Matrix::IDENTITY;
        let mut path = PathBuilder::default();

        for (i, op) in ops.iter().enumerate() {
            let origin = OpRef {
                index: i,
                forms: forms.to_vec(),
            };
            let num = |k: usize| op.operands.get(k).and_then(get_number).unwrap_or(0.0);

            match op.operator.as_str() {
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(&op.operands) {
                        gs.ctm = m.then(&gs.ctm);
                    }
                }
                "w" => gs.line_width = num(0),
                "g" | "rg" | "k" | "sc" | "scn" => {
                    if let Some(color) = color_from(&op.operands) {
                        gs.fill = color;
                    }
                }
                "G" | "RG" | "K" | "SC" | "SCN" => {
                    if let Some(color) = color_from(&op.operands) {
                        gs.stroke = color;
                    }
                }
                "cs" => gs.fill = FillColor::BLACK,
                "CS" => gs.stroke = FillColor::BLACK,

                "BT" => {
                    tm = Matrix::IDENTITY;
                    tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        gs.text.font = Some(name.clone());
                    }
                    gs.text.size = num(1);
                }
                "Tc" => gs.text.char_spacing = num(0),
                "Tw" => gs.text.word_spacing = num(0),
                "Tz" => gs.text.horizontal_scale = num(0) / 100.0,
                "TL" => gs.text.leading = num(0),
                "Ts" => gs.text.rise = num(0),
                "Tr" => gs.text.render_mode = num(0) as i64,
                "Td" | "TD" => {
                    let (tx, ty) = (num(0), num(1));
                    if op.operator == "TD" {
                        gs.text.leading = -ty;
                    }
                    tlm = Matrix::translate(tx, ty).then(&tlm);
                    tm = tlm;
                }
                "Tm" => {
                    if let Some(m) = matrix_from(&op.operands) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translate(0.0, -gs.text.leading).then(&tlm);
                    tm = tlm;
                }
                "Tj" => {
                    self.show(&gs, &mut tm, &fonts, &op.operands[..op.operands.len().min(1)], origin)
                }
                "TJ" => {
                    if let Some(Object::Array(elements)) = op.operands.first() {
                        self.show(&gs, &mut tm, &fonts, elements, origin);
                    }
                }
                "'" => {
                    tlm = Matrix::translate(0.0, -gs.text.leading).then(&tlm);
                    tm = tlm;
                    self.show(&gs, &mut tm, &fonts, &op.operands[..op.operands.len().min(1)], origin);
                }
                "\"" => {
                    gs.text.word_spacing = num(0);
                    gs.text.char_spacing = num(1);
                    tlm = Matrix::translate(0.0, -gs.text.leading).then(&tlm);
                    tm = tlm;
                    if let Some(string) = op.operands.get(2) {
                        self.show(&gs, &mut tm, &fonts, std::slice::from_ref(string), origin);
                    }
                }

                "m" => path.move_to(gs.ctm.apply(num(0), num(1))),
                "l" => path.line_to(gs.ctm.apply(num(0), num(1))),
                "c" => path.curve_to(
                    gs.ctm.apply(num(0), num(1)),
                    gs.ctm.apply(num(2), num(3)),
                    gs.ctm.apply(num(4), num(5)),
                ),
                "v" => {
                    let end = gs.ctm.apply(num(2), num(3));
                    let start = path.current_point().unwrap_or(end);
                    path.curve_to(start, gs.ctm.apply(num(0), num(1)), end);
                }
                "y" => {
                    let end = gs.ctm.apply(num(2), num(3));
                    path.curve_to(gs.ctm.apply(num(0), num(1)), end, end);
                }
                "h" => path.close(),
                "re" => {
                    let (x, y, w, h) = (num(0), num(1), num(2), num(3));
                    path.rect([
                        gs.ctm.apply(x, y),
                        gs.ctm.apply(x + w, y),
                        gs.ctm.apply(x + w, y + h),
                        gs.ctm.apply(x, y + h),
                    ]);
                }
                "f" | "F" | "f*" | "S" | "s" | "B" | "B*" | "b" | "b*" | "n" => {
                    self.paint(&gs, &mut path, op.operator.as_str(), origin)
                }

                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.place_xobject(name, xobjects, resources, &gs, origin, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn show(
        &mut self,
        gs: &GraphicsState,
        tm: &mut Matrix,
        fonts: &BTreeMap<Vec<u8>, LoadedFont<'a>>,
        elements: &[Object],
        origin: OpRef,
    ) {
        let loaded = gs.text.font.as_ref().and_then(|name| fonts.get(name));
        let fallback = FontMetrics::fallback();
        let metrics = loaded.map(|f| &f.metrics).unwrap_or(&fallback);
        let encoding = loaded.and_then(|f| f.dict.get_font_encoding(self.doc).ok());

        let ts = &gs.text;
        let size = ts.size;
        let th = ts.horizontal_scale;
        let glyph_space = Matrix::new(size * th, 0.0, 0.0, size, 0.0, ts.rise);

        let mut glyphs = Vec::new();
        let mut pieces = Vec::new();

        for element in elements {
            match element {
                Object::String(bytes, _) => {
                    for code in metrics.split_codes(bytes) {
                        let w0 = metrics.width(code);
                        let trm = glyph_space.then(tm).then(&gs.ctm);
                        let rect =
                            trm.apply_rect(&Rect::new(0.0, DESCENT, w0.max(MIN_GLYPH_WIDTH), ASCENT));

                        let text = match &encoding {
                            Some(enc) => Document::decode_text(enc, code)
                                .unwrap_or_else(|_| decode_text_simple(code)),
                            None => decode_text_simple(code),
                        };

                        let word_spacing = if !metrics.is_two_byte() && matches!(code, [32]) {
                            ts.word_spacing
                        } else {
                            0.0
                        };
                        let spacing = ts.char_spacing + word_spacing;
                        *tm = Matrix::translate((w0 * size + spacing) * th, 0.0).then(tm);

                        let advance = if size != 0.0 {
                            w0 * 1000.0 + spacing * 1000.0 / size
                        } else {
                            0.0
                        };

                        pieces.push(ShowPiece::Glyph(glyphs.len()));
                        glyphs.push(Glyph {
                            text,
                            rect,
                            code: code.to_vec(),
                            advance,
                        });
                    }
                }
                other => {
                    if let Some(n) = get_number(other) {
                        *tm = Matrix::translate(-n / 1000.0 * size * th, 0.0).then(tm);
                        pieces.push(ShowPiece::Adjust(n));
                    }
                }
            }
        }

        if pieces.is_empty() {
            return;
        }

        let font_size = (size * tm.then(&gs.ctm).scale_factor()).abs();
        self.items.push(SceneItem::Text(TextRun {
            op: origin,
            glyphs,
            pieces,
            font_size,
            color: gs.fill,
            invisible: matches!(ts.render_mode, 3 | 7),
            two_byte: metrics.is_two_byte(),
        }));
    }

    fn paint(&mut self, gs: &GraphicsState, path: &mut PathBuilder, operator: &str, origin: OpRef) {
        let (close, fill, stroke) = match operator {
            "f" | "F" => (false, Some(FillRule::NonZero), false),
            "f*" => (false, Some(FillRule::EvenOdd), false),
            "S" => (false, None, true),
            "s" => (true, None, true),
            "B" => (false, Some(FillRule::NonZero), true),
            "B*" => (false, Some(FillRule::EvenOdd), true),
            "b" => (true, Some(FillRule::NonZero), true),
            "b*" => (true, Some(FillRule::EvenOdd), true),
            _ => (false, None, false),
        };

        if close {
            path.close();
        }
        let subpaths = path.take();
        if subpaths.is_empty() || (fill.is_none() && !stroke) {
            return;
        }

        let width = (gs.line_width * gs.ctm.scale_factor()).max(MIN_STROKE_WIDTH);
        let Some(mut rect) = Rect::bounding(subpaths.iter().flatten().copied()) else {
            return;
        };
        if stroke {
            rect = rect.inflate(width / 2.0);
        }

        self.items.push(SceneItem::Path(PaintedPath {
            op: origin,
            rect,
            subpaths,
            fill: fill.map(|rule| (gs.fill, rule)),
            stroke: stroke.then_some((gs.stroke, width)),
        }));
    }

    fn place_xobject(
        &mut self,
        name: &[u8],
        xobjects: Option<&'a Dictionary>,
        resources: Option<&'a Dictionary>,
        gs: &GraphicsState,
        origin: OpRef,
        depth: usize,
    ) {
        let doc = self.doc;
        let Some(Object::Reference(id)) = xobjects.and_then(|x| x.get(name).ok()) else {
            return;
        };
        let Ok(Object::Stream(stream)) = doc.get_object(*id) else {
            return;
        };
        let subtype = stream.dict.get(b"Subtype").ok().and_then(|o| o.as_name().ok());

        match subtype {
            Some(b"Image") => {
                self.items.push(SceneItem::Image(PlacedImage {
                    op: origin,
                    rect: gs.ctm.apply_rect(&Rect::new(0.0, 0.0, 1.0, 1.0)),
                    transform: gs.ctm,
                    xobject: *id,
                }));
            }
            Some(b"Form") => {
                if depth >= MAX_FORM_DEPTH {
                    log::debug!("Form XObject nesting too deep; skipping");
                    return;
                }
                let matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| resolve(doc, m).as_array().ok())
                    .and_then(|m| matrix_from(m))
                    .unwrap_or(Matrix::IDENTITY);
                let ctm = matrix.then(&gs.ctm);
                let rect = stream
                    .dict
                    .get(b"BBox")
                    .ok()
                    .and_then(|b| box_from(resolve(doc, b)))
                    .map(|bbox| ctm.apply_rect(&bbox))
                    .unwrap_or_default();

                let invoked = origin.invoked();
                self.items.push(SceneItem::Form(PlacedForm {
                    op: origin,
                    rect,
                    xobject: *id,
                }));

                let Some(data) = stream_bytes(stream) else {
                    return;
                };
                let Ok(content) = Content::decode(&data) else {
                    log::debug!("Undecodable Form XObject content; skipping");
                    return;
                };
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| resolve_dict(doc, r))
                    .or(resources);

                let mut state = gs.clone();
                state.ctm = ctm;
                self.run(&content.operations, form_resources, state, &invoked, depth + 1);
            }
            _ => {}
        }
    }
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let n: Vec<f32> = operands.iter().take(6).filter_map(get_number).collect();
    (n.len() == 6).then(|| Matrix::new(n[0], n[1], n[2], n[3], n[4], n[5]))
}

fn color_from(operands: &[Object]) -> Option<FillColor> {
    let n: Vec<f32> = operands.iter().filter_map(get_number).collect();
    match n.len() {
        1 => Some(FillColor::new(n[0], n[0], n[0])),
        3 => Some(FillColor::new(n[0], n[1], n[2])),
        4 => {
            let k = 1.0 - n[3];
            Some(FillColor::new(
                (1.0 - n[0]) * k,
                (1.0 - n[1]) * k,
                (1.0 - n[2]) * k,
            ))
        }
        _ => None,
    }
}
