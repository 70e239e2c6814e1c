//! Destructive redaction of a page's content.
//!
//! Committing rewrites the page's content stream so that nothing under a
//! mask survives: glyphs intersecting a mask are cut out of their show
//! operator (the pen still advances by the removed width so surrounding
//! text keeps its position), paths and images are dropped according to
//! their [`OverlapPolicy`], and link annotations over a mask are deleted.
//! Form XObjects that draw masked content are copied and the copy is
//! edited the same way, so other pages and other invocations of the form
//! keep the original. The page content is wrapped in `q`/`Q` and the mask
//! fills are appended on top.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Rect;

use super::scene::{
    box_from, decode_page, inherited, interpret_page, stream_bytes, OpRef, PageScene, ShowPiece,
    TextRun,
};
use super::{resolve, resolve_dict, RedactionAnnotation};

/// What happens to a vector path or image that meets a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Keep it; the fill is painted over it.
    Ignore,
    /// Remove it when a single mask contains its whole bounding box.
    #[default]
    RemoveIfCovered,
    /// Remove it when any mask overlaps its bounding box.
    RemoveIfTouched,
}

impl OverlapPolicy {
    /// Whether an item with bounding box `item` is removed under `masks`.
    pub fn removes(&self, item: &Rect, masks: &[Rect]) -> bool {
        match self {
            OverlapPolicy::Ignore => false,
            OverlapPolicy::RemoveIfCovered => masks.iter().any(|m| m.contains(item)),
            OverlapPolicy::RemoveIfTouched => masks.iter().any(|m| m.intersects(item)),
        }
    }
}

/// Counts of what a commit removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CommitStats {
    pub glyphs: usize,
    pub paths: usize,
    pub images: usize,
    pub forms: usize,
    pub links: usize,
    /// Form XObjects copied so they could be edited for this page only
    pub copied_forms: usize,
}

#[derive(Debug, Clone)]
enum Edit<'s> {
    Remove,
    EndPath,
    Glyphs(&'s TextRun, Vec<bool>),
}

/// Edits grouped by content stream.
///
/// Streams are keyed by the `Do` path that reaches them from the page;
/// the page content itself has the empty path.
#[derive(Debug, Default)]
struct Plan<'s> {
    edits: BTreeMap<Vec<usize>, BTreeMap<usize, Edit<'s>>>,
    forms: BTreeMap<Vec<usize>, ObjectId>,
}

impl<'s> Plan<'s> {
    fn mark(&mut self, op: &OpRef, edit: Edit<'s>) {
        let stream = self.edits.entry(op.forms.clone()).or_default();
        if !matches!(stream.get(&op.index), Some(Edit::Remove)) {
            stream.insert(op.index, edit);
        }
    }

    /// Whether the stream at `path`, or one it invokes, has edits.
    fn touches(&self, path: &[usize]) -> bool {
        self.edits.keys().any(|stream| stream.starts_with(path))
    }
}

/// Apply `annotations` to one page of `doc`.
pub(crate) fn apply(
    doc: &mut Document,
    page_id: ObjectId,
    annotations: &[RedactionAnnotation],
    graphics: OverlapPolicy,
    images: OverlapPolicy,
) -> Result<CommitStats> {
    let ops = decode_page(doc, page_id)?;
    let scene = interpret_page(doc, page_id, &ops);
    let masks: Vec<Rect> = annotations
        .iter()
        .map(|a| a.rect)
        .filter(|r| !r.is_empty() && r.is_finite())
        .collect();

    let mut stats = CommitStats::default();
    let mut plan = Plan::default();

    for run in scene.runs() {
        let hit: Vec<bool> = run
            .glyphs
            .iter()
            .map(|g| masks.iter().any(|m| m.intersects(&g.rect)))
            .collect();
        let removed = hit.iter().filter(|h| **h).count();
        if removed > 0 {
            stats.glyphs += removed;
            plan.mark(&run.op, Edit::Glyphs(run, hit));
        }
    }

    for path in scene.paths() {
        if graphics.removes(&path.rect, &masks) {
            stats.paths += 1;
            plan.mark(&path.op, Edit::EndPath);
        }
    }

    for image in scene.images() {
        if images.removes(&image.rect, &masks) {
            stats.images += 1;
            plan.mark(&image.op, Edit::Remove);
        }
    }

    for form in scene.forms() {
        plan.forms.insert(form.op.invoked(), form.xobject);
        if graphics.removes(&form.rect, &masks) {
            stats.forms += 1;
            plan.mark(&form.op, Edit::Remove);
        }
    }

    let resources = inherited(doc, page_id, b"Resources")
        .and_then(|r| r.as_dict().ok())
        .cloned();
    let mut rewriter = Rewriter {
        plan: &plan,
        copied: 0,
    };
    let mut body = rewriter.rewrite(doc, ops, &[], resources.as_ref())?;
    stats.copied_forms = rewriter.copied;

    let mut out = Vec::with_capacity(body.ops.len() + 2 + masks.len() * 5);
    out.push(Operation::new("q", vec![]));
    out.extend(balance(std::mem::take(&mut body.ops)));
    out.push(Operation::new("Q", vec![]));

    for annotation in annotations {
        let rect = annotation.rect;
        if rect.is_empty() || !rect.is_finite() {
            continue;
        }
        let pdf = scene.to_pdf(&rect);
        let [r, g, b] = annotation.color.to_array();
        out.push(Operation::new("q", vec![]));
        out.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        out.push(Operation::new(
            "re",
            vec![
                Object::Real(pdf.x0),
                Object::Real(pdf.y0),
                Object::Real(pdf.width()),
                Object::Real(pdf.height()),
            ],
        ));
        out.push(Operation::new("f", vec![]));
        out.push(Operation::new("Q", vec![]));
    }

    stats.links = remove_links(doc, page_id, &scene, &masks)?;
    if let Some(resources) = with_xobjects(doc, resources, &body) {
        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Resources", resources);
    }
    replace_content(doc, page_id, out)?;

    Ok(stats)
}

/// Applies a [`Plan`] stream by stream, copying every form it edits.
struct Rewriter<'p, 's> {
    plan: &'p Plan<'s>,
    copied: usize,
}

/// A form copy and the resource name its `Do` now uses.
type Invoked = (Vec<u8>, ObjectId);

/// A rewritten stream and the changes its resources need.
struct Rewritten {
    ops: Vec<Operation>,
    /// Form copies to add
    added: Vec<Invoked>,
    /// XObject names the stream no longer invokes
    dropped: Vec<Vec<u8>>,
}

impl Rewriter<'_, '_> {
    /// Rewrite the operators of the stream at `path`.
    ///
    /// Names of removed images and replaced forms are reported as dropped
    /// so their objects stop being reachable from this stream.
    fn rewrite(
        &mut self,
        doc: &mut Document,
        ops: Vec<Operation>,
        path: &[usize],
        resources: Option<&Dictionary>,
    ) -> Result<Rewritten> {
        let before = invoked_names(&ops);
        let mut edits = self.plan.edits.get(path).cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(ops.len());
        let mut invoked = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            match edits.remove(&i) {
                Some(Edit::Remove) => {}
                Some(Edit::EndPath) => out.push(Operation::new("n", vec![])),
                Some(Edit::Glyphs(run, hit)) => out.extend(rewrite_show(&op, run, &hit)),
                None if op.operator == "Do" => {
                    let mut form_path = path.to_vec();
                    form_path.push(i);
                    let target = self
                        .plan
                        .forms
                        .get(&form_path)
                        .copied()
                        .filter(|_| self.plan.touches(&form_path));
                    match target {
                        Some(form_id) => {
                            let copy = self.copy_form(doc, form_id, &form_path, resources)?;
                            let name = fresh_name(doc, resources, &invoked, self.copied);
                            out.push(Operation::new("Do", vec![Object::Name(name.clone())]));
                            invoked.push((name, copy));
                        }
                        None => out.push(op),
                    }
                }
                None => out.push(op),
            }
        }

        let after = invoked_names(&out);
        let mut dropped: Vec<Vec<u8>> = before.into_iter().filter(|n| !after.contains(n)).collect();
        dropped.dedup();
        Ok(Rewritten {
            ops: out,
            added: invoked,
            dropped,
        })
    }

    /// Store an edited copy of the form at `path` and return its id.
    ///
    /// The original stays untouched for other pages and other invocations.
    fn copy_form(
        &mut self,
        doc: &mut Document,
        form_id: ObjectId,
        path: &[usize],
        parent: Option<&Dictionary>,
    ) -> Result<ObjectId> {
        let original = doc.get_object(form_id)?.as_stream()?.clone();
        let data = stream_bytes(&original)
            .ok_or_else(|| Error::PdfParse("undecodable form content".to_string()))?;
        let ops = Content::decode(&data)
            .map_err(|e| Error::PdfParse(format!("form content: {}", e)))?
            .operations;

        let resources = original
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve_dict(doc, r))
            .cloned()
            .or_else(|| parent.cloned());
        let rewritten = self.rewrite(doc, ops, path, resources.as_ref())?;

        let mut dict = original.dict;
        dict.remove(b"Filter");
        dict.remove(b"DecodeParms");
        dict.remove(b"Length");
        if let Some(resources) = with_xobjects(doc, resources, &rewritten) {
            dict.set("Resources", resources);
        }

        self.copied += 1;
        Ok(doc.add_object(encode_stream(dict, rewritten.ops)?))
    }
}

/// Pick an XObject name not yet used in `resources` or by `taken`.
fn fresh_name(doc: &Document, resources: Option<&Dictionary>, taken: &[Invoked], seed: usize) -> Vec<u8> {
    let existing = resources
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|x| resolve_dict(doc, x));
    (seed..)
        .map(|n| format!("RdFm{}", n).into_bytes())
        .find(|name| {
            !existing.is_some_and(|x| x.has(name)) && !taken.iter().any(|(t, _)| t == name)
        })
        .unwrap_or_default()
}

/// Sorted XObject names invoked by `Do` in `ops`.
fn invoked_names(ops: &[Operation]) -> Vec<Vec<u8>> {
    let mut names: Vec<Vec<u8>> = ops
        .iter()
        .filter(|op| op.operator == "Do")
        .filter_map(|op| op.operands.first()?.as_name().ok().map(<[u8]>::to_vec))
        .collect();
    names.sort();
    names
}

/// `resources` with the form copies added and the dropped names removed,
/// or `None` when the XObject table is unchanged.
fn with_xobjects(doc: &Document, resources: Option<Dictionary>, rewritten: &Rewritten) -> Option<Dictionary> {
    if rewritten.added.is_empty() && rewritten.dropped.is_empty() {
        return None;
    }
    let mut resources = resources.unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|x| resolve_dict(doc, x))
        .cloned()
        .unwrap_or_default();
    for name in &rewritten.dropped {
        xobjects.remove(name);
    }
    for (name, id) in &rewritten.added {
        xobjects.set(name.clone(), Object::Reference(*id));
    }
    resources.set("XObject", xobjects);
    Some(resources)
}

/// Drop unmatched `Q` and close what is left open.
fn balance(ops: Vec<Operation>) -> Vec<Operation> {
    let mut out = Vec::with_capacity(ops.len());
    let mut depth = 0usize;
    for op in ops {
        match op.operator.as_str() {
            "q" => depth += 1,
            // An unmatched Q would pop the wrapper state.
            "Q" if depth == 0 => continue,
            "Q" => depth -= 1,
            _ => {}
        }
        out.push(op);
    }
    out.extend((0..depth).map(|_| Operation::new("Q", vec![])));
    out
}

/// Rebuild a show operator without the glyphs flagged in `hit`.
fn rewrite_show(op: &Operation, run: &TextRun, hit: &[bool]) -> Vec<Operation> {
    let mut array: Vec<Object> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut shift = 0.0f32;

    let flush = |pending: &mut Vec<u8>, array: &mut Vec<Object>| {
        if !pending.is_empty() {
            let format = if run.two_byte {
                StringFormat::Hexadecimal
            } else {
                StringFormat::Literal
            };
            array.push(Object::String(std::mem::take(pending), format));
        }
    };

    for piece in &run.pieces {
        match *piece {
            ShowPiece::Glyph(i) => {
                let glyph = &run.glyphs[i];
                if hit.get(i).copied().unwrap_or(false) {
                    flush(&mut pending, &mut array);
                    shift -= glyph.advance;
                } else {
                    if shift != 0.0 {
                        array.push(Object::Real(shift));
                        shift = 0.0;
                    }
                    pending.extend_from_slice(&glyph.code);
                }
            }
            ShowPiece::Adjust(n) => {
                flush(&mut pending, &mut array);
                shift += n;
            }
        }
    }
    flush(&mut pending, &mut array);
    if shift != 0.0 {
        array.push(Object::Real(shift));
    }

    let show = Operation::new("TJ", vec![Object::Array(array)]);
    match op.operator.as_str() {
        "'" => vec![Operation::new("T*", vec![]), show],
        "\"" => {
            let operand = |k: usize| op.operands.get(k).cloned().unwrap_or(Object::Integer(0));
            vec![
                Operation::new("Tw", vec![operand(0)]),
                Operation::new("Tc", vec![operand(1)]),
                Operation::new("T*", vec![]),
                show,
            ]
        }
        _ => vec![show],
    }
}

fn remove_links(doc: &mut Document, page_id: ObjectId, scene: &PageScene, masks: &[Rect]) -> Result<usize> {
    let annots: Vec<Object> = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Annots").ok().map(|a| resolve(doc, a)) {
            Some(Object::Array(arr)) => arr.clone(),
            _ => return Ok(0),
        }
    };

    let before = annots.len();
    let kept: Vec<Object> = annots
        .into_iter()
        .filter(|annot| !is_masked_link(doc, annot, scene, masks))
        .collect();
    let removed = before - kept.len();

    if removed > 0 {
        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Annots", Object::Array(kept));
    }
    Ok(removed)
}

fn is_masked_link(doc: &Document, annot: &Object, scene: &PageScene, masks: &[Rect]) -> bool {
    let Some(dict) = resolve_dict(doc, annot) else {
        return false;
    };
    let is_link = dict
        .get(b"Subtype")
        .ok()
        .and_then(|s| s.as_name().ok())
        .is_some_and(|s| s == b"Link");
    if !is_link {
        return false;
    }
    dict.get(b"Rect")
        .ok()
        .and_then(|r| box_from(resolve(doc, r)))
        .map(|r| scene.from_pdf(&r))
        .is_some_and(|r| masks.iter().any(|m| m.intersects(&r)))
}

fn encode_stream(mut dict: Dictionary, operations: Vec<Operation>) -> Result<Stream> {
    let encoded = Content { operations }
        .encode()
        .map_err(|e| Error::Encode(format!("content stream: {}", e)))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&encoded)?;
    let compressed = encoder.finish()?;

    dict.set("Filter", "FlateDecode");
    Ok(Stream::new(dict, compressed))
}

fn replace_content(doc: &mut Document, page_id: ObjectId, operations: Vec<Operation>) -> Result<()> {
    let content_id = doc.add_object(encode_stream(Dictionary::new(), operations)?);
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Reference(content_id));
    Ok(())
}
