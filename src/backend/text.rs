//! Line, word and search views over a page's text runs.

use crate::geometry::Rect;

use super::scene::{PageScene, TextRun};
use super::{TextLine, Word};

// A horizontal gap wider than this (in em) between glyphs reads as a space.
const SPACE_GAP_EM: f32 = 0.2;
// Runs further apart than this (in em) start a new line, e.g. across columns.
const MAX_RUN_GAP_EM: f32 = 3.0;
const MIN_VERTICAL_OVERLAP: f32 = 0.5;

/// One text line with the box of every character.
///
/// Spaces inferred from glyph gaps carry no box.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineLayout {
    pub rect: Rect,
    pub chars: Vec<(char, Option<Rect>)>,
    font_size: f32,
}

impl LineLayout {
    pub fn text(&self) -> String {
        self.chars.iter().map(|(c, _)| *c).collect()
    }

    pub fn to_text_line(&self) -> TextLine {
        TextLine {
            rect: self.rect,
            text: self.text(),
        }
    }

    fn accepts(&self, run_rect: &Rect, font_size: f32) -> bool {
        let overlap = self.rect.y1.min(run_rect.y1) - self.rect.y0.max(run_rect.y0);
        let min_height = self.rect.height().min(run_rect.height());
        if min_height <= 0.0 || overlap < MIN_VERTICAL_OVERLAP * min_height {
            return false;
        }
        let size = self.font_size.max(font_size).max(1.0);
        let gap = run_rect.x0 - self.rect.x1;
        gap > -size && gap <= MAX_RUN_GAP_EM * size
    }

    fn push_run(&mut self, run: &TextRun) {
        let threshold = SPACE_GAP_EM * run.font_size;

        for glyph in run.glyphs.iter().filter(|g| !g.text.is_empty()) {
            let last = self.chars.last().map(|(c, _)| *c);
            let last_rect = self.chars.iter().rev().find_map(|(_, r)| *r);

            if let (Some(prev_char), Some(prev_rect)) = (last, last_rect) {
                let gap = glyph.rect.x0 - prev_rect.x1;
                let first = glyph.text.chars().next().unwrap_or(' ');
                let spaceless = is_spaceless_script_char(prev_char) && is_spaceless_script_char(first);
                if gap > threshold
                    && !prev_char.is_whitespace()
                    && !first.is_whitespace()
                    && !spaceless
                {
                    self.chars.push((' ', None));
                }
            }

            self.chars
                .extend(glyph.text.chars().map(|c| (c, Some(glyph.rect))));
            self.rect = self.rect.union(&glyph.rect);
        }
        self.font_size = self.font_size.max(run.font_size);
    }

    /// Whitespace-delimited words with their boxes.
    pub fn words(&self) -> Vec<Word> {
        let mut words = Vec::new();
        let mut text = String::new();
        let mut rect = Rect::default();

        for (c, r) in &self.chars {
            match r {
                Some(r) if !c.is_whitespace() => {
                    text.push(*c);
                    rect = rect.union(r);
                }
                _ => {
                    if !text.is_empty() {
                        words.push(Word {
                            rect,
                            text: std::mem::take(&mut text),
                        });
                    }
                    rect = Rect::default();
                }
            }
        }
        if !text.is_empty() {
            words.push(Word { rect, text });
        }
        words
    }

    /// Boxes of every non-overlapping case-insensitive occurrence.
    pub fn find(&self, needle: &[char]) -> Vec<Rect> {
        let mut hits = Vec::new();
        if needle.is_empty() || needle.len() > self.chars.len() {
            return hits;
        }

        let mut i = 0;
        while i + needle.len() <= self.chars.len() {
            let window = &self.chars[i..i + needle.len()];
            let matched = window
                .iter()
                .zip(needle)
                .all(|((c, _), n)| chars_match(*c, *n));

            if matched {
                let rect = window
                    .iter()
                    .filter_map(|(_, r)| *r)
                    .fold(Rect::default(), |acc, r| acc.union(&r));
                if !rect.is_empty() {
                    hits.push(rect);
                }
                i += needle.len();
            } else {
                i += 1;
            }
        }
        hits
    }
}

/// Group runs into lines, in content order.
pub(crate) fn build_lines(scene: &PageScene) -> Vec<LineLayout> {
    let mut lines: Vec<LineLayout> = Vec::new();

    for run in scene.runs() {
        if run.glyphs.iter().all(|g| g.text.is_empty()) {
            continue;
        }
        let rect = run.rect();
        match lines.last_mut() {
            Some(line) if line.accepts(&rect, run.font_size) => line.push_run(run),
            _ => {
                let mut line = LineLayout::default();
                line.push_run(run);
                lines.push(line);
            }
        }
    }

    lines.retain(|line| !line.text().trim().is_empty());
    lines
}

/// Case-insensitive search over every line.
pub(crate) fn search(lines: &[LineLayout], needle: &str) -> Vec<Rect> {
    let needle: Vec<char> = needle.chars().collect();
    lines.iter().flat_map(|line| line.find(&needle)).collect()
}

fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Scripts written without spaces between words. Hangul is excluded.
fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x20000..=0x2EBEF).contains(&code)
        // Hiragana and Katakana
        || (0x3040..=0x30FF).contains(&code)
        // CJK symbols and punctuation
        || (0x3000..=0x303F).contains(&code)
}
