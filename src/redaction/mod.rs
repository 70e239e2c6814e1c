//! Redaction orchestration.
//!
//! Both modes work in two phases. First every mask is planned into a
//! [`RedactionQueue`] using read-only provider queries; then the queue is
//! handed to the provider and each touched page is committed once. The
//! outcome is summarized in a [`RedactionReport`].

mod auto;
mod manual;

use std::collections::BTreeMap;

use serde::Serialize;

pub use auto::AutoRedactor;
pub use manual::{ManualBox, ManualRedactor, SkipReason, SkippedBox};

pub use crate::backend::RedactionAnnotation;
use crate::backend::DocumentProvider;
use crate::error::Result;
use crate::geometry::Rect;
use crate::pii::PiiKind;

/// Annotations planned for commit, grouped by page in page order.
#[derive(Debug, Clone, Default)]
pub struct RedactionQueue {
    pages: BTreeMap<usize, Vec<RedactionAnnotation>>,
}

impl RedactionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `annotation` on `page`.
    pub fn push(&mut self, page: usize, annotation: RedactionAnnotation) {
        self.pages.entry(page).or_default().push(annotation);
    }

    /// Total number of queued annotations.
    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pages with at least one annotation.
    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    /// Annotations queued on `page`.
    pub fn annotations(&self, page: usize) -> &[RedactionAnnotation] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Queue everything on `provider` and commit page by page.
    pub fn commit<P>(self, provider: &mut P) -> Result<Vec<PageReport>>
    where
        P: DocumentProvider + ?Sized,
    {
        let mut reports = Vec::with_capacity(self.pages.len());

        for (page, annotations) in self.pages {
            for annotation in annotations {
                provider.queue_redaction(page, annotation)?;
            }
            let masks = provider.commit_redactions(page)?;
            log::debug!("Committed {} masks on page {}", masks.len(), page);
            reports.push(PageReport { page, masks });
        }

        Ok(reports)
    }
}

/// Masks committed on one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    /// Zero-based page index
    pub page: usize,
    /// Every mask applied, in queue order
    pub masks: Vec<RedactionAnnotation>,
}

/// What a redaction run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedactionReport {
    /// Committed masks per page
    pub pages: Vec<PageReport>,
    /// Flagged text lines per kind
    pub detections: BTreeMap<PiiKind, usize>,
    /// Keyword hits from page-wide search
    pub keyword_hits: usize,
    /// Manual boxes that were not applied
    pub skipped_boxes: Vec<SkippedBox>,
}

impl RedactionReport {
    /// Total number of committed masks.
    pub fn mask_count(&self) -> usize {
        self.pages.iter().map(|p| p.masks.len()).sum()
    }

    /// Number of flagged lines over all kinds.
    pub fn detection_count(&self) -> usize {
        self.detections.values().sum()
    }

    /// Every committed mask with its page.
    pub fn masks(&self) -> impl Iterator<Item = (usize, &RedactionAnnotation)> + '_ {
        self.pages
            .iter()
            .flat_map(|p| p.masks.iter().map(move |m| (p.page, m)))
    }

    /// Whether some committed mask on `page` fully contains `rect`.
    pub fn covers(&self, page: usize, rect: &Rect) -> bool {
        self.masks()
            .any(|(p, mask)| p == page && mask.rect.contains(rect))
    }

    pub(crate) fn record_detection(&mut self, kind: PiiKind) {
        *self.detections.entry(kind).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::FillColor;

    #[test]
    fn test_queue_groups_pages_in_order() {
        let mut queue = RedactionQueue::new();
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        queue.push(2, RedactionAnnotation::new(rect, FillColor::WHITE));
        queue.push(0, RedactionAnnotation::new(rect, FillColor::BLACK));
        queue.push(2, RedactionAnnotation::new(rect, FillColor::BLACK));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pages().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(queue.annotations(2).len(), 2);
        assert!(queue.annotations(1).is_empty());
    }

    #[test]
    fn test_report_coverage() {
        let mut report = RedactionReport::default();
        report.pages.push(PageReport {
            page: 0,
            masks: vec![RedactionAnnotation::new(
                Rect::new(10.0, 10.0, 100.0, 30.0),
                FillColor::WHITE,
            )],
        });
        report.record_detection(PiiKind::Email);
        report.record_detection(PiiKind::Email);

        assert!(report.covers(0, &Rect::new(12.0, 12.0, 90.0, 28.0)));
        assert!(!report.covers(0, &Rect::new(5.0, 12.0, 90.0, 28.0)));
        assert!(!report.covers(1, &Rect::new(12.0, 12.0, 90.0, 28.0)));
        assert_eq!(report.mask_count(), 1);
        assert_eq!(report.detections[&PiiKind::Email], 2);
        assert_eq!(report.detection_count(), 2);
    }

    #[test]
    fn test_report_serializes_kinds_as_keys() {
        let mut report = RedactionReport::default();
        report.record_detection(PiiKind::ProfileLink);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["detections"]["profile_link"], 1);
    }
}
