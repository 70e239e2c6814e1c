//! Automatic contact-line redaction.

use crate::backend::{DocumentProvider, RedactionAnnotation};
use crate::error::Result;
use crate::geometry::Rect;
use crate::mask::{build_mask_region, keyword_mask_region, IconRegion};
use crate::options::RedactOptions;
use crate::pii::PiiDetector;
use crate::sampler::BackgroundSampler;

use super::{RedactionQueue, RedactionReport};

/// A mask to place and the rectangle its fill color is sampled beside.
#[derive(Debug, Clone, Copy)]
struct Target {
    sample_at: Rect,
    mask: Rect,
}

/// Finds contact lines and keyword hits and masks them.
#[derive(Debug, Clone)]
pub struct AutoRedactor {
    detector: PiiDetector,
    sampler: BackgroundSampler,
    options: RedactOptions,
}

impl AutoRedactor {
    /// Create a redactor with the built-in detector.
    pub fn new(options: RedactOptions) -> Self {
        Self {
            detector: PiiDetector::new(),
            sampler: BackgroundSampler::new(options.sampler),
            options,
        }
    }

    /// Replace the detector, e.g. to change the keyword set.
    pub fn with_detector(mut self, detector: PiiDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Detect, mask and commit every page in scope.
    pub fn run<P>(&self, provider: &mut P) -> Result<RedactionReport>
    where
        P: DocumentProvider + ?Sized,
    {
        let mut report = RedactionReport::default();
        let queue = self.plan(provider, &mut report)?;
        report.pages = queue.commit(provider)?;

        log::info!(
            "Auto redaction: {} lines flagged, {} keyword hits, {} masks on {} pages",
            report.detection_count(),
            report.keyword_hits,
            report.mask_count(),
            report.pages.len()
        );
        Ok(report)
    }

    /// Plan masks for every page in scope without mutating anything.
    pub fn plan<P>(&self, provider: &P, report: &mut RedactionReport) -> Result<RedactionQueue>
    where
        P: DocumentProvider + ?Sized,
    {
        let mut queue = RedactionQueue::new();

        for page in self.options.page_scope.pages(provider.page_count()) {
            let targets = self.page_targets(provider, page, report)?;
            let page_width = provider.page_geometry(page)?.width;
            let colors = self.sample_colors(provider, page, page_width, &targets);

            for (target, color) in targets.iter().zip(colors) {
                queue.push(page, RedactionAnnotation::new(target.mask, color));
            }
        }

        Ok(queue)
    }

    fn page_targets<P>(
        &self,
        provider: &P,
        page: usize,
        report: &mut RedactionReport,
    ) -> Result<Vec<Target>>
    where
        P: DocumentProvider + ?Sized,
    {
        let config = &self.options.mask;
        let regions: Vec<IconRegion> = provider.icon_regions(page)?;
        let mut targets = Vec::new();

        for line in provider.text_lines(page)? {
            let Some(kind) = self.detector.classify(&line.text) else {
                continue;
            };
            let mask = build_mask_region(&line.rect, &regions, config);
            log::debug!("Page {}: {} line at {} masked as {}", page, kind, line.rect, mask);
            report.record_detection(kind);
            targets.push(Target {
                sample_at: line.rect,
                mask,
            });
        }

        // Page search also catches keywords split across lines or runs.
        for keyword in self.detector.keywords() {
            for hit in provider.search(page, keyword)? {
                log::debug!("Page {}: keyword hit at {}", page, hit);
                report.keyword_hits += 1;
                targets.push(Target {
                    sample_at: hit,
                    mask: keyword_mask_region(&hit, config),
                });
            }
        }

        Ok(targets)
    }

    #[cfg(feature = "parallel")]
    fn sample_colors<P>(
        &self,
        provider: &P,
        page: usize,
        page_width: f32,
        targets: &[Target],
    ) -> Vec<crate::color::FillColor>
    where
        P: DocumentProvider + ?Sized,
    {
        use rayon::prelude::*;

        if self.options.parallel && targets.len() > 1 {
            targets
                .par_iter()
                .map(|t| self.sampler.sample(provider, page, &t.sample_at, page_width))
                .collect()
        } else {
            self.sample_sequential(provider, page, page_width, targets)
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn sample_colors<P>(
        &self,
        provider: &P,
        page: usize,
        page_width: f32,
        targets: &[Target],
    ) -> Vec<crate::color::FillColor>
    where
        P: DocumentProvider + ?Sized,
    {
        self.sample_sequential(provider, page, page_width, targets)
    }

    fn sample_sequential<P>(
        &self,
        provider: &P,
        page: usize,
        page_width: f32,
        targets: &[Target],
    ) -> Vec<crate::color::FillColor>
    where
        P: DocumentProvider + ?Sized,
    {
        targets
            .iter()
            .map(|t| self.sampler.sample(provider, page, &t.sample_at, page_width))
            .collect()
    }
}

impl Default for AutoRedactor {
    fn default() -> Self {
        Self::new(RedactOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{helvetica_resources, single_page};
    use crate::backend::LopdfProvider;
    use crate::color::FillColor;
    use crate::pii::PiiKind;

    fn provider(content: &str) -> LopdfProvider {
        let (mut doc, _) = single_page(content, helvetica_resources);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        LopdfProvider::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_plan_masks_contact_lines_only() {
        let p = provider(
            "BT /F1 11 Tf 72 700 Td (Jane Doe) Tj ET \
             BT /F1 11 Tf 72 680 Td (jane@example.com) Tj ET \
             BT /F1 11 Tf 72 660 Td (Experienced engineer) Tj ET",
        );
        let mut report = RedactionReport::default();
        let queue = AutoRedactor::default().plan(&p, &mut report).unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(report.detections.get(&PiiKind::Email), Some(&1));
        let line = p.text_lines(0).unwrap()[1].rect;
        assert!(queue.annotations(0)[0].rect.contains(&line));
    }

    #[test]
    fn test_keyword_hits_are_masked_separately() {
        let p = provider("BT /F1 10 Tf 72 700 Td (github.com/jane) Tj ET");
        let mut report = RedactionReport::default();
        let queue = AutoRedactor::default().plan(&p, &mut report).unwrap();

        // One flagged line plus one page search hit.
        assert_eq!(queue.len(), 2);
        assert_eq!(report.keyword_hits, 1);
        assert_eq!(report.detections.get(&PiiKind::ProfileLink), Some(&1));
    }

    #[test]
    fn test_icon_left_of_line_is_included() {
        let p = provider(
            "0 0 0 rg 50 682 12 12 re f \
             BT /F1 11 Tf 72 684 Td (0912 345 678) Tj ET",
        );
        let mut report = RedactionReport::default();
        let queue = AutoRedactor::default().plan(&p, &mut report).unwrap();

        let mask = queue.annotations(0)[0].rect;
        // Icon spans x 50..62, page y 98..110.
        assert!(mask.contains(&Rect::new(50.0, 98.0, 62.0, 110.0)));
        assert_eq!(report.detections.get(&PiiKind::Phone), Some(&1));
    }

    #[test]
    fn test_fill_matches_colored_background() {
        let p = provider(
            "0.2 0.4 0.6 rg 0 600 612 192 re f \
             1 1 1 rg BT /F1 11 Tf 72 700 Td (jane@example.com) Tj ET",
        );
        let mut report = RedactionReport::default();
        let queue = AutoRedactor::default().plan(&p, &mut report).unwrap();
        assert_eq!(queue.annotations(0)[0].color.to_rgb8(), [51, 102, 153]);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let content = "BT /F1 10 Tf 72 700 Td (me@example.com) Tj ET \
                       BT /F1 10 Tf 72 680 Td (linkedin.com/in/me) Tj ET";
        let p = provider(content);
        let mut a = RedactionReport::default();
        let mut b = RedactionReport::default();
        let parallel = AutoRedactor::default().plan(&p, &mut a).unwrap();
        let sequential = AutoRedactor::new(RedactOptions::new().sequential())
            .plan(&p, &mut b)
            .unwrap();
        assert_eq!(parallel.annotations(0), sequential.annotations(0));
    }

    #[test]
    fn test_run_strips_text() {
        let mut p = provider("BT /F1 10 Tf 72 700 Td (Email: foo@example.com) Tj ET");
        let line = p.text_lines(0).unwrap()[0].rect;
        let report = AutoRedactor::default().run(&mut p).unwrap();

        assert!(report.covers(0, &line));
        assert!(p.text_lines(0).unwrap().is_empty());
        assert!(report.masks().all(|(_, m)| m.color == FillColor::WHITE));
    }
}
