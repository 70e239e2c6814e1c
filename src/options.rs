//! Redaction options.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::backend::OverlapPolicy;
use crate::mask::MaskConfig;
use crate::sampler::SamplerConfig;

/// Options for automatic and manual redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactOptions {
    /// Mask construction constants
    pub mask: MaskConfig,

    /// Background sampling constants
    pub sampler: SamplerConfig,

    /// Pages scanned in automatic mode
    pub page_scope: PageScope,

    /// What happens to vector paths under a mask
    pub graphics: OverlapPolicy,

    /// What happens to images under a mask
    pub images: OverlapPolicy,

    /// Whether to sample fill colors in parallel
    pub parallel: bool,

    /// Pixels per unit for page previews
    pub preview_scale: f32,
}

impl RedactOptions {
    /// Create new redaction options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mask configuration.
    pub fn with_mask(mut self, mask: MaskConfig) -> Self {
        self.mask = mask;
        self
    }

    /// Set the sampler configuration.
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Set the pages scanned in automatic mode.
    pub fn with_page_scope(mut self, scope: PageScope) -> Self {
        self.page_scope = scope;
        self
    }

    /// Scan every page in automatic mode.
    pub fn all_pages(mut self) -> Self {
        self.page_scope = PageScope::All;
        self
    }

    /// Set the overlap policy for vector paths.
    pub fn with_graphics_policy(mut self, policy: OverlapPolicy) -> Self {
        self.graphics = policy;
        self
    }

    /// Set the overlap policy for images.
    pub fn with_images_policy(mut self, policy: OverlapPolicy) -> Self {
        self.images = policy;
        self
    }

    /// Enable or disable parallel color sampling.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel color sampling.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the preview scale.
    pub fn with_preview_scale(mut self, scale: f32) -> Self {
        self.preview_scale = scale;
        self
    }
}

impl Default for RedactOptions {
    fn default() -> Self {
        Self {
            mask: MaskConfig::resume(),
            sampler: SamplerConfig::default(),
            page_scope: PageScope::FirstPage,
            graphics: OverlapPolicy::RemoveIfCovered,
            images: OverlapPolicy::RemoveIfCovered,
            parallel: true,
            preview_scale: 2.0,
        }
    }
}

/// Pages scanned by automatic redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageScope {
    /// Only the first page; later pages are left untouched
    #[default]
    FirstPage,
    /// Every page
    All,
}

impl PageScope {
    /// Page indices covered in a document of `page_count` pages.
    pub fn pages(&self, page_count: usize) -> Range<usize> {
        match self {
            PageScope::FirstPage => 0..page_count.min(1),
            PageScope::All => 0..page_count,
        }
    }
}
