//! Contact-information detection for extracted text lines.
//!
//! Three rules are checked against the text of a whole line: an email
//! address, a Vietnamese-style phone number, and a fixed set of profile or
//! short-link domains. Text is NFKC-normalized first so full-width `＠` and
//! similar presentation forms match the ASCII patterns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Domains that identify a profile or link line.
pub const URL_KEYWORDS: &[&str] = &[
    "linkedin.com",
    "facebook.com",
    "fb.com",
    "bit.ly",
    "tinyurl.com",
    "github.com",
];

const EMAIL_PATTERN: &str = r"[a-zA-Z0-9_.+\-]+@[a-zA-Z0-9\-]+\.[a-zA-Z0-9.\-]+";

// Optional +84 / (84) / leading 0 prefix, then 8-12 digits with optional
// single separators between them.
const PHONE_PATTERN: &str =
    r"(?:\(?\+?84\)?|0(?:\d{1,2})?)\s*[.\-\s]?\d(?:\s*[.\-\s]?\d){7,11}";

/// Which rule flagged a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    /// An email address.
    Email,
    /// A phone number.
    Phone,
    /// A profile or short-link URL keyword.
    ProfileLink,
}

impl std::fmt::Display for PiiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PiiKind::Email => write!(f, "email"),
            PiiKind::Phone => write!(f, "phone"),
            PiiKind::ProfileLink => write!(f, "profile link"),
        }
    }
}

/// Line classifier for contact information.
#[derive(Debug, Clone)]
pub struct PiiDetector {
    email: Regex,
    phone: Regex,
    keywords: Vec<String>,
}

impl PiiDetector {
    /// Create a detector with the built-in keyword set.
    pub fn new() -> Self {
        Self::with_keywords(URL_KEYWORDS.iter().copied())
    }

    /// Create a detector with a custom keyword set.
    ///
    /// Keywords are matched case-insensitively; empty keywords are dropped.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            email: Regex::new(EMAIL_PATTERN).expect("email pattern is valid"),
            phone: Regex::new(PHONE_PATTERN).expect("phone pattern is valid"),
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// The lowercase keyword set used for URL detection and page search.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Return the first rule that matches `text`, checked in the order
    /// email, phone, profile link.
    pub fn classify(&self, text: &str) -> Option<PiiKind> {
        let normalized: String = text.nfkc().collect();

        if self.email.is_match(&normalized) {
            return Some(PiiKind::Email);
        }
        if self.phone.is_match(&normalized) {
            return Some(PiiKind::Phone);
        }

        let lowered = normalized.to_lowercase();
        if self.keywords.iter().any(|kw| lowered.contains(kw.as_str())) {
            return Some(PiiKind::ProfileLink);
        }

        None
    }

    /// Whether any rule matches `text`.
    pub fn is_sensitive(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self::new()
    }
}
