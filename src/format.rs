//! Field format rules
//!
//! Compiled patterns for URLs, timestamps, platform tags and versions, plus
//! the `sublime_text` selector grammar.

use chrono::NaiveDateTime;
use regex::Regex;
use std::fmt;
use url::Url;

/// Accepted `details` URLs: a GitHub or Bitbucket repository, optionally
/// pointing at a ref (`/tree/<ref>`, `/src/<ref>`) or at the tag listing.
const DETAILS_PATTERN: &str = concat!(
    r"^(?:https://github\.com/[^/#?]+/[^/#?]+(?:/tree/[^#?]*[^/#?]|/tags)?/?",
    r"|https://bitbucket\.org/[^/#?]+/[^/#?]+(?:/src/[^#?]*[^/#?]|#tags)?/?)$"
);

/// Accepted release `base` URLs: repository roots only
const BASE_PATTERN: &str = concat!(
    r"^(?:https://github\.com/[^/#?]+/[^/#?]+",
    r"|https://bitbucket\.org/[^/#?]+/[^/#?]+)$"
);

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compiled format checks
pub struct FormatRules {
    details: Regex,
    base: Regex,
    web_url: Regex,
    date: Regex,
    platform: Regex,
    version: Regex,
    sha256: Regex,
    load_order: Regex,
    invalid_name_chars: Regex,
    tab_indent: Regex,
    include_file: Regex,
}

impl Default for FormatRules {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRules {
    pub fn new() -> Self {
        Self {
            details: Regex::new(DETAILS_PATTERN).unwrap(),
            base: Regex::new(BASE_PATTERN).unwrap(),
            web_url: Regex::new(r"^https?://[^\s/?#]+[^\s]*$").unwrap(),
            date: Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").unwrap(),
            platform: Regex::new(r"^(?:\*|(?:osx|linux|windows)(?:-(?:x32|x64|arm64))?)$").unwrap(),
            version: Regex::new(r"^\d+(?:\.\d+)*(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$").unwrap(),
            sha256: Regex::new(r"^[0-9a-f]{64}$").unwrap(),
            load_order: Regex::new(r"^\d{2}$").unwrap(),
            invalid_name_chars: Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap(),
            tab_indent: Regex::new(r"^\t*\S").unwrap(),
            include_file: Regex::new(r"^(0-9|[a-z]|dependencies)\.json$").unwrap(),
        }
    }

    pub fn is_details_url(&self, value: &str) -> bool {
        self.details.is_match(value)
    }

    pub fn is_base_url(&self, value: &str) -> bool {
        self.base.is_match(value)
    }

    /// Plain `http://` or `https://` URL
    pub fn is_web_url(&self, value: &str) -> bool {
        self.web_url.is_match(value)
    }

    /// `YYYY-MM-DD HH:MM:SS` that is also a real calendar time
    pub fn is_date(&self, value: &str) -> bool {
        self.date.is_match(value) && NaiveDateTime::parse_from_str(value, DATE_FORMAT).is_ok()
    }

    pub fn is_platform(&self, value: &str) -> bool {
        self.platform.is_match(value)
    }

    pub fn is_version(&self, value: &str) -> bool {
        self.version.is_match(value)
    }

    pub fn is_sha256(&self, value: &str) -> bool {
        self.sha256.is_match(value)
    }

    pub fn is_load_order(&self, value: &str) -> bool {
        self.load_order.is_match(value)
    }

    /// Line starts with zero or more tabs followed by content
    pub fn is_tab_indented(&self, line: &str) -> bool {
        self.tab_indent.is_match(line)
    }

    /// Bucket named by an include file: a letter, `0-9` or `dependencies`
    pub fn include_bucket<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.include_file
            .captures(file_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Why `name` cannot be used as a directory name, if it can't
    pub fn name_problem(&self, name: &str) -> Option<&'static str> {
        if name.is_empty() {
            Some("must not be empty")
        } else if name == "." || name == ".." {
            Some("must not be a relative path component")
        } else if self.invalid_name_chars.is_match(name) {
            Some(r#"must not contain any of \ / : * ? " < > | or control characters"#)
        } else if name.trim() != name {
            Some("must not start or end with whitespace")
        } else if name.ends_with('.') {
            Some("must not end with a period")
        } else {
            None
        }
    }
}

/// Derive a package name from its `details` URL: the second path segment,
/// after the owner. Anything following it is a ref or tag-listing suffix.
pub fn name_from_details(details: &str) -> Option<String> {
    let url = Url::parse(details).ok()?;
    let name = url.path_segments()?.nth(1)?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Letter bucket a name belongs to: `"0-9"` for a leading digit, otherwise
/// the lowercased first character.
pub fn bucket_for(name: &str) -> Option<String> {
    let first = name.chars().next()?;
    if first.is_ascii_digit() {
        Some("0-9".to_string())
    } else {
        Some(first.to_lowercase().collect())
    }
}

// =============================================================================
// Selector grammar
// =============================================================================

/// A parsed `sublime_text` compatibility selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorRange {
    /// `*`
    Any,
    /// `<N`
    Below(u32),
    /// `<=N`
    AtMost(u32),
    /// `>N`
    Above(u32),
    /// `>=N`
    AtLeast(u32),
    /// `N - M`
    Between(u32, u32),
}

/// Why a selector failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Does not match any of the grammar forms
    Grammar,
    /// `N - M` with N greater than M
    EmptyRange(u32, u32),
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Grammar => {
                write!(f, "must be one of *, <N, <=N, >N, >=N or N - N with a 4-digit build N")
            }
            SelectorError::EmptyRange(lo, hi) => {
                write!(f, "range {} - {} is empty", lo, hi)
            }
        }
    }
}

fn build_number(s: &str) -> Result<u32, SelectorError> {
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().map_err(|_| SelectorError::Grammar)
    } else {
        Err(SelectorError::Grammar)
    }
}

impl SelectorRange {
    pub fn parse(selector: &str) -> Result<Self, SelectorError> {
        if selector == "*" {
            return Ok(SelectorRange::Any);
        }
        if let Some(rest) = selector.strip_prefix("<=") {
            return build_number(rest).map(SelectorRange::AtMost);
        }
        if let Some(rest) = selector.strip_prefix(">=") {
            return build_number(rest).map(SelectorRange::AtLeast);
        }
        if let Some(rest) = selector.strip_prefix('<') {
            return build_number(rest).map(SelectorRange::Below);
        }
        if let Some(rest) = selector.strip_prefix('>') {
            return build_number(rest).map(SelectorRange::Above);
        }
        let (lo, hi) = selector.split_once(" - ").ok_or(SelectorError::Grammar)?;
        let (lo, hi) = (build_number(lo)?, build_number(hi)?);
        if lo > hi {
            return Err(SelectorError::EmptyRange(lo, hi));
        }
        Ok(SelectorRange::Between(lo, hi))
    }

    /// Whether `build` falls inside the selector
    pub fn matches(&self, build: u32) -> bool {
        match *self {
            SelectorRange::Any => true,
            SelectorRange::Below(n) => build < n,
            SelectorRange::AtMost(n) => build <= n,
            SelectorRange::Above(n) => build > n,
            SelectorRange::AtLeast(n) => build >= n,
            SelectorRange::Between(lo, hi) => (lo..=hi).contains(&build),
        }
    }
}

impl fmt::Display for SelectorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorRange::Any => write!(f, "*"),
            SelectorRange::Below(n) => write!(f, "<{}", n),
            SelectorRange::AtMost(n) => write!(f, "<={}", n),
            SelectorRange::Above(n) => write!(f, ">{}", n),
            SelectorRange::AtLeast(n) => write!(f, ">={}", n),
            SelectorRange::Between(lo, hi) => write!(f, "{} - {}", lo, hi),
        }
    }
}
