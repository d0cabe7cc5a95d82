//! Path pattern compilation and matching.
//!
//! A [`PathPattern`] is a compiled route pattern: an ordered list of literal
//! and `:name` capture segments, plus the options that govern how much of a
//! path it must consume. Two patterns are special-cased:
//!
//! - `"*"` matches everything and captures the whole path under the name `"0"`
//! - `"/"` compiled non-terminally matches any path and captures nothing
//!   (mount-root middleware)
//!
//! Captured values are percent-decoded at extraction time; a malformed
//! escape surfaces as [`DispatchError::Decode`] carrying the raw segment.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;

use trellis_core::{DispatchError, DispatchResult};

/// Options controlling how a pattern is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Compare literal segments case-sensitively.
    pub case_sensitive: bool,
    /// Distinguish trailing-slash variants of a path (terminal patterns only).
    pub strict: bool,
    /// Require the whole path to be consumed. `false` for prefix-style
    /// middleware, `true` for terminal routes.
    pub end: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strict: false,
            end: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// `"*"`: consume and capture the entire path.
    Wildcard,
    /// `"/"` with `end: false`: match any path, capture nothing.
    MatchAll,
    Segments(Vec<Segment>),
}

/// A compiled path pattern plus its ordered capture-name list.
#[derive(Debug, Clone)]
pub struct PathPattern {
    kind: Kind,
    keys: Vec<String>,
    options: MatchOptions,
    /// The pattern text carried a trailing slash (relevant under `strict`).
    trailing_slash: bool,
}

impl PathPattern {
    /// Compiles `pattern` under the given options.
    pub fn compile(pattern: &str, options: MatchOptions) -> Self {
        if pattern == "*" {
            return Self {
                kind: Kind::Wildcard,
                keys: vec!["0".to_owned()],
                options,
                trailing_slash: false,
            };
        }
        if pattern == "/" && !options.end {
            return Self {
                kind: Kind::MatchAll,
                keys: Vec::new(),
                options,
                trailing_slash: false,
            };
        }

        let mut keys = Vec::new();
        let segments = split_segments(pattern)
            .map(|seg| match seg.strip_prefix(':') {
                Some(name) => {
                    keys.push(name.to_owned());
                    Segment::Capture(name.to_owned())
                }
                None => Segment::Literal(seg.to_owned()),
            })
            .collect();

        Self {
            kind: Kind::Segments(segments),
            keys,
            options,
            trailing_slash: pattern.len() > 1 && pattern.ends_with('/'),
        }
    }

    /// The ordered list of capture names.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns `true` when `path` satisfies this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let segments = match &self.kind {
            Kind::Wildcard | Kind::MatchAll => return true,
            Kind::Segments(segments) => segments,
        };

        let path_segments: Vec<&str> = split_segments(path).collect();
        if self.options.end {
            if path_segments.len() != segments.len() {
                return false;
            }
            if self.options.strict && has_trailing_slash(path) != self.trailing_slash {
                return false;
            }
        } else if path_segments.len() < segments.len() {
            return false;
        }

        segments
            .iter()
            .zip(&path_segments)
            .all(|(segment, part)| self.segment_matches(segment, part))
    }

    /// Extracts the named captures from `path`, percent-decoding each value.
    ///
    /// Assumes `path` already satisfied [`matches`](Self::matches); pairs past
    /// the end of either side are ignored.
    pub fn captures(&self, path: &str) -> DispatchResult<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        let segments = match &self.kind {
            Kind::Wildcard => {
                params.insert("0".to_owned(), decode_segment(path)?);
                return Ok(params);
            }
            Kind::MatchAll => return Ok(params),
            Kind::Segments(segments) => segments,
        };

        for (segment, part) in segments.iter().zip(split_segments(path)) {
            if let Segment::Capture(name) = segment {
                params.insert(name.clone(), decode_segment(part)?);
            }
        }
        Ok(params)
    }

    fn segment_matches(&self, segment: &Segment, part: &str) -> bool {
        match segment {
            Segment::Capture(_) => true,
            Segment::Literal(literal) => {
                if self.options.case_sensitive {
                    literal == part
                } else {
                    literal.eq_ignore_ascii_case(part)
                }
            }
        }
    }
}

/// Splits a path or pattern into its non-empty segments.
fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|seg| !seg.is_empty())
}

fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

/// Percent-decodes one captured value.
///
/// This is the only place decode errors are raised; the error carries the
/// raw text so the caller can report exactly what failed.
fn decode_segment(raw: &str) -> DispatchResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|source| DispatchError::Decode {
            raw: raw.to_owned(),
            source,
        })
}

/// Strips a router's mount prefix from `path`.
///
/// Returns the remainder (never empty: a fully consumed path yields `"/"`),
/// or `None` when `path` does not fall under `mount` at a segment boundary.
/// An absent or empty mount leaves the path untouched.
pub(crate) fn strip_mount_prefix<'a>(path: &'a str, mount: Option<&str>) -> Option<&'a str> {
    let Some(mount) = mount.filter(|m| !m.is_empty()) else {
        return Some(path);
    };
    let rest = path.strip_prefix(mount)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') || mount.ends_with('/') {
        Some(rest)
    } else {
        None
    }
}
