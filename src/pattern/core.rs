//! Pattern core module - hot path for path matching.

use crate::error::PatternError;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maximum number of captured variables before heap allocation.
/// Templates rarely declare more than a handful of variables.
pub const MAX_INLINE_CAPTURES: usize = 8;

type CaptureVec = SmallVec<[(Arc<str>, String); MAX_INLINE_CAPTURES]>;

/// One compiled template segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text that must equal the path segment exactly
    Literal(String),
    /// `<name>`: consumes exactly one non-empty segment
    Required(Arc<str>),
    /// `[name]` / `[name=default]`: consumes a segment if one is present
    Optional {
        /// Variable name
        name: Arc<str>,
        /// Value bound when the segment is absent
        default: Option<String>,
    },
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, PatternError> {
        if let Some(inner) = raw.strip_prefix('<') {
            let name = inner
                .strip_suffix('>')
                .ok_or_else(|| PatternError::Unterminated {
                    segment: raw.to_string(),
                })?;
            return Ok(Segment::Required(Arc::from(validate_name(raw, name)?)));
        }
        if let Some(inner) = raw.strip_prefix('[') {
            let body = inner
                .strip_suffix(']')
                .ok_or_else(|| PatternError::Unterminated {
                    segment: raw.to_string(),
                })?;
            let (name, default) = match body.split_once('=') {
                Some((name, default)) => (name, Some(default.to_string())),
                None => (body, None),
            };
            return Ok(Segment::Optional {
                name: Arc::from(validate_name(raw, name)?),
                default,
            });
        }
        if raw.contains(['<', '>', '[', ']']) {
            return Err(PatternError::Unterminated {
                segment: raw.to_string(),
            });
        }
        Ok(Segment::Literal(raw.to_string()))
    }

    fn variable_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Required(name) | Segment::Optional { name, .. } => Some(name),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => f.write_str(text),
            Segment::Required(name) => write!(f, "<{name}>"),
            Segment::Optional {
                name,
                default: Some(default),
            } => write!(f, "[{name}={default}]"),
            Segment::Optional {
                name,
                default: None,
            } => write!(f, "[{name}]"),
        }
    }
}

fn validate_name<'a>(segment: &str, name: &'a str) -> Result<&'a str, PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyName {
            segment: segment.to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PatternError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(name)
}

/// A parsed, immutable path template
///
/// Built once at registration; matching never reorders or mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl CompiledPattern {
    /// Compile a template such as `user/<username>/posts/[page]`
    ///
    /// Leading/trailing `/` and empty segments are ignored, so `"/news/"`
    /// and `"news"` compile to the same program.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] for unterminated or unnamed variables,
    /// illegal variable characters, or a variable declared twice.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        for raw in template.split('/').filter(|s| !s.is_empty()) {
            let segment = Segment::parse(raw)?;
            if let Some(name) = segment.variable_name() {
                if segments
                    .iter()
                    .any(|s: &Segment| s.variable_name() == Some(name))
                {
                    return Err(PatternError::DuplicateName {
                        name: name.to_string(),
                    });
                }
            }
            segments.push(segment);
        }
        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// The template string this pattern was compiled from
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any segment captures a variable
    pub fn has_variables(&self) -> bool {
        self.segments.iter().any(|s| s.variable_name().is_some())
    }

    /// Match a request path against this pattern
    ///
    /// Any `?query` suffix is ignored. Returns `None` when the path does not
    /// match and `Some(captures)` (possibly empty) when it does.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Captures> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        let trimmed = path.trim_matches('/');
        let mut parts: SmallVec<[&str; 16]> = SmallVec::new();
        if !trimmed.is_empty() {
            parts.extend(trimmed.split('/'));
        }

        let mut captures = Captures::default();
        let mut cursor = 0;
        for segment in &self.segments {
            let candidate = parts.get(cursor).copied();
            match segment {
                Segment::Literal(text) => {
                    if candidate != Some(text.as_str()) {
                        return None;
                    }
                    cursor += 1;
                }
                Segment::Required(name) => match candidate {
                    Some(value) if !value.is_empty() => {
                        captures.insert(Arc::clone(name), value.to_string());
                        cursor += 1;
                    }
                    _ => return None,
                },
                Segment::Optional { name, default } => {
                    match candidate {
                        Some(value) if !value.is_empty() => {
                            captures.insert(Arc::clone(name), value.to_string());
                        }
                        _ => {
                            if let Some(default) = default {
                                captures.insert(Arc::clone(name), default.clone());
                            }
                        }
                    }
                    if candidate.is_some() {
                        cursor += 1;
                    }
                }
            }
        }

        if cursor < parts.len() {
            return None;
        }
        Some(captures)
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Variables captured by a successful match
///
/// Names are shared with the compiled pattern (`Arc<str>`), values are owned
/// per request. Stack-allocated for up to [`MAX_INLINE_CAPTURES`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    entries: CaptureVec,
}

impl Captures {
    fn insert(&mut self, name: Arc<str>, value: String) {
        self.entries.push((name, value));
    }

    /// Look up a captured variable by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    /// Copy into a `HashMap` (allocates; prefer [`Captures::get`] in handlers)
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
