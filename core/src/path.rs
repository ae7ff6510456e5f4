//! Path template resolution.
//!
//! A template such as `/groups/{group_id}/groups/{deleting_group_id}` is
//! parsed into literal and placeholder segments once, then filled from the
//! fields of an encoded request object. Each placeholder looks up the field
//! with the same name, so declaration order in the request type is
//! irrelevant.

use serde_json::{Map, Value};
use thiserror::Error;

/// A malformed path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),
    #[error("unexpected `}}` at byte {0}")]
    UnexpectedClose(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyName(usize),
    #[error("nested placeholder at byte {0}")]
    Nested(usize),
}

/// Why a placeholder could not be filled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("path field `{0}` is unset")]
    Missing(String),
    #[error("path field `{0}` is empty")]
    Empty(String),
    #[error("path field `{0}` is not a scalar value")]
    NotScalar(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((inner, '{')) => return Err(TemplateError::Nested(inner)),
                            Some((_, ch)) => name.push(ch),
                            None => return Err(TemplateError::Unclosed(pos)),
                        }
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyName(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                '}' => return Err(TemplateError::UnexpectedClose(pos)),
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Fill every placeholder from `fields`, percent-encoding each value for
    /// use as a single path segment.
    pub fn resolve(&self, fields: &Map<String, Value>) -> Result<String, ResolveError> {
        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Placeholder(name) => {
                    let value = canonical_segment(name, fields.get(name))?;
                    path.push_str(&urlencoding::encode(&value));
                }
            }
        }
        Ok(path)
    }
}

/// Canonical string form of a path value: integers in decimal, strings
/// as-is, booleans as `true`/`false`.
fn canonical_segment(name: &str, value: Option<&Value>) -> Result<String, ResolveError> {
    match value {
        None | Some(Value::Null) => Err(ResolveError::Missing(name.to_string())),
        Some(Value::String(s)) if s.is_empty() => Err(ResolveError::Empty(name.to_string())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Array(_)) | Some(Value::Object(_)) => {
            Err(ResolveError::NotScalar(name.to_string()))
        }
    }
}
