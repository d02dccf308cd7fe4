//! Dot/bracket paths into the data model: `Skjema.items[2].name`.
//!
//! Indices are either concrete (`[2]`) or placeholders (`[{i}]`) that a repeating
//! ancestor fills in when its rows are expanded.

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::prelude::*;
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathIndex {
    At(usize),
    Placeholder(Arc<str>),
}

impl PathIndex {
    pub fn concrete(&self) -> Option<usize> {
        match self {
            PathIndex::At(index) => Some(*index),
            PathIndex::Placeholder(_) => None,
        }
    }
}

/// One `name[index]` step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: Arc<str>,
    pub index: Option<PathIndex>,
}

impl PathSegment {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    pub fn at(name: impl Into<Arc<str>>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(PathIndex::At(index)),
        }
    }

    fn concrete_index(&self) -> Option<usize> {
        self.index.as_ref().and_then(PathIndex::concrete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DataPath {
    segments: SmallVec<[PathSegment; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid data model path '{input}': {reason}")]
pub struct DataPathError {
    pub input: String,
    pub span: Range<usize>,
    pub reason: String,
}

impl DataPathError {
    /// Human readable report pointing at the offending part of the path.
    pub fn report(&self) -> String {
        let name = "path";
        let mut bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (name, self.span.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new((name, self.span.clone())).with_message(&self.reason))
            .finish()
            .write((name, Source::from(self.input.as_str())), &mut bytes);
        match written {
            Ok(()) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

fn path_parser<'src>() -> impl Parser<'src, &'src str, Vec<PathSegment>, extra::Err<Rich<'src, char>>> {
    let name = none_of(".[]{} \t\r\n")
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|name: &str| Arc::<str>::from(name));

    let concrete = text::int(10).try_map(|digits: &str, span| {
        digits
            .parse::<usize>()
            .map(PathIndex::At)
            .map_err(|error| Rich::custom(span, error))
    });

    let placeholder = none_of("{}[]")
        .repeated()
        .at_least(1)
        .to_slice()
        .delimited_by(just('{'), just('}'))
        .map(|placeholder: &str| PathIndex::Placeholder(placeholder.into()));

    let index = choice((concrete, placeholder)).delimited_by(just('['), just(']'));

    name.then(index.or_not())
        .map(|(name, index)| PathSegment { name, index })
        .separated_by(just('.'))
        .at_least(1)
        .collect::<Vec<_>>()
        .then_ignore(end())
}

impl DataPath {
    pub fn parse(input: &str) -> Result<Self, DataPathError> {
        let trimmed = input.trim();
        path_parser()
            .parse(trimmed)
            .into_result()
            .map(|segments| Self {
                segments: segments.into_iter().collect(),
            })
            .map_err(|errors| {
                let (span, reason) = errors
                    .into_iter()
                    .next()
                    .map(|error| (error.span().into_range(), error.reason().to_string()))
                    .unwrap_or_else(|| (0..trimmed.len(), "empty path".to_owned()));
                DataPathError {
                    input: trimmed.to_owned(),
                    span,
                    reason,
                }
            })
    }

    pub fn from_segments(segments: impl IntoIterator<Item = PathSegment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn join(&self, name: impl Into<Arc<str>>) -> Self {
        let mut joined = self.clone();
        joined.segments.push(PathSegment::new(name));
        joined
    }

    /// Same path with the last segment indexed, i.e. one array element.
    pub fn with_last_index(&self, index: usize) -> Self {
        let mut indexed = self.clone();
        if let Some(last) = indexed.segments.last_mut() {
            last.index = Some(PathIndex::At(index));
        }
        indexed
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment.index, Some(PathIndex::Placeholder(_))))
    }

    pub fn without_indices(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .map(|segment| PathSegment::new(segment.name.clone()))
                .collect(),
        }
    }

    /// Inserts `[index]` at the end of `group` inside this path.
    ///
    /// `group` is the concrete binding of a repeating container. The rewrite only
    /// applies when `group` is a prefix of `self` by segment name and every concrete
    /// index of `group` is either absent, a placeholder or identical in `self`.
    pub fn insert_row_index(&self, group: &DataPath, index: usize) -> Option<DataPath> {
        if group.is_empty() || group.len() > self.len() {
            return None;
        }
        let mut rewritten = self.clone();
        let last = group.len() - 1;
        for (position, (own, group_segment)) in rewritten
            .segments
            .iter_mut()
            .zip(group.segments.iter())
            .enumerate()
        {
            if own.name != group_segment.name {
                return None;
            }
            if position == last {
                match own.concrete_index() {
                    Some(existing) if existing != index => return None,
                    _ => own.index = Some(PathIndex::At(index)),
                }
                continue;
            }
            match (own.concrete_index(), group_segment.concrete_index()) {
                (Some(a), Some(b)) if a != b => return None,
                (None, Some(b)) => own.index = Some(PathIndex::At(b)),
                _ => {}
            }
        }
        Some(rewritten)
    }

    /// Fills missing indices in `self` from `context` while both paths walk the
    /// same segment names. Stops at the first diverging name or at an explicit
    /// index that differs from the context.
    pub fn transpose(&self, context: &DataPath) -> DataPath {
        let mut transposed = self.clone();
        for (own, context_segment) in transposed.segments.iter_mut().zip(context.segments.iter()) {
            if own.name != context_segment.name {
                break;
            }
            match (own.concrete_index(), context_segment.concrete_index()) {
                (None, Some(index)) => own.index = Some(PathIndex::At(index)),
                (Some(a), Some(b)) if a != b => break,
                _ => {}
            }
        }
        transposed
    }

    /// True when one path addresses data inside (or equal to) the other.
    /// Missing indices match any index.
    pub fn overlaps(&self, other: &DataPath) -> bool {
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| {
                a.name == b.name
                    && match (a.concrete_index(), b.concrete_index()) {
                        (Some(x), Some(y)) => x == y,
                        _ => true,
                    }
            })
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            match &segment.index {
                Some(PathIndex::At(index)) => write!(f, "[{index}]")?,
                Some(PathIndex::Placeholder(name)) => write!(f, "[{{{name}}}]")?,
                None => {}
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for DataPath {
    type Err = DataPathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(input: &str) -> DataPath {
        DataPath::parse(input).unwrap()
    }

    #[test]
    fn parses_indices_and_placeholders() {
        let parsed = path("A[{i}].B[3].value");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.segments()[0].index, Some(PathIndex::Placeholder("i".into())));
        assert_eq!(parsed.segments()[1].index, Some(PathIndex::At(3)));
        assert_eq!(parsed.to_string(), "A[{i}].B[3].value");
    }

    #[test]
    fn rejects_malformed_paths() {
        let error = DataPath::parse("items[x].name").unwrap_err();
        assert_eq!(error.input, "items[x].name");
        assert!(error.report().contains("items[x].name"));
        assert!(DataPath::parse("").is_err());
        assert!(DataPath::parse("a..b").is_err());
    }

    #[test]
    fn nested_binding_rewrite() {
        let child = path("A[{i}].B[{j}].value");
        let outer = child.insert_row_index(&path("A"), 2).unwrap();
        assert_eq!(outer.to_string(), "A[2].B[{j}].value");
        let inner = outer.insert_row_index(&path("A[2].B"), 1).unwrap();
        assert_eq!(inner.to_string(), "A[2].B[1].value");

        let plain = path("A.B.value");
        let rewritten = plain
            .insert_row_index(&path("A"), 2)
            .and_then(|p| p.insert_row_index(&path("A[2].B"), 1))
            .unwrap();
        assert_eq!(rewritten.to_string(), "A[2].B[1].value");
    }

    #[test]
    fn rewrite_skips_unrelated_bindings() {
        assert_eq!(path("Other.value").insert_row_index(&path("A"), 0), None);
        assert_eq!(path("A[1].value").insert_row_index(&path("A"), 0), None);
        assert_eq!(path("AB.value").insert_row_index(&path("A"), 0), None);
    }

    #[test]
    fn transpose_fills_row_indices() {
        let context = path("A[2].B[1]");
        assert_eq!(path("A.B.value").transpose(&context).to_string(), "A[2].B[1].value");
        assert_eq!(path("A[0].B.value").transpose(&context).to_string(), "A[0].B.value");
        assert_eq!(path("C.value").transpose(&context).to_string(), "C.value");
    }

    #[test]
    fn overlap_ignores_missing_indices() {
        assert!(path("items").overlaps(&path("items[1].name")));
        assert!(path("items[1]").overlaps(&path("items[1].name")));
        assert!(!path("items[0]").overlaps(&path("items[1].name")));
        assert!(!path("other").overlaps(&path("items")));
    }
}
