//! In-memory legislation tree.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value as Json};

use crate::error::ValidationError;
use crate::time::Instant;

use super::timeline::{Timeline, TimelineItem};

/// One step of a [`ParameterPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Location of a node in the legislation tree.
///
/// Parsed from dotted text; purely numeric segments index sequences
/// (`taxes.brackets.0.rate`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterPath(Vec<PathSegment>);

impl ParameterPath {
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl FromStr for ParameterPath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = s
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    return Err(ValidationError::UnknownParameterPath { path: s.to_string() });
                }
                Ok(part
                    .parse::<usize>()
                    .map_or_else(|_| PathSegment::Key(part.to_string()), PathSegment::Index))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// A node of the legislation tree. Children are reference counted so derived
/// trees share every subtree they do not modify.
#[derive(Debug, Clone, PartialEq)]
pub enum LegislationNode {
    Map(Arc<BTreeMap<String, LegislationNode>>),
    Sequence(Arc<Vec<LegislationNode>>),
    Timeline(Arc<Timeline>),
    /// Descriptive data carried along (labels, units, ...).
    Scalar(Json),
}

impl LegislationNode {
    fn child(&self, segment: &PathSegment) -> Option<&Self> {
        match (segment, self) {
            (PathSegment::Key(key), Self::Map(map)) => map.get(key),
            // Numeric keys such as years parse as indices.
            (PathSegment::Index(index), Self::Map(map)) => map.get(&index.to_string()),
            (PathSegment::Index(index), Self::Sequence(items)) => items.get(*index),
            _ => None,
        }
    }

    fn from_json(value: &Json) -> Result<Self, ValidationError> {
        match value {
            Json::Object(map) => {
                let children = map
                    .iter()
                    .map(|(key, child)| Ok((key.clone(), Self::from_json(child)?)))
                    .collect::<Result<BTreeMap<_, _>, ValidationError>>()?;
                Ok(Self::Map(Arc::new(children)))
            }
            Json::Array(items) if !items.is_empty() && items.iter().all(is_timeline_item) => {
                let items = items
                    .iter()
                    .map(timeline_item_from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Timeline(Arc::new(Timeline::new(items)?)))
            }
            Json::Array(items) => {
                let children = items.iter().map(Self::from_json).collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Sequence(Arc::new(children)))
            }
            other => Ok(Self::Scalar(other.clone())),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Self::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Self::Sequence(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Timeline(timeline) => Json::Array(
                timeline
                    .items()
                    .iter()
                    .map(|item| {
                        json!({
                            "start": item.start.to_string(),
                            "stop": item.stop.to_string(),
                            "value": item.value,
                        })
                    })
                    .collect(),
            ),
            Self::Scalar(value) => value.clone(),
        }
    }

    fn snapshot(&self, instant: Instant) -> Json {
        match self {
            Self::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.snapshot(instant)))
                    .collect(),
            ),
            Self::Sequence(items) => Json::Array(items.iter().map(|n| n.snapshot(instant)).collect()),
            Self::Timeline(timeline) => timeline.value_at(instant).cloned().unwrap_or(Json::Null),
            Self::Scalar(value) => value.clone(),
        }
    }
}

fn is_timeline_item(value: &Json) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("start") && o.contains_key("stop") && o.contains_key("value"))
}

fn timeline_item_from_json(value: &Json) -> Result<TimelineItem, ValidationError> {
    let instant = |key: &str| -> Result<Instant, ValidationError> {
        value
            .get(key)
            .and_then(Json::as_str)
            .ok_or_else(|| ValidationError::InvalidLegislation {
                reason: format!("timeline item field '{key}' must be a date string"),
            })?
            .parse()
    };
    let item_value = value.get("value").cloned().unwrap_or(Json::Null);
    TimelineItem::new(instant("start")?, instant("stop")?, item_value)
}

/// Immutable tree of legislated parameters.
///
/// # Examples
///
/// ```
/// use legiscalc::legislation::LegislationTree;
/// use legiscalc::time::Instant;
///
/// let tree = LegislationTree::from_json(&serde_json::json!({
///     "tax": { "rate": [{ "start": "2010-01-01", "stop": "2014-12-31", "value": 0.2 }] }
/// })).unwrap();
///
/// let path = "tax.rate".parse().unwrap();
/// let at = Instant::new(2012, 6, 1).unwrap();
/// assert_eq!(tree.lookup(&path, at), Some(&serde_json::json!(0.2)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LegislationTree {
    root: LegislationNode,
}

impl Default for LegislationTree {
    fn default() -> Self {
        Self {
            root: LegislationNode::Map(Arc::new(BTreeMap::new())),
        }
    }
}

impl LegislationTree {
    /// Builds a tree from nested JSON mappings and sequences.
    ///
    /// An array whose elements are all objects with `start`, `stop` and
    /// `value` keys becomes a timeline.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if a timeline is malformed.
    pub fn from_json(value: &Json) -> Result<Self, ValidationError> {
        Ok(Self {
            root: LegislationNode::from_json(value)?,
        })
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        self.root.to_json()
    }

    pub fn root(&self) -> &LegislationNode {
        &self.root
    }

    #[must_use]
    pub fn node(&self, path: &ParameterPath) -> Option<&LegislationNode> {
        path.segments()
            .iter()
            .try_fold(&self.root, |node, segment| node.child(segment))
    }

    #[must_use]
    pub fn timeline(&self, path: &ParameterPath) -> Option<&Timeline> {
        match self.node(path)? {
            LegislationNode::Timeline(timeline) => Some(timeline),
            _ => None,
        }
    }

    /// Value of the parameter at `path` in force at `instant`.
    ///
    /// Returns `None` for unknown paths and for instants in a gap.
    #[must_use]
    pub fn lookup(&self, path: &ParameterPath, instant: Instant) -> Option<&Json> {
        match self.node(path)? {
            LegislationNode::Timeline(timeline) => timeline.value_at(instant),
            LegislationNode::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// The whole tree with every timeline replaced by its value at `instant`
    /// (`null` inside gaps).
    #[must_use]
    pub fn snapshot(&self, instant: Instant) -> Json {
        self.root.snapshot(instant)
    }

    /// Returns a new tree where the timeline at `path` holds `value` over
    /// `[start, stop]`. The receiver is left untouched and subtrees off the
    /// path are shared.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownParameterPath` if `path` does not lead
    /// to a timeline, or `InvalidInterval` if `start > stop`.
    pub fn update(
        &self,
        path: &ParameterPath,
        start: Instant,
        stop: Instant,
        value: Json,
    ) -> Result<Self, ValidationError> {
        let root = rebuild(&self.root, path.segments(), path, start, stop, value)?;
        Ok(Self { root })
    }
}

fn rebuild(
    node: &LegislationNode,
    remaining: &[PathSegment],
    path: &ParameterPath,
    start: Instant,
    stop: Instant,
    value: Json,
) -> Result<LegislationNode, ValidationError> {
    let unknown = || ValidationError::UnknownParameterPath { path: path.to_string() };
    let Some((segment, rest)) = remaining.split_first() else {
        return match node {
            LegislationNode::Timeline(timeline) => {
                Ok(LegislationNode::Timeline(Arc::new(timeline.patch(start, stop, value)?)))
            }
            _ => Err(unknown()),
        };
    };
    match (segment, node) {
        (segment, LegislationNode::Map(map)) => {
            let key = segment.to_string();
            let child = map.get(&key).ok_or_else(unknown)?;
            let updated = rebuild(child, rest, path, start, stop, value)?;
            let mut map = (**map).clone();
            map.insert(key, updated);
            Ok(LegislationNode::Map(Arc::new(map)))
        }
        (PathSegment::Index(index), LegislationNode::Sequence(items)) => {
            let child = items.get(*index).ok_or_else(unknown)?;
            let updated = rebuild(child, rest, path, start, stop, value)?;
            let mut items = (**items).clone();
            items[*index] = updated;
            Ok(LegislationNode::Sequence(Arc::new(items)))
        }
        _ => Err(unknown()),
    }
}
