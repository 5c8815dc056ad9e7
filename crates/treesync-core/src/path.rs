//! Paths addressing a location inside a value tree.
//!
//! The textual form is a JSON pointer with one extension: an array element
//! addressed by identity is written `[id]`, e.g. `/body/[abc]/title`.

use crate::identity::Identity;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// A map key
    Key(String),
    /// A literal array position, or the map key of the same spelling
    Index(usize),
    /// The array element whose identity matches, resolved at apply time
    Id(Identity),
}

impl PathStep {
    /// Step for a map key.
    ///
    /// Canonical decimal keys become [`PathStep::Index`], which is the form
    /// they take after a textual round-trip.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        let key = key.into();
        match canonical_index(&key) {
            Some(index) => PathStep::Index(index),
            None => PathStep::Key(key),
        }
    }

    /// Step for an identity-addressed array element.
    #[must_use]
    pub fn id(id: impl Into<Identity>) -> Self {
        PathStep::Id(id.into())
    }

    fn parse(segment: &str) -> Self {
        let unescaped = segment.replace("~1", "/").replace("~0", "~");
        if unescaped.len() >= 2 && unescaped.starts_with('[') && unescaped.ends_with(']') {
            return PathStep::Id(Identity::new(&unescaped[1..unescaped.len() - 1]));
        }
        PathStep::key(unescaped)
    }
}

fn canonical_index(segment: &str) -> Option<usize> {
    let canonical = segment == "0"
        || (!segment.is_empty()
            && !segment.starts_with('0')
            && segment.bytes().all(|b| b.is_ascii_digit()));
    if canonical {
        segment.parse().ok()
    } else {
        None
    }
}

fn escape(raw: &str) -> String {
    raw.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => f.write_str(&escape(key)),
            PathStep::Index(index) => write!(f, "{index}"),
            PathStep::Id(id) => write!(f, "[{}]", escape(id.as_str())),
        }
    }
}

/// Location inside a value, from the root down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    /// The empty path, addressing the whole value.
    #[must_use]
    pub fn root() -> Self {
        Self { steps: vec![] }
    }

    /// Create a path from steps.
    #[must_use]
    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps, outermost first.
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The final step, if any.
    #[must_use]
    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Append a step to the path.
    #[must_use]
    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// The path without its final step. The root is its own parent.
    #[must_use]
    pub fn parent(&self) -> Self {
        let mut steps = self.steps.clone();
        steps.pop();
        Self { steps }
    }

    /// Same parent, different final step.
    #[must_use]
    pub fn with_last(&self, step: PathStep) -> Self {
        self.parent().child(step)
    }

    /// Push a step in place.
    pub fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    /// Pop the final step in place.
    pub fn pop(&mut self) -> Option<PathStep> {
        self.steps.pop()
    }

    /// Parse the textual form. Parsing never fails; a missing leading `/`
    /// is tolerated.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::root();
        }
        let body = text.strip_prefix('/').unwrap_or(text);
        Self {
            steps: body.split('/').map(PathStep::parse).collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}
