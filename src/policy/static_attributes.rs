//! Static attribute patterns
//!
//! Static attributes are cache-stable metadata (identifiers, names) that can
//! be read or written on a dirty reference without populating it.

use std::fmt;

/// One pattern from a static-attribute list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributePattern {
    /// `*`: every attribute
    Any,
    /// `prefix:*`: every attribute in a namespace. Holds `prefix:`.
    Namespace(String),
    /// An exact attribute name
    Exact(String),
}

impl AttributePattern {
    /// Parse a single pattern. Surrounding whitespace is ignored.
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            AttributePattern::Any
        } else if let Some(prefix) = pattern.strip_suffix(":*") {
            AttributePattern::Namespace(format!("{}:", prefix))
        } else {
            AttributePattern::Exact(pattern.to_string())
        }
    }

    /// Check whether an attribute name matches
    pub fn matches(&self, name: &str) -> bool {
        match self {
            AttributePattern::Any => true,
            AttributePattern::Namespace(prefix) => name.starts_with(prefix.as_str()),
            AttributePattern::Exact(exact) => exact == name,
        }
    }
}

impl fmt::Display for AttributePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributePattern::Any => f.write_str("*"),
            AttributePattern::Namespace(prefix) => write!(f, "{}*", prefix),
            AttributePattern::Exact(name) => f.write_str(name),
        }
    }
}

/// Ordered list of static attribute patterns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticAttributes {
    patterns: Vec<AttributePattern>,
}

impl StaticAttributes {
    /// No static attributes: every access is intercepted
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `"id, ns:*"`
    pub fn parse(list: &str) -> Self {
        Self {
            patterns: list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(AttributePattern::parse)
                .collect(),
        }
    }

    /// Build from individual patterns
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| AttributePattern::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[AttributePattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check whether an access is exempt from syncing.
    ///
    /// `None` stands for "all attributes" (and for the node value); it is
    /// static only when `*` is the first pattern.
    pub fn matches(&self, name: Option<&str>) -> bool {
        match name {
            None => matches!(self.patterns.first(), Some(AttributePattern::Any)),
            Some(name) => self.patterns.iter().any(|p| p.matches(name)),
        }
    }
}

impl fmt::Display for StaticAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.patterns.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(","))
    }
}
