//! Path selectors
//!
//! A deliberately small selector language used to find secondary-stage
//! targets inside freshly synchronized content. Expressions are evaluated
//! relative to a root node and never go through access hooks.
//!
//! Supports:
//! - Child steps: `rows/row`
//! - Name wildcard: `*`
//! - Descendant axis: `//row`, `table//cell`
//! - Self: `.`
//! - Attribute predicates: `row[@id]`, `row[@kind='view']`, `row[@kind="view"]`
//!
//! # Examples
//!
//! ```
//! use tree_pager::selector::Selector;
//! use tree_pager::tree::Tree;
//!
//! let mut tree = Tree::new();
//! let root = tree.create("db");
//! let table = tree.create("table");
//! tree.insert_child(root, table, None).unwrap();
//!
//! let selector = Selector::parse("table").unwrap();
//! assert_eq!(selector.select(&tree, root).unwrap(), vec![table]);
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    attribute: String,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    /// `None` matches any name
    name: Option<String>,
    predicates: Vec<Predicate>,
}

impl Step {
    fn matches(&self, tree: &Tree, node: NodeId) -> Result<bool> {
        let data = tree.get(node)?;
        if let Some(name) = &self.name {
            if data.name() != name {
                return Ok(false);
            }
        }
        Ok(self.predicates.iter().all(|p| {
            match (data.attributes().get(&p.attribute), &p.value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        }))
    }
}

/// A parsed selector expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    expression: String,
    steps: Vec<Step>,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl Selector {
    /// Parse a selector expression
    ///
    /// # Errors
    ///
    /// Returns `Error::Selector` for empty expressions, empty steps, absolute
    /// paths and unterminated predicates.
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |message: &str| Error::Selector {
            expression: expression.to_string(),
            message: message.to_string(),
        };

        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty expression"));
        }

        let mut steps = Vec::new();
        let mut axis = Axis::Child;
        let mut current = String::new();
        let mut chars = trimmed.chars().peekable();
        let mut bracket_depth = 0usize;
        let mut quote: Option<char> = None;

        if trimmed.starts_with('/') && !trimmed.starts_with("//") {
            return Err(invalid("selectors are relative; remove the leading '/'"));
        }

        while let Some(ch) = chars.next() {
            if let Some(q) = quote {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' if bracket_depth > 0 => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '[' => {
                    bracket_depth += 1;
                    current.push(ch);
                }
                ']' => {
                    if bracket_depth == 0 {
                        return Err(invalid("unbalanced ']'"));
                    }
                    bracket_depth -= 1;
                    current.push(ch);
                }
                '/' if bracket_depth == 0 => {
                    if current.is_empty() {
                        if chars.peek() == Some(&'/') || steps.is_empty() {
                            // `//` at the start or between steps
                            if chars.peek() == Some(&'/') {
                                chars.next();
                            }
                            axis = Axis::Descendant;
                            continue;
                        }
                        return Err(invalid("empty step"));
                    }
                    steps.push(Self::parse_step(&current, axis, &invalid)?);
                    current.clear();
                    axis = Axis::Child;
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        axis = Axis::Descendant;
                    }
                }
                _ => current.push(ch),
            }
        }

        if quote.is_some() || bracket_depth > 0 {
            return Err(invalid("unterminated predicate"));
        }
        if current.is_empty() {
            return Err(invalid("trailing '/'"));
        }
        steps.push(Self::parse_step(&current, axis, &invalid)?);

        Ok(Self {
            expression: trimmed.to_string(),
            steps,
        })
    }

    fn parse_step(text: &str, axis: Axis, invalid: &dyn Fn(&str) -> Error) -> Result<Step> {
        let (head, mut rest) = match text.find('[') {
            Some(pos) => (&text[..pos], &text[pos..]),
            None => (text, ""),
        };
        let head = head.trim();

        if head == "." {
            if axis != Axis::Child || !rest.is_empty() {
                return Err(invalid("'.' takes no axis or predicates"));
            }
            return Ok(Step {
                axis: Axis::SelfNode,
                name: None,
                predicates: Vec::new(),
            });
        }
        if head.is_empty() {
            return Err(invalid("missing step name"));
        }

        let mut predicates = Vec::new();
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| invalid("unterminated predicate"))?;
            let body = rest[1..close].trim();
            rest = &rest[close + 1..];
            let body = body
                .strip_prefix('@')
                .ok_or_else(|| invalid("predicates must start with '@'"))?;
            let predicate = match body.split_once('=') {
                Some((attribute, value)) => {
                    let value = value.trim();
                    let unquoted = value
                        .strip_prefix('\'')
                        .and_then(|v| v.strip_suffix('\''))
                        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                        .ok_or_else(|| invalid("predicate values must be quoted"))?;
                    Predicate {
                        attribute: attribute.trim().to_string(),
                        value: Some(unquoted.to_string()),
                    }
                }
                None => Predicate {
                    attribute: body.to_string(),
                    value: None,
                },
            };
            if predicate.attribute.is_empty() {
                return Err(invalid("missing attribute name"));
            }
            predicates.push(predicate);
        }

        Ok(Step {
            axis,
            name: (head != "*").then(|| head.to_string()),
            predicates,
        })
    }

    /// The original expression text
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate against `root`, returning matches in document order without
    /// duplicates.
    pub fn select(&self, tree: &Tree, root: NodeId) -> Result<Vec<NodeId>> {
        let mut context = vec![root];
        for step in &self.steps {
            let mut next = Vec::new();
            for node in &context {
                let candidates: Vec<NodeId> = match step.axis {
                    Axis::SelfNode => vec![*node],
                    Axis::Child => tree.children(*node)?.to_vec(),
                    Axis::Descendant => tree.descendants(*node)?.into_iter().skip(1).collect(),
                };
                for candidate in candidates {
                    if step.matches(tree, candidate)? && !next.contains(&candidate) {
                        next.push(candidate);
                    }
                }
            }
            context = next;
        }

        let order: HashMap<NodeId, usize> = tree
            .descendants(root)?
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        context.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
        Ok(context)
    }
}
