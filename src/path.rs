//! Attribute paths.
//!
//! A [`Path`] identifies a location inside a typed value tree as an ordered
//! sequence of steps. Paths render the way they appear in diagnostics:
//! `network[0].tags["env"][Value("a")]`.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::types::Value;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// An object attribute or top-level schema attribute/block.
    AttributeName(String),
    /// A list element.
    ElementKeyInt(usize),
    /// A map element.
    ElementKeyString(String),
    /// A set element, addressed by its value.
    ElementKeyValue(Value),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeName(name) => write!(f, "{}", name),
            Self::ElementKeyInt(index) => write!(f, "[{}]", index),
            Self::ElementKeyString(key) => write!(f, "[{:?}]", key),
            Self::ElementKeyValue(value) => write!(f, "[Value({})]", value),
        }
    }
}

/// A location in a typed value tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    /// The empty path, addressing the whole tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A path starting at a top-level attribute or block.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            steps: vec![PathStep::AttributeName(name.into())],
        }
    }

    fn with_step(&self, step: PathStep) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend(self.steps.iter().cloned());
        steps.push(step);
        Self { steps }
    }

    /// Append an attribute name step.
    pub fn at_name(&self, name: impl Into<String>) -> Self {
        self.with_step(PathStep::AttributeName(name.into()))
    }

    /// Append a list index step.
    pub fn at_list_index(&self, index: usize) -> Self {
        self.with_step(PathStep::ElementKeyInt(index))
    }

    /// Append a set element step.
    pub fn at_set_value(&self, value: Value) -> Self {
        self.with_step(PathStep::ElementKeyValue(value))
    }

    /// Append a map key step.
    pub fn at_map_key(&self, key: impl Into<String>) -> Self {
        self.with_step(PathStep::ElementKeyString(key.into()))
    }

    /// The steps of this path.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The last step, if any.
    pub fn last_step(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// The path without its last step. `None` for the empty path.
    pub fn parent(&self) -> Option<Path> {
        let (_, rest) = self.steps.split_last()?;
        Some(Self {
            steps: rest.to_vec(),
        })
    }

    /// Whether this is the empty path.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 && matches!(step, PathStep::AttributeName(_)) {
                write!(f, ".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An ordered collection of distinct paths.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Paths(Vec<Path>);

impl Paths {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path unless it is already present.
    pub fn append(&mut self, path: Path) {
        if !self.contains(&path) {
            self.0.push(path);
        }
    }

    /// Add every path from another collection.
    pub fn extend(&mut self, paths: impl IntoIterator<Item = Path>) {
        for path in paths {
            self.append(path);
        }
    }

    /// Whether the path is present.
    pub fn contains(&self, path: &Path) -> bool {
        self.0.iter().any(|p| p == path)
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no paths.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the paths in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Path> {
        self.0.iter()
    }

    /// Sort lexically by rendered form and drop duplicates.
    pub fn normalise(&mut self) {
        let mut keyed: Vec<(String, Path)> = self
            .0
            .drain(..)
            .map(|path| (path.to_string(), path))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        self.0 = keyed.into_iter().map(|(_, path)| path).collect();
    }

    /// Consume the collection.
    pub fn into_vec(self) -> Vec<Path> {
        self.0
    }
}

impl IntoIterator for Paths {
    type Item = Path;
    type IntoIter = std::vec::IntoIter<Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Paths {
    type Item = &'a Path;
    type IntoIter = std::slice::Iter<'a, Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Path> for Paths {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> Self {
        let mut paths = Paths::new();
        paths.extend(iter);
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeType;

    #[test]
    fn test_path_display() {
        let path = Path::root("network")
            .at_list_index(0)
            .at_name("tags")
            .at_map_key("env")
            .at_set_value(Value::string("a"));
        assert_eq!(path.to_string(), r#"network[0].tags["env"][Value("a")]"#);
        assert_eq!(Path::empty().to_string(), "");
    }

    #[test]
    fn test_path_parent() {
        let path = Path::root("rule").at_list_index(2).at_name("port");
        assert_eq!(path.parent(), Some(Path::root("rule").at_list_index(2)));
        assert_eq!(Path::root("rule").parent(), Some(Path::empty()));
        assert_eq!(Path::empty().parent(), None);
        assert_eq!(path.last_step(), Some(&PathStep::AttributeName("port".to_string())));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_set_value_step_equality_ignores_order() {
        let a = Path::root("ports").at_set_value(Value::set(
            AttributeType::Int64,
            vec![Value::Int64(1), Value::Int64(2)],
        ));
        let b = Path::root("ports").at_set_value(Value::set(
            AttributeType::Int64,
            vec![Value::Int64(2), Value::Int64(1)],
        ));
        assert_eq!(a, b);
    }

    #[test]
    fn test_paths_append_dedupes() {
        let mut paths = Paths::new();
        paths.append(Path::root("name"));
        paths.append(Path::root("name"));
        paths.append(Path::root("id"));
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&Path::root("id")));
    }

    #[test]
    fn test_paths_normalise() {
        let mut paths: Paths = vec![
            Path::root("zone"),
            Path::root("disk").at_list_index(1),
            Path::root("disk").at_list_index(0),
        ]
        .into_iter()
        .collect();
        paths.normalise();
        let rendered: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["disk[0]", "disk[1]", "zone"]);
    }

    #[test]
    fn test_path_serializes_as_string() {
        let path = Path::root("tags").at_map_key("env");
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            serde_json::json!("tags[\"env\"]")
        );
    }
}
