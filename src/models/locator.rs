use serde::{Deserialize, Serialize};
use std::fmt;

/// How a single locator strategy addresses an element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Id,
    Name,
    CssSelector,
    Xpath,
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LocatorKind::Id => "id",
            LocatorKind::Name => "name",
            LocatorKind::CssSelector => "css",
            LocatorKind::Xpath => "xpath",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LocatorStrategy {
    pub kind: LocatorKind,
    pub selector: String,
}

impl LocatorStrategy {
    pub fn new(kind: LocatorKind, selector: impl Into<String>) -> Self {
        Self {
            kind,
            selector: selector.into(),
        }
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(LocatorKind::Id, selector)
    }

    pub fn name(selector: impl Into<String>) -> Self {
        Self::new(LocatorKind::Name, selector)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(LocatorKind::CssSelector, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(LocatorKind::Xpath, selector)
    }

    /// CSS equivalent for every kind except XPath. Attribute selectors are
    /// used for ids and names so values like `loginform:username` need no
    /// escaping of CSS metacharacters.
    pub fn to_css(&self) -> Option<String> {
        match self.kind {
            LocatorKind::Id => Some(format!("[id=\"{}\"]", escape_attr(&self.selector))),
            LocatorKind::Name => Some(format!("[name=\"{}\"]", escape_attr(&self.selector))),
            LocatorKind::CssSelector => Some(self.selector.clone()),
            LocatorKind::Xpath => None,
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.selector)
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Ordered list of strategies, most precise first. The first strategy that
/// yields a present element wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocatorSpec(Vec<LocatorStrategy>);

impl LocatorSpec {
    pub fn new(strategies: Vec<LocatorStrategy>) -> Self {
        Self(strategies)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LocatorStrategy> {
        self.0.iter()
    }

    /// Human-readable list of strategies, used in `ElementNotFound` diagnostics.
    pub fn describe(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl From<Vec<LocatorStrategy>> for LocatorSpec {
    fn from(strategies: Vec<LocatorStrategy>) -> Self {
        Self(strategies)
    }
}

impl<'a> IntoIterator for &'a LocatorSpec {
    type Item = &'a LocatorStrategy;
    type IntoIter = std::slice::Iter<'a, LocatorStrategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
