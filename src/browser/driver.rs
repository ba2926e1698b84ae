use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::models::{LocatorKind, LocatorStrategy};
use crate::utils::error::Result;

/// DOM subtree an element lookup is evaluated against.
///
/// Frames and shadow roots are addressed by the strategy that locates their
/// host element in the top-level document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DomScope {
    Document,
    Frame(LocatorStrategy),
    ShadowRoot(LocatorStrategy),
}

impl fmt::Display for DomScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomScope::Document => f.write_str("document"),
            DomScope::Frame(host) => write!(f, "frame({})", host),
            DomScope::ShadowRoot(host) => write!(f, "shadow({})", host),
        }
    }
}

/// A resolved element: the scope it lives in and the strategy that found it.
///
/// Handles hold no live reference; every action re-runs the lookup, so a page
/// mutation surfaces as a stale-element error instead of acting on a detached
/// node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub scope: DomScope,
    pub strategy: LocatorStrategy,
}

impl ElementHandle {
    pub fn new(scope: DomScope, strategy: LocatorStrategy) -> Self {
        Self { scope, strategy }
    }
}

/// Browser primitives the session and resolver are built on.
///
/// Implementations are blocking; async callers drive them from
/// `tokio::task::spawn_blocking`.
#[cfg_attr(test, mockall::automock)]
pub trait PageDriver: Send {
    fn navigate(&mut self, url: &str) -> Result<()>;

    fn current_url(&self) -> String;

    /// Rendered DOM serialized after client-side scripts have run.
    fn page_source(&self) -> Result<String>;

    /// Waits up to `timeout` for the strategy to match inside `scope`.
    /// Returns `Ok(false)` on timeout.
    fn wait_for(&self, scope: &DomScope, strategy: &LocatorStrategy, timeout: Duration) -> Result<bool>;

    fn click(&mut self, element: &ElementHandle) -> Result<()>;

    /// Clears the field, then types `text` into it.
    fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<()>;

    fn read_value(&self, element: &ElementHandle) -> Result<String>;

    /// Absolute `href` of every anchor in the current document.
    fn collect_links(&self) -> Result<Vec<String>>;

    fn close(&mut self) -> Result<()>;
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn js_find(root: &str, strategy: &LocatorStrategy) -> String {
    match strategy.to_css() {
        Some(css) => format!("{root}.querySelector({})", js_string(&css)),
        None => {
            // Absolute paths are rebased onto the scoped root
            let xpath = if strategy.selector.starts_with('/') && !strategy.selector.starts_with("//") {
                format!(".{}", strategy.selector)
            } else {
                strategy.selector.clone()
            };
            format!(
                "(({root}).ownerDocument || {root}).evaluate({}, {root}, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(&xpath)
            )
        }
    }
}

/// JavaScript expression that evaluates to the element addressed by
/// `strategy` inside `scope`, or `null`.
pub fn js_lookup(scope: &DomScope, strategy: &LocatorStrategy) -> String {
    match scope {
        DomScope::Document => {
            if strategy.kind == LocatorKind::Xpath {
                format!(
                    "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                    js_string(&strategy.selector)
                )
            } else {
                js_find("document", strategy)
            }
        }
        DomScope::Frame(host) => format!(
            "(function() {{ const host = {}; const root = host && host.contentDocument; return root ? {} : null; }})()",
            js_lookup(&DomScope::Document, host),
            js_find("root", strategy)
        ),
        DomScope::ShadowRoot(host) => format!(
            "(function() {{ const host = {}; const root = host && host.shadowRoot; return root ? {} : null; }})()",
            js_lookup(&DomScope::Document, host),
            js_find("root", strategy)
        ),
    }
}
