//! page.rs - Minimal document model for the DOM-based fallbacks
//!
//! The host (browser bridge, headless driver, saved HTML) exposes the
//! product page as a `PageNode` tree through the `SellerPage` trait. The
//! resolver only reads the tree and occasionally activates one control.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Structural locator for an element. Lists of these are tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// `data-testid` equal to the value
    TestId(&'static str),
    /// Class list contains the class
    Class(&'static str),
    /// Attribute value contains the needle (case-insensitive)
    AttrContains(&'static str, &'static str),
    Tag(&'static str),
}

impl Locator {
    pub fn matches(&self, node: &PageNode) -> bool {
        match *self {
            Locator::TestId(id) => node.attr("data-testid") == Some(id),
            Locator::Class(class) => node.has_class(class),
            Locator::AttrContains(name, needle) => node
                .attr(name)
                .map_or(false, |v| v.to_lowercase().contains(&needle.to_lowercase())),
            Locator::Tag(tag) => node.tag.eq_ignore_ascii_case(tag),
        }
    }
}

/// One element with its own text and children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Text directly inside this element, excluding children.
    pub text: String,
    pub children: Vec<PageNode>,
}

impl PageNode {
    pub fn new(tag: &str) -> Self {
        PageNode { tag: tag.to_string(), ..Default::default() }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: PageNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map_or(false, |classes| classes.split_whitespace().any(|c| c == class))
    }

    /// All text in the subtree, whitespace-collapsed.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        if !self.text.trim().is_empty() {
            parts.push(self.text.trim());
        }
        for child in &self.children {
            child.collect_text(parts);
        }
    }

    /// First descendant (depth-first, document order) matching the locator.
    pub fn find_first(&self, locator: &Locator) -> Option<&PageNode> {
        self.find_with_parent(locator).map(|(node, _)| node)
    }

    /// First matching descendant together with its parent.
    pub fn find_with_parent(&self, locator: &Locator) -> Option<(&PageNode, &PageNode)> {
        for child in &self.children {
            if locator.matches(child) {
                return Some((child, self));
            }
            if let Some(found) = child.find_with_parent(locator) {
                return Some(found);
            }
        }
        None
    }

    /// First descendant matching any locator, trying locators in priority order.
    pub fn find_first_of(&self, locators: &[Locator]) -> Option<&PageNode> {
        locators.iter().find_map(|l| self.find_first(l))
    }

    pub fn find_all(&self, locator: &Locator) -> Vec<&PageNode> {
        self.find_all_outside(locator, &[])
    }

    /// Matching descendants, not descending into subtrees matched by `excluded`.
    pub fn find_all_outside(&self, locator: &Locator, excluded: &[Locator]) -> Vec<&PageNode> {
        let mut found = Vec::new();
        self.walk_outside(locator, excluded, &mut found);
        found
    }

    fn walk_outside<'a>(&'a self, locator: &Locator, excluded: &[Locator], found: &mut Vec<&'a PageNode>) {
        for child in &self.children {
            if excluded.iter().any(|e| e.matches(child)) {
                continue;
            }
            if locator.matches(child) {
                found.push(child);
            }
            child.walk_outside(locator, excluded, found);
        }
    }
}

/// Access to the live product page.
pub trait SellerPage: Send + Sync {
    /// Current document tree. Called again after waits, so live pages
    /// should return fresh state.
    fn root(&self) -> PageNode;

    /// Activate (click) the first element matching the locator.
    /// Returns false when nothing matched.
    fn activate(&self, locator: &Locator) -> bool;

    /// Bodies of inline data and state `<script>` blocks: JSON types plus
    /// untyped or JavaScript scripts. External (`src`) scripts are skipped.
    fn inline_scripts(&self) -> Vec<String> {
        self.root()
            .find_all(&Locator::Tag("script"))
            .into_iter()
            .filter(|s| s.attr("src").is_none() && !s.text.trim().is_empty())
            .filter(|s| {
                s.attr("type").map_or(true, |t| {
                    let t = t.to_ascii_lowercase();
                    t.contains("json") || t.contains("javascript")
                })
            })
            .map(|s| s.text.clone())
            .collect()
    }
}

// ============================================================================
// StaticPage - in-memory page, for saved documents and tests
// ============================================================================

#[derive(Debug, Default)]
struct StaticPageState {
    root: PageNode,
    /// Subtree appended to the root on the first activation.
    expansion: Option<PageNode>,
    activations: u32,
}

/// Page backed by an owned tree
#[derive(Debug, Default)]
pub struct StaticPage {
    state: Mutex<StaticPageState>,
}

impl StaticPage {
    pub fn new(root: PageNode) -> Self {
        StaticPage {
            state: Mutex::new(StaticPageState { root, ..Default::default() }),
        }
    }

    /// Reveal `expansion` once a control is activated, like a "show all" button.
    pub fn with_expansion(self, expansion: PageNode) -> Self {
        self.lock().expansion = Some(expansion);
        self
    }

    pub fn activations(&self) -> u32 {
        self.lock().activations
    }

    fn lock(&self) -> MutexGuard<'_, StaticPageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SellerPage for StaticPage {
    fn root(&self) -> PageNode {
        self.lock().root.clone()
    }

    fn activate(&self, locator: &Locator) -> bool {
        let mut state = self.lock();
        if state.root.find_first(locator).is_none() {
            return false;
        }
        state.activations += 1;
        if let Some(expansion) = state.expansion.take() {
            state.root.children.push(expansion);
        }
        true
    }
}
