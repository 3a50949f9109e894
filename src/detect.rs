use barcode_overlay_contract as contract;
use kuchiki::NodeRef;
use tracing::debug;

use crate::dom::{
    self, attr, closest, element_children, find_descendant, has_class, is_leaf_element, tag_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    // `[name="barcode"]` widget containers.
    Primary,
    // "Barcode" label text and its sibling value cell.
    Fallback,
}

// Values are read on demand, so a handle reflects the page as it is now.
#[derive(Debug, Clone)]
pub struct FieldHandle {
    node: NodeRef,
    strategy: DetectionStrategy,
}

impl FieldHandle {
    pub fn new(node: NodeRef, strategy: DetectionStrategy) -> Self {
        Self { node, strategy }
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    pub fn input(&self) -> Option<NodeRef> {
        field_input(&self.node)
    }

    pub fn is_editable(&self) -> bool {
        self.input().is_some()
    }

    pub fn current_value(&self) -> String {
        field_value(&self.node)
    }

    pub fn has_injected_marker(&self) -> bool {
        has_marker(&self.node)
    }

    pub fn is_attached(&self) -> bool {
        dom::is_attached(&self.node)
    }
}

pub fn field_input(container: &NodeRef) -> Option<NodeRef> {
    find_descendant(container, contract::WRAPPER_CLASS, &|node| {
        tag_name(node).as_deref() == Some("input")
    })
}

// Input value in edit mode, else the trimmed text minus injected controls.
pub fn field_value(container: &NodeRef) -> String {
    match field_input(container) {
        Some(input) => attr(&input, "value").unwrap_or_default(),
        None => dom::text_excluding(container, contract::WRAPPER_CLASS)
            .trim()
            .to_string(),
    }
}

pub fn has_marker(container: &NodeRef) -> bool {
    container
        .select_first(&format!(".{}", contract::WRAPPER_CLASS))
        .is_ok()
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty() || value == contract::PLACEHOLDER_TEXT
}

#[derive(Debug, Clone, Default)]
pub struct FieldDetector;

impl FieldDetector {
    pub fn new() -> Self {
        Self
    }

    // Fallback runs only when no node carries the primary attribute at all, marked or not.
    pub fn scan(&self, root: &NodeRef) -> FieldScan {
        let primary = primary_candidates(root);
        if !primary.is_empty() {
            debug!(candidates = primary.len(), "primary barcode candidates");
            return FieldScan {
                strategy: DetectionStrategy::Primary,
                candidates: primary.into_iter(),
            };
        }
        let labels = fallback_labels(root);
        if !labels.is_empty() {
            debug!(labels = labels.len(), "fallback barcode labels");
        }
        FieldScan {
            strategy: DetectionStrategy::Fallback,
            candidates: labels.into_iter(),
        }
    }

    pub fn editable_fields(&self, root: &NodeRef) -> Vec<FieldHandle> {
        primary_candidates(root)
            .into_iter()
            .filter(|node| field_input(node).is_some())
            .map(|node| FieldHandle::new(node, DetectionStrategy::Primary))
            .collect()
    }
}

fn primary_candidates(root: &NodeRef) -> Vec<NodeRef> {
    match root.select(contract::FIELD_SELECTOR) {
        Ok(found) => found.map(|el| el.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    }
}

fn fallback_labels(root: &NodeRef) -> Vec<NodeRef> {
    root.descendants()
        .filter(|node| is_leaf_element(node))
        .filter(|node| node.text_contents().trim() == contract::LABEL_TEXT)
        .collect()
}

// Acceptance is decided as the iterator advances, so markers placed while
// consuming earlier items are seen by later ones.
pub struct FieldScan {
    strategy: DetectionStrategy,
    candidates: std::vec::IntoIter<NodeRef>,
}

impl FieldScan {
    pub fn strategy(&self) -> DetectionStrategy {
        self.strategy
    }
}

impl Iterator for FieldScan {
    type Item = FieldHandle;

    fn next(&mut self) -> Option<FieldHandle> {
        for candidate in self.candidates.by_ref() {
            let accepted = match self.strategy {
                DetectionStrategy::Primary => accept_primary(&candidate),
                DetectionStrategy::Fallback => accept_fallback(&candidate),
            };
            if let Some(node) = accepted {
                return Some(FieldHandle::new(node, self.strategy));
            }
        }
        None
    }
}

fn accept_primary(field: &NodeRef) -> Option<NodeRef> {
    if has_marker(field) {
        return None;
    }
    if field_input(field).is_some() {
        return Some(field.clone());
    }
    let text = field_value(field);
    if is_placeholder(&text) {
        return None;
    }
    Some(field.clone())
}

fn accept_fallback(label: &NodeRef) -> Option<NodeRef> {
    let container = closest(label, |node| has_class(node, contract::ROW_CONTAINER_CLASS))
        .or_else(|| label.parent().and_then(|parent| parent.parent()))?;
    let hint = format!(".{}", contract::VALUE_HINT_CLASS);
    let value_node = match container.select_first(&hint) {
        Ok(found) => found.as_node().clone(),
        Err(()) => element_children(&container).nth(1)?,
    };
    if has_marker(&value_node) {
        return None;
    }
    let text = field_value(&value_node);
    if is_placeholder(&text) || text == contract::LABEL_TEXT {
        return None;
    }
    Some(value_node)
}
