use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub sequence: u64,
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEventKind {
    // Value edited ("input").
    Input,
    // Value committed ("change").
    Change,
    Click,
}

impl HostEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostEventKind::Input => "input",
            HostEventKind::Change => "change",
            HostEventKind::Click => "click",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostEvent {
    pub kind: HostEventKind,
    pub target: NodeRef,
}

pub type HostEventListener = Rc<dyn Fn(&HostEvent)>;

// Mutations made through this handle notify every observer.
#[derive(Clone)]
pub struct HostDocument {
    inner: Rc<HostInner>,
}

struct HostInner {
    root: NodeRef,
    observers: RefCell<Vec<mpsc::UnboundedSender<MutationRecord>>>,
    listeners: RefCell<Vec<HostEventListener>>,
    sequence: Cell<u64>,
}

impl HostDocument {
    pub fn parse(html: &str) -> Self {
        Self::from_root(kuchiki::parse_html().one(html))
    }

    pub fn from_root(root: NodeRef) -> Self {
        Self {
            inner: Rc::new(HostInner {
                root,
                observers: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                sequence: Cell::new(0),
            }),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.inner.root
    }

    pub fn body(&self) -> NodeRef {
        match self.inner.root.select_first("body") {
            Ok(body) => body.as_node().clone(),
            Err(()) => self.inner.root.clone(),
        }
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.inner
            .root
            .descendants()
            .find(|node| attr(node, "id").as_deref() == Some(id))
    }

    pub fn observe(&self) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.observers.borrow_mut().push(tx);
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    pub fn append_child(&self, parent: &NodeRef, child: NodeRef) {
        parent.append(child);
        self.notify(1, 0);
    }

    pub fn remove(&self, node: &NodeRef) {
        node.detach();
        self.notify(0, 1);
    }

    pub fn replace_children(&self, parent: &NodeRef, html: &str) {
        let removed = parent.children().count();
        for child in parent.children().collect::<Vec<_>>() {
            child.detach();
        }
        let added = append_fragment(parent, html);
        self.notify(added, removed);
    }

    pub fn mutate<F: FnOnce(&NodeRef)>(&self, edit: F) {
        edit(&self.inner.root);
        self.notify(1, 1);
    }

    pub fn add_event_listener<F>(&self, listener: F)
    where
        F: Fn(&HostEvent) + 'static,
    {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    pub fn dispatch(&self, target: &NodeRef, kind: HostEventKind) {
        let event = HostEvent {
            kind,
            target: target.clone(),
        };
        // Listeners may register further listeners; iterate over a snapshot.
        let listeners: Vec<HostEventListener> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    fn notify(&self, added: usize, removed: usize) {
        let sequence = self.inner.sequence.get().wrapping_add(1);
        self.inner.sequence.set(sequence);
        let record = MutationRecord {
            sequence,
            added,
            removed,
        };
        self.inner
            .observers
            .borrow_mut()
            .retain(|tx| tx.send(record).is_ok());
    }
}

pub fn parse_fragment(html: &str) -> Vec<NodeRef> {
    let document = kuchiki::parse_html().one(html);
    let Ok(body) = document.select_first("body") else {
        return Vec::new();
    };
    let nodes: Vec<NodeRef> = body.as_node().children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

pub fn parse_element(html: &str) -> Option<NodeRef> {
    parse_fragment(html)
        .into_iter()
        .find(|node| node.as_element().is_some())
}

fn append_fragment(parent: &NodeRef, html: &str) -> usize {
    let nodes = parse_fragment(html);
    let count = nodes.len();
    for node in nodes {
        parent.append(node);
    }
    count
}

pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get(name).map(|v| v.to_string()))
}

pub fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(el) = node.as_element() {
        el.attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub fn has_class(node: &NodeRef, class: &str) -> bool {
    attr(node, "class")
        .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

pub fn element_children(node: &NodeRef) -> impl Iterator<Item = NodeRef> + use<> {
    node.children().filter(|child| child.as_element().is_some())
}

pub fn is_leaf_element(node: &NodeRef) -> bool {
    node.as_element().is_some() && element_children(node).next().is_none()
}

pub fn closest<F>(node: &NodeRef, pred: F) -> Option<NodeRef>
where
    F: Fn(&NodeRef) -> bool,
{
    node.inclusive_ancestors()
        .find(|candidate| candidate.as_element().is_some() && pred(candidate))
}

pub fn is_attached(node: &NodeRef) -> bool {
    node.inclusive_ancestors()
        .last()
        .map(|top| matches!(top.data(), NodeData::Document(_)))
        .unwrap_or(false)
}

pub fn text_excluding(node: &NodeRef, skip_class: &str) -> String {
    let mut out = String::new();
    collect_text(node, skip_class, &mut out);
    out
}

fn collect_text(node: &NodeRef, skip_class: &str, out: &mut String) {
    match node.data() {
        NodeData::Text(text) => out.push_str(&text.borrow()),
        NodeData::Element(_) if has_class(node, skip_class) => {}
        _ => {
            for child in node.children() {
                collect_text(&child, skip_class, out);
            }
        }
    }
}

pub fn find_descendant<F>(node: &NodeRef, skip_class: &str, pred: &F) -> Option<NodeRef>
where
    F: Fn(&NodeRef) -> bool,
{
    for child in node.children() {
        if child.as_element().is_none() {
            continue;
        }
        if has_class(&child, skip_class) {
            continue;
        }
        if pred(&child) {
            return Some(child);
        }
        if let Some(found) = find_descendant(&child, skip_class, pred) {
            return Some(found);
        }
    }
    None
}
