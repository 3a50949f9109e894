use barcode_overlay_contract as contract;
use kuchiki::NodeRef;
use tracing::{debug, info};

use crate::config::InjectConfig;
use crate::detect::{FieldHandle, field_input, has_marker};
use crate::dom::{HostDocument, parse_element, tag_name};

const PRINTER_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="14" height="14" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><polyline points="6 9 6 2 18 2 18 9"></polyline><path d="M6 18H4a2 2 0 0 1-2-2v-5a2 2 0 0 1 2-2h16a2 2 0 0 1 2 2v5a2 2 0 0 1-2 2h-2"></path><rect x="6" y="14" width="12" height="8"></rect></svg>"#;

const REFRESH_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="14" height="14" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><polyline points="23 4 23 10 17 10"></polyline><path d="M20.49 15a9 9 0 1 1-2.12-9.36L23 10"></path></svg>"#;

// Tags treated as block-level form containers. Table cells and inline elements are
// list/readonly renderings and never get a Generate control.
const BLOCK_TAGS: &[&str] = &["div", "section", "article", "fieldset", "form", "p", "li"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Print,
    Generate,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Print => contract::ACTION_PRINT,
            ControlAction::Generate => contract::ACTION_GENERATE,
        }
    }

    pub fn from_attr(raw: &str) -> Option<Self> {
        match raw {
            contract::ACTION_PRINT => Some(ControlAction::Print),
            contract::ACTION_GENERATE => Some(ControlAction::Generate),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ButtonInjector {
    doc: HostDocument,
    config: InjectConfig,
}

impl ButtonInjector {
    pub fn new(doc: HostDocument, config: InjectConfig) -> Self {
        Self { doc, config }
    }

    // Block-level field with an input: an edit-mode widget, not a list cell.
    pub fn allows_generate(&self, handle: &FieldHandle) -> bool {
        if !self.config.generate_enabled {
            return false;
        }
        let block = tag_name(handle.node())
            .map(|tag| BLOCK_TAGS.contains(&tag.as_str()))
            .unwrap_or(false);
        block && field_input(handle.node()).is_some()
    }

    pub fn inject(&self, handle: &FieldHandle, allow_generate: bool) -> bool {
        let container = handle.node();
        if has_marker(container) {
            debug!("field already carries controls; skipping");
            return false;
        }
        let Some(wrapper) = parse_element(&self.wrapper_html(allow_generate)) else {
            return false;
        };
        self.doc.append_child(container, wrapper);
        info!(
            strategy = ?handle.strategy(),
            generate = allow_generate,
            "injected barcode controls"
        );
        true
    }

    fn wrapper_html(&self, allow_generate: bool) -> String {
        let mut out = format!(
            "<div class=\"{wrapper}\"><button type=\"button\" class=\"{class}\" {attr}=\"{action}\">{icon}<span>{label}</span></button>",
            wrapper = contract::WRAPPER_CLASS,
            class = contract::PRINT_BUTTON_CLASS,
            attr = contract::ACTION_ATTRIBUTE,
            action = ControlAction::Print.as_str(),
            icon = PRINTER_ICON,
            label = escape_text(&self.config.print_label),
        );
        if allow_generate {
            out.push_str(&format!(
                "<button type=\"button\" class=\"{class}\" {attr}=\"{action}\">{icon}<span>{label}</span></button>",
                class = contract::GENERATE_BUTTON_CLASS,
                attr = contract::ACTION_ATTRIBUTE,
                action = ControlAction::Generate.as_str(),
                icon = REFRESH_ICON,
                label = escape_text(&self.config.generate_label),
            ));
        }
        out.push_str("</div>");
        out
    }
}

pub fn control_action(node: &NodeRef) -> Option<(ControlAction, NodeRef)> {
    node.inclusive_ancestors().find_map(|candidate| {
        crate::dom::attr(&candidate, contract::ACTION_ATTRIBUTE)
            .and_then(|raw| ControlAction::from_attr(&raw))
            .map(|action| (action, candidate))
    })
}

pub fn control_field(control: &NodeRef) -> Option<NodeRef> {
    crate::dom::closest(control, |node| {
        crate::dom::has_class(node, contract::WRAPPER_CLASS)
    })
    .and_then(|wrapper| wrapper.parent())
}

pub(crate) fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
