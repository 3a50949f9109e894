use std::cell::RefCell;

use barcode_overlay_contract as contract;
use kuchiki::NodeRef;
use lightningcss::properties::Property;
use lightningcss::properties::size::Size;
use lightningcss::stylesheet::{ParserOptions, StyleAttribute};
use lightningcss::values::length::{LengthPercentage, LengthPercentageOrAuto};
use tracing::{debug, info, warn};

use crate::config::PrintConfig;
use crate::dom::{HostDocument, attr, parse_element, set_attr};
use crate::image_url::BarcodeImageUrl;
use crate::inject::escape_text;
use crate::print::PrintJob;

const PRINT_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><polyline points="6 9 6 2 18 2 18 9"></polyline><path d="M6 18H4a2 2 0 0 1-2-2v-5a2 2 0 0 1 2-2h16a2 2 0 0 1 2 2v5a2 2 0 0 1-2 2h-2"></path><rect x="6" y="14" width="12" height="8"></rect></svg>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Open,
    Printing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModalSession {
    pub barcode: String,
    pub width: String,
    pub height: String,
    pub copies: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewGeometry {
    pub width_px: f64,
    pub height_px: f64,
    pub padding_px: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalField {
    Width,
    Height,
    Copies,
}

impl ModalField {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            contract::MODAL_WIDTH_INPUT_ID => Some(ModalField::Width),
            contract::MODAL_HEIGHT_INPUT_ID => Some(ModalField::Height),
            contract::MODAL_COPIES_INPUT_ID => Some(ModalField::Copies),
            _ => None,
        }
    }
}

struct ActiveModal {
    session: ModalSession,
    overlay: NodeRef,
    state: ModalState,
}

pub struct PrintModal {
    doc: HostDocument,
    image_url: BarcodeImageUrl,
    config: PrintConfig,
    active: RefCell<Option<ActiveModal>>,
}

impl PrintModal {
    pub fn new(doc: HostDocument, image_url: BarcodeImageUrl, config: PrintConfig) -> Self {
        Self {
            doc,
            image_url,
            config,
            active: RefCell::new(None),
        }
    }

    pub fn state(&self) -> ModalState {
        self.active
            .borrow()
            .as_ref()
            .map(|active| active.state)
            .unwrap_or(ModalState::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.state() == ModalState::Open
    }

    pub fn session(&self) -> Option<ModalSession> {
        self.active
            .borrow()
            .as_ref()
            .map(|active| active.session.clone())
    }

    pub fn open(&self, barcode: &str) {
        self.teardown();
        while let Some(stray) = self.doc.get_element_by_id(contract::MODAL_ID) {
            self.doc.remove(&stray);
        }

        let session = ModalSession {
            barcode: barcode.to_string(),
            width: format_number(self.config.default_width_mm),
            height: format_number(self.config.default_height_mm),
            copies: self.config.default_copies.max(1),
        };
        let Some(overlay) = parse_element(&overlay_html(&session)) else {
            return;
        };
        self.doc.append_child(&self.doc.body(), overlay.clone());
        *self.active.borrow_mut() = Some(ActiveModal {
            session,
            overlay,
            state: ModalState::Open,
        });
        self.update_preview();
        info!(barcode, "print dialog opened");
    }

    pub fn set_width(&self, raw: &str) {
        self.edit(ModalField::Width, raw);
    }

    pub fn set_height(&self, raw: &str) {
        self.edit(ModalField::Height, raw);
    }

    pub fn set_copies(&self, raw: &str) {
        self.edit(ModalField::Copies, raw);
    }

    pub fn edit(&self, field: ModalField, raw: &str) {
        {
            let mut active = self.active.borrow_mut();
            let Some(active) = active.as_mut().filter(|a| a.state == ModalState::Open) else {
                return;
            };
            match field {
                ModalField::Width => {
                    active.session.width = raw.to_string();
                    set_input_value(&active.overlay, contract::MODAL_WIDTH_INPUT_ID, raw);
                }
                ModalField::Height => {
                    active.session.height = raw.to_string();
                    set_input_value(&active.overlay, contract::MODAL_HEIGHT_INPUT_ID, raw);
                }
                ModalField::Copies => {
                    active.session.copies = parse_copies(raw, self.config.max_copies);
                    let shown = active.session.copies.to_string();
                    set_input_value(&active.overlay, contract::MODAL_COPIES_INPUT_ID, &shown);
                }
            }
        }
        debug!(field = ?field, raw, "print dialog edited");
        self.update_preview();
    }

    pub fn preview(&self) -> Option<PreviewGeometry> {
        let active = self.active.borrow();
        let session = &active.as_ref()?.session;
        let width = preview_dimension(&session.width, self.config.default_width_mm);
        let height = preview_dimension(&session.height, self.config.default_height_mm);
        Some(PreviewGeometry {
            width_px: width * self.config.px_per_mm,
            height_px: height * self.config.px_per_mm,
            padding_px: self.config.inset_mm * self.config.px_per_mm,
        })
    }

    pub fn rendered_preview(&self) -> Option<PreviewGeometry> {
        let active = self.active.borrow();
        let overlay = &active.as_ref()?.overlay;
        let boxed = find_by_id(overlay, contract::MODAL_PREVIEW_BOX_ID)?;
        parse_preview_style(&attr(&boxed, "style")?)
    }

    pub fn preview_image_src(&self) -> Option<String> {
        let active = self.active.borrow();
        let overlay = &active.as_ref()?.overlay;
        find_by_id(overlay, contract::MODAL_PREVIEW_IMAGE_ID).and_then(|img| attr(&img, "src"))
    }

    pub fn cancel(&self) {
        if self.teardown() {
            info!("print dialog dismissed");
        }
    }

    // The dialog closes whatever `hand_off` returns.
    pub fn confirm<R, F>(&self, hand_off: F) -> Option<R>
    where
        F: FnOnce(PrintJob) -> R,
    {
        let job = {
            let mut active = self.active.borrow_mut();
            let active = active.as_mut().filter(|a| a.state == ModalState::Open)?;
            active.state = ModalState::Printing;
            let session = &active.session;
            PrintJob::new(
                session.barcode.clone(),
                parse_dimension(&session.width),
                parse_dimension(&session.height),
                session.copies,
            )
        };
        info!(
            barcode = %job.barcode,
            width_mm = job.width_mm,
            height_mm = job.height_mm,
            copies = job.copies,
            "print confirmed"
        );
        let handed = hand_off(job);
        self.teardown();
        Some(handed)
    }

    fn teardown(&self) -> bool {
        let Some(active) = self.active.borrow_mut().take() else {
            return false;
        };
        self.doc.remove(&active.overlay);
        true
    }

    fn update_preview(&self) {
        let Some(geometry) = self.preview() else {
            return;
        };
        let active = self.active.borrow();
        let Some(active) = active.as_ref() else {
            return;
        };
        if let Some(boxed) = find_by_id(&active.overlay, contract::MODAL_PREVIEW_BOX_ID) {
            set_attr(&boxed, "style", &preview_style(&geometry));
        }
        if let Some(img) = find_by_id(&active.overlay, contract::MODAL_PREVIEW_IMAGE_ID) {
            set_attr(&img, "src", &self.image_url.for_barcode(&active.session.barcode));
        }
    }
}

fn overlay_html(session: &ModalSession) -> String {
    format!(
        r#"<div id="{modal}" class="bp-modal-overlay"><div class="bp-modal">
<div class="bp-header"><h3>Print Barcode Label</h3><button id="{close}">&times;</button></div>
<div class="bp-body">
<p class="bp-subtitle">Configure label size and copies.</p>
<div class="bp-grid">
<div><label>WIDTH (MM)</label><input type="number" id="{width_id}" value="{width}"></div>
<div><label>HEIGHT (MM)</label><input type="number" id="{height_id}" value="{height}"></div>
</div>
<div class="bp-row"><label>COPIES</label><input type="number" id="{copies_id}" value="{copies}" min="1"></div>
<div class="bp-preview-container"><div id="{preview_box}" class="bp-preview-box"><img id="{preview_img}" alt="Barcode Preview"></div></div>
</div>
<div class="bp-footer"><button id="{cancel}">Cancel</button><button id="{print}" class="bp-btn-primary">{icon} Print</button></div>
</div></div>"#,
        modal = contract::MODAL_ID,
        close = contract::MODAL_CLOSE_ID,
        width_id = contract::MODAL_WIDTH_INPUT_ID,
        height_id = contract::MODAL_HEIGHT_INPUT_ID,
        copies_id = contract::MODAL_COPIES_INPUT_ID,
        preview_box = contract::MODAL_PREVIEW_BOX_ID,
        preview_img = contract::MODAL_PREVIEW_IMAGE_ID,
        cancel = contract::MODAL_CANCEL_ID,
        print = contract::MODAL_PRINT_ID,
        width = escape_text(&session.width),
        height = escape_text(&session.height),
        copies = session.copies,
        icon = PRINT_ICON,
    )
}

fn preview_style(geometry: &PreviewGeometry) -> String {
    format!(
        "width: {}px; height: {}px; padding-left: {}px; padding-right: {}px; box-sizing: border-box;",
        geometry.width_px, geometry.height_px, geometry.padding_px, geometry.padding_px
    )
}

fn parse_preview_style(style: &str) -> Option<PreviewGeometry> {
    let parsed = StyleAttribute::parse(style, ParserOptions::default()).ok()?;
    let mut width = None;
    let mut height = None;
    let mut padding = None;
    let declarations = parsed
        .declarations
        .declarations
        .iter()
        .chain(parsed.declarations.important_declarations.iter());
    for prop in declarations {
        match prop {
            Property::Width(size) => width = size_to_px(size),
            Property::Height(size) => height = size_to_px(size),
            Property::PaddingLeft(value) | Property::PaddingRight(value) => {
                padding = padding.or(length_or_auto_to_px(value));
            }
            _ => {}
        }
    }
    Some(PreviewGeometry {
        width_px: width?,
        height_px: height?,
        padding_px: padding.unwrap_or(0.0),
    })
}

fn size_to_px(size: &Size) -> Option<f64> {
    match size {
        Size::LengthPercentage(LengthPercentage::Dimension(length)) => {
            length.to_px().map(f64::from)
        }
        _ => None,
    }
}

fn length_or_auto_to_px(value: &LengthPercentageOrAuto) -> Option<f64> {
    match value {
        LengthPercentageOrAuto::LengthPercentage(LengthPercentage::Dimension(length)) => {
            length.to_px().map(f64::from)
        }
        _ => None,
    }
}

fn find_by_id(scope: &NodeRef, id: &str) -> Option<NodeRef> {
    scope
        .inclusive_descendants()
        .find(|node| attr(node, "id").as_deref() == Some(id))
}

fn set_input_value(overlay: &NodeRef, id: &str, value: &str) {
    if let Some(input) = find_by_id(overlay, id) {
        set_attr(&input, "value", value);
    }
}

// Dimensions are taken as typed; text that is not a number counts as 0.
fn parse_dimension(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn preview_dimension(raw: &str, default: f64) -> f64 {
    let value = parse_dimension(raw);
    if value == 0.0 { default } else { value }
}

// Truncated toward zero, floored at 1 and capped at `max`.
fn parse_copies(raw: &str, max: u32) -> u32 {
    let value = raw.trim().parse::<f64>().unwrap_or(f64::NAN);
    if !value.is_finite() || value < 1.0 {
        return 1;
    }
    let max = max.max(1);
    let requested = value.trunc();
    if requested > f64::from(max) {
        warn!(raw, max, "copy count capped");
        return max;
    }
    requested as u32
}

fn format_number(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modal() -> (HostDocument, PrintModal) {
        let doc = HostDocument::parse("<html><body><div id=\"app\"></div></body></html>");
        let modal = PrintModal::new(doc.clone(), BarcodeImageUrl::default(), PrintConfig::default());
        (doc, modal)
    }

    fn overlays(doc: &HostDocument) -> usize {
        doc.root()
            .select("#barcode-printer-modal")
            .map(|s| s.count())
            .unwrap_or(0)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn opens_with_defaults() {
        let (doc, modal) = modal();
        modal.open("013618331275");
        assert!(modal.is_open());
        assert_eq!(overlays(&doc), 1);
        let session = modal.session().expect("session");
        assert_eq!(session.width, "30");
        assert_eq!(session.height, "20");
        assert_eq!(session.copies, 1);
        let width = doc.get_element_by_id("bp-width").expect("width input");
        assert_eq!(attr(&width, "value").as_deref(), Some("30"));
        assert!(
            modal
                .preview_image_src()
                .expect("src")
                .contains("text=013618331275")
        );
    }

    #[test]
    fn height_edit_updates_preview() {
        let (_doc, modal) = modal();
        modal.open("1");
        modal.set_height("25");
        let preview = modal.preview().expect("preview");
        assert!(approx(preview.height_px, 94.5), "{preview:?}");
        assert!(approx(preview.width_px, 113.4), "{preview:?}");
        assert!(approx(preview.padding_px, 7.56), "{preview:?}");

        let rendered = modal.rendered_preview().expect("rendered");
        assert!(approx(rendered.height_px, 94.5), "{rendered:?}");
        assert!(approx(rendered.width_px, 113.4), "{rendered:?}");
        assert!(approx(rendered.padding_px, 7.56), "{rendered:?}");
    }

    #[test]
    fn zero_or_garbage_dimensions_preview_at_default() {
        let (_doc, modal) = modal();
        modal.open("1");
        modal.set_width("0");
        modal.set_height("abc");
        let preview = modal.preview().expect("preview");
        assert!(approx(preview.width_px, 30.0 * 3.78));
        assert!(approx(preview.height_px, 20.0 * 3.78));
    }

    #[test]
    fn copies_clamp_on_every_edit() {
        let (doc, modal) = modal();
        modal.open("1");
        for (raw, expected) in [("0", 1), ("-3", 1), ("2.9", 2), ("", 1), ("5", 5)] {
            modal.set_copies(raw);
            assert_eq!(modal.session().expect("session").copies, expected, "{raw}");
        }
        let copies = doc.get_element_by_id("bp-copies").expect("copies input");
        assert_eq!(attr(&copies, "value").as_deref(), Some("5"));
    }

    #[test]
    fn huge_copy_counts_are_capped() {
        let (doc, modal) = modal();
        modal.open("1");
        for raw in ["1e10", "100000", "101"] {
            modal.set_copies(raw);
            assert_eq!(modal.session().expect("session").copies, 100, "{raw}");
        }
        let copies = doc.get_element_by_id("bp-copies").expect("copies input");
        assert_eq!(attr(&copies, "value").as_deref(), Some("100"));
        let job = modal.confirm(|job| job).expect("job");
        assert_eq!(job.copies, 100);
    }

    #[test]
    fn confirm_captures_values_as_entered_and_closes() {
        let (doc, modal) = modal();
        modal.open("013618331275");
        modal.set_width("-5");
        modal.set_height("25");
        modal.set_copies("3");
        let seen_state = RefCell::new(None);
        let job = modal
            .confirm(|job| {
                *seen_state.borrow_mut() = Some(modal.state());
                job
            })
            .expect("job");
        assert_eq!(job, PrintJob::new("013618331275", -5.0, 25.0, 3));
        assert_eq!(*seen_state.borrow(), Some(ModalState::Printing));
        assert_eq!(modal.state(), ModalState::Closed);
        assert_eq!(overlays(&doc), 0);
        assert!(modal.confirm(|job| job).is_none());
    }

    #[test]
    fn unparsable_dimension_prints_as_zero() {
        let (_doc, modal) = modal();
        modal.open("1");
        modal.set_width("");
        let job = modal.confirm(|job| job).expect("job");
        assert_eq!(job.width_mm, 0.0);
        assert_eq!(job.height_mm, 20.0);
    }

    #[test]
    fn reopening_replaces_the_session() {
        let (doc, modal) = modal();
        modal.open("111");
        modal.set_width("50");
        modal.open("222");
        assert_eq!(overlays(&doc), 1);
        let session = modal.session().expect("session");
        assert_eq!(session.barcode, "222");
        assert_eq!(session.width, "30");
    }

    #[test]
    fn stray_overlay_is_removed_on_open() {
        let (doc, modal) = modal();
        let body = doc.body();
        let stray = parse_element("<div id=\"barcode-printer-modal\"></div>").expect("stray");
        doc.append_child(&body, stray);
        modal.open("1");
        assert_eq!(overlays(&doc), 1);
    }

    #[test]
    fn cancel_closes_and_edits_are_ignored_afterwards() {
        let (doc, modal) = modal();
        modal.open("1");
        modal.cancel();
        assert_eq!(modal.state(), ModalState::Closed);
        assert_eq!(overlays(&doc), 0);
        modal.set_width("99");
        assert!(modal.session().is_none());
        assert!(modal.preview().is_none());
    }

    #[test]
    fn field_ids_map_to_edits() {
        assert_eq!(ModalField::from_id("bp-width"), Some(ModalField::Width));
        assert_eq!(ModalField::from_id("bp-copies"), Some(ModalField::Copies));
        assert_eq!(ModalField::from_id("bp-print"), None);
    }
}
