use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "barcode_overlay.host_contract";
pub const CONTRACT_VERSION: &str = "1";

// Host page: primary detection.
pub const FIELD_ATTRIBUTE: &str = "name";
pub const FIELD_ATTRIBUTE_VALUE: &str = "barcode";
pub const FIELD_SELECTOR: &str = "[name=\"barcode\"]";

// Host page: fallback detection.
pub const LABEL_TEXT: &str = "Barcode";
pub const ROW_CONTAINER_CLASS: &str = "grid";
pub const VALUE_HINT_CLASS: &str = "odoo-value";
pub const PLACEHOLDER_TEXT: &str = "-";

// Injected markers.
pub const WRAPPER_CLASS: &str = "barcode-printer-container";
pub const PRINT_BUTTON_CLASS: &str = "barcode-print-btn";
pub const GENERATE_BUTTON_CLASS: &str = "barcode-generate-btn";
pub const ACTION_ATTRIBUTE: &str = "data-barcode-action";
pub const ACTION_PRINT: &str = "print";
pub const ACTION_GENERATE: &str = "generate";

// Print modal element ids.
pub const MODAL_ID: &str = "barcode-printer-modal";
pub const MODAL_WIDTH_INPUT_ID: &str = "bp-width";
pub const MODAL_HEIGHT_INPUT_ID: &str = "bp-height";
pub const MODAL_COPIES_INPUT_ID: &str = "bp-copies";
pub const MODAL_PREVIEW_BOX_ID: &str = "bp-preview-box";
pub const MODAL_PREVIEW_IMAGE_ID: &str = "bp-preview-img";
pub const MODAL_CLOSE_ID: &str = "bp-close";
pub const MODAL_CANCEL_ID: &str = "bp-cancel";
pub const MODAL_PRINT_ID: &str = "bp-print";

// Persistent sequence.
pub const SEQUENCE_STORAGE_KEY: &str = "lastGeneratedBarcode";
pub const SEQUENCE_DEFAULT_VALUE: &str = "123456789012";

pub const BARCODE_SERVICE_BASE: &str = "https://bwipjs-api.metafloor.com/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
}

static CONTRACT_JSON: OnceLock<Value> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

// Canonical rendering of every selector and marker the overlay depends on. Any change
// here changes the fingerprint, which is how a deployed build is matched to a host
// version in logs.
pub fn contract_json() -> &'static Value {
    CONTRACT_JSON.get_or_init(|| {
        json!({
            "id": CONTRACT_ID,
            "version": CONTRACT_VERSION,
            "detect": {
                "primary": FIELD_SELECTOR,
                "label": LABEL_TEXT,
                "row": ROW_CONTAINER_CLASS,
                "value_hint": VALUE_HINT_CLASS,
                "placeholder": PLACEHOLDER_TEXT,
            },
            "markers": {
                "wrapper": WRAPPER_CLASS,
                "print": PRINT_BUTTON_CLASS,
                "generate": GENERATE_BUTTON_CLASS,
                "action_attribute": ACTION_ATTRIBUTE,
            },
            "modal": {
                "root": MODAL_ID,
                "width": MODAL_WIDTH_INPUT_ID,
                "height": MODAL_HEIGHT_INPUT_ID,
                "copies": MODAL_COPIES_INPUT_ID,
                "preview_box": MODAL_PREVIEW_BOX_ID,
                "preview_image": MODAL_PREVIEW_IMAGE_ID,
                "close": MODAL_CLOSE_ID,
                "cancel": MODAL_CANCEL_ID,
                "print": MODAL_PRINT_ID,
            },
            "storage": {
                "key": SEQUENCE_STORAGE_KEY,
            },
        })
    })
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| hex_sha256(contract_json().to_string().as_bytes()))
        .clone()
}

pub fn metadata() -> HostContractMetadata {
    HostContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
    }
}

pub fn is_modal_control_id(id: &str) -> bool {
    matches!(id, MODAL_CLOSE_ID | MODAL_CANCEL_ID | MODAL_PRINT_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn contract_json_lists_primary_selector_and_markers() {
        let value = contract_json();
        assert_eq!(value["detect"]["primary"], FIELD_SELECTOR);
        assert_eq!(value["markers"]["wrapper"], WRAPPER_CLASS);
        assert_eq!(value["storage"]["key"], "lastGeneratedBarcode");
    }

    #[test]
    fn primary_selector_matches_attribute_parts() {
        assert_eq!(
            FIELD_SELECTOR,
            format!("[{}=\"{}\"]", FIELD_ATTRIBUTE, FIELD_ATTRIBUTE_VALUE)
        );
    }

    #[test]
    fn modal_id_classification() {
        assert!(is_modal_control_id("bp-print"));
        assert!(!is_modal_control_id("bp-width"));
    }
}
