use std::fs;
use std::path::Path;
use std::time::Duration;

use barcode_overlay_contract as contract;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OverlayConfig {
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub image_service: ImageServiceConfig,
    #[serde(default)]
    pub print: PrintConfig,
    #[serde(default)]
    pub inject: InjectConfig,
}

impl OverlayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: OverlayConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let default = &self.sequence.default_barcode;
        if default.is_empty() || !default.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!(
                "sequence.default_barcode must be a digit string, got {default:?}"
            )));
        }
        if self.sequence.storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sequence.storage_key must not be empty".to_string(),
            ));
        }
        url::Url::parse(&self.image_service.base_url).map_err(|err| {
            ConfigError::Invalid(format!(
                "image_service.base_url {:?}: {err}",
                self.image_service.base_url
            ))
        })?;
        if !(self.print.px_per_mm.is_finite() && self.print.px_per_mm > 0.0) {
            return Err(ConfigError::Invalid(
                "print.px_per_mm must be a positive number".to_string(),
            ));
        }
        if self.print.default_copies == 0 {
            return Err(ConfigError::Invalid(
                "print.default_copies must be at least 1".to_string(),
            ));
        }
        if self.print.max_copies < self.print.default_copies {
            return Err(ConfigError::Invalid(format!(
                "print.max_copies ({}) must be at least print.default_copies ({})",
                self.print.max_copies, self.print.default_copies
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "SequenceConfig::default_barcode")]
    pub default_barcode: String,
    #[serde(default = "SequenceConfig::default_storage_key")]
    pub storage_key: String,
}

impl SequenceConfig {
    fn default_barcode() -> String {
        contract::SEQUENCE_DEFAULT_VALUE.to_string()
    }

    fn default_storage_key() -> String {
        contract::SEQUENCE_STORAGE_KEY.to_string()
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            default_barcode: Self::default_barcode(),
            storage_key: Self::default_storage_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageServiceConfig {
    #[serde(default = "ImageServiceConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ImageServiceConfig::default_symbology")]
    pub symbology: String,
    #[serde(default = "ImageServiceConfig::default_scale")]
    pub scale: u32,
    #[serde(default = "ImageServiceConfig::default_bar_height")]
    pub bar_height: u32,
    // false reproduces the historical raw insertion of the barcode text.
    #[serde(default = "ImageServiceConfig::default_encode_text")]
    pub encode_text: bool,
}

impl ImageServiceConfig {
    fn default_base_url() -> String {
        contract::BARCODE_SERVICE_BASE.to_string()
    }

    fn default_symbology() -> String {
        "code128".into()
    }

    fn default_scale() -> u32 {
        3
    }

    fn default_bar_height() -> u32 {
        12
    }

    fn default_encode_text() -> bool {
        true
    }
}

impl Default for ImageServiceConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            symbology: Self::default_symbology(),
            scale: Self::default_scale(),
            bar_height: Self::default_bar_height(),
            encode_text: Self::default_encode_text(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintConfig {
    #[serde(default = "PrintConfig::default_width_mm")]
    pub default_width_mm: f64,
    #[serde(default = "PrintConfig::default_height_mm")]
    pub default_height_mm: f64,
    #[serde(default = "PrintConfig::default_copies")]
    pub default_copies: u32,
    // Upper bound on pages per job; larger requests are capped.
    #[serde(default = "PrintConfig::default_max_copies")]
    pub max_copies: u32,
    #[serde(default = "PrintConfig::default_px_per_mm")]
    pub px_per_mm: f64,
    #[serde(default = "PrintConfig::default_inset_mm")]
    pub inset_mm: f64,
    #[serde(default = "PrintConfig::default_surface_size")]
    pub surface_width: u32,
    #[serde(default = "PrintConfig::default_surface_size")]
    pub surface_height: u32,
    #[serde(default)]
    pub timing: PrintTiming,
}

impl PrintConfig {
    fn default_width_mm() -> f64 {
        30.0
    }

    fn default_height_mm() -> f64 {
        20.0
    }

    fn default_copies() -> u32 {
        1
    }

    fn default_max_copies() -> u32 {
        100
    }

    fn default_px_per_mm() -> f64 {
        3.78
    }

    fn default_inset_mm() -> f64 {
        2.0
    }

    fn default_surface_size() -> u32 {
        500
    }
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            default_width_mm: Self::default_width_mm(),
            default_height_mm: Self::default_height_mm(),
            default_copies: Self::default_copies(),
            max_copies: Self::default_max_copies(),
            px_per_mm: Self::default_px_per_mm(),
            inset_mm: Self::default_inset_mm(),
            surface_width: Self::default_surface_size(),
            surface_height: Self::default_surface_size(),
            timing: PrintTiming::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintTiming {
    #[serde(default = "PrintTiming::default_start_ms")]
    pub start_ms: u64,
    #[serde(default = "PrintTiming::default_no_images_ms")]
    pub no_images_ms: u64,
    #[serde(default = "PrintTiming::default_settled_ms")]
    pub settled_ms: u64,
    #[serde(default = "PrintTiming::default_fallback_ms")]
    pub fallback_ms: u64,
}

impl PrintTiming {
    fn default_start_ms() -> u64 {
        50
    }

    fn default_no_images_ms() -> u64 {
        50
    }

    fn default_settled_ms() -> u64 {
        100
    }

    fn default_fallback_ms() -> u64 {
        300
    }

    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn no_images(&self) -> Duration {
        Duration::from_millis(self.no_images_ms)
    }

    pub fn settled(&self) -> Duration {
        Duration::from_millis(self.settled_ms)
    }

    pub fn fallback(&self) -> Duration {
        Duration::from_millis(self.fallback_ms)
    }
}

impl Default for PrintTiming {
    fn default() -> Self {
        Self {
            start_ms: Self::default_start_ms(),
            no_images_ms: Self::default_no_images_ms(),
            settled_ms: Self::default_settled_ms(),
            fallback_ms: Self::default_fallback_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectConfig {
    // Offer the Generate control on block-level editable fields.
    #[serde(default = "InjectConfig::default_generate_enabled")]
    pub generate_enabled: bool,
    #[serde(default = "InjectConfig::default_print_label")]
    pub print_label: String,
    #[serde(default = "InjectConfig::default_generate_label")]
    pub generate_label: String,
}

impl InjectConfig {
    fn default_generate_enabled() -> bool {
        true
    }

    fn default_print_label() -> String {
        "Print Barcode".into()
    }

    fn default_generate_label() -> String {
        "Generate".into()
    }
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            generate_enabled: Self::default_generate_enabled(),
            print_label: Self::default_print_label(),
            generate_label: Self::default_generate_label(),
        }
    }
}
