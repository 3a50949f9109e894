use url::form_urlencoded;

use crate::config::ImageServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeImageUrl {
    config: ImageServiceConfig,
}

impl BarcodeImageUrl {
    pub fn new(config: ImageServiceConfig) -> Self {
        Self { config }
    }

    // `{base}?bcid=..&text=..&scale=..&height=..&includetext&paddingwidth=0&paddingheight=0`
    pub fn for_barcode(&self, barcode: &str) -> String {
        let text = if self.config.encode_text {
            form_urlencoded::byte_serialize(barcode.as_bytes()).collect::<String>()
        } else {
            barcode.to_string()
        };
        format!(
            "{base}?bcid={bcid}&text={text}&scale={scale}&height={height}&includetext&paddingwidth=0&paddingheight=0",
            base = self.config.base_url,
            bcid = self.config.symbology,
            scale = self.config.scale,
            height = self.config.bar_height,
        )
    }
}

impl Default for BarcodeImageUrl {
    fn default() -> Self {
        Self::new(ImageServiceConfig::default())
    }
}
