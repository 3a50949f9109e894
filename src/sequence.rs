use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SequenceConfig;
use crate::detect::FieldDetector;
use crate::dom::{HostDocument, HostEventKind, set_attr};
use crate::error::{OverlayError, StoreError};

#[async_trait(?Send)]
pub trait SequenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemorySequenceStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl SequenceStore for MemorySequenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// Rewritten atomically on every `set`.
#[derive(Debug)]
pub struct JsonFileSequenceStore {
    path: PathBuf,
}

impl JsonFileSequenceStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait(?Send)]
impl SequenceStore for JsonFileSequenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        let payload = serde_json::to_vec_pretty(&values)?;
        write_atomic(&self.path, &payload)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

// Digit-by-digit, so any length is exact. "999" -> "1000".
pub fn next_in_sequence(last: &str) -> Result<String, OverlayError> {
    if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OverlayError::InvalidSequence(last.to_string()));
    }
    let mut digits: Vec<u8> = last.bytes().map(|b| b - b'0').collect();
    let mut carry = true;
    for digit in digits.iter_mut().rev() {
        if !carry {
            break;
        }
        if *digit == 9 {
            *digit = 0;
        } else {
            *digit += 1;
            carry = false;
        }
    }
    if carry {
        digits.insert(0, 1);
    }
    Ok(digits.into_iter().map(|d| char::from(b'0' + d)).collect())
}

// Store write happens before any field is touched.
pub struct SequenceGenerator {
    store: Rc<dyn SequenceStore>,
    config: SequenceConfig,
    doc: HostDocument,
    detector: FieldDetector,
    gate: Mutex<()>,
}

impl SequenceGenerator {
    pub fn new(
        store: Rc<dyn SequenceStore>,
        config: SequenceConfig,
        doc: HostDocument,
    ) -> Self {
        Self {
            store,
            config,
            doc,
            detector: FieldDetector::new(),
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    pub async fn generate_next(&self) -> Result<String, OverlayError> {
        let _guard = self.gate.lock().await;
        let key = self.config.storage_key.as_str();
        let last = match self.store.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(default = %self.config.default_barcode, "no stored sequence; using default");
                self.config.default_barcode.clone()
            }
            Err(err) => {
                warn!(error = %err, "sequence read failed");
                return Err(err.into());
            }
        };
        let next = next_in_sequence(&last)?;
        if let Err(err) = self.store.set(key, &next).await {
            warn!(error = %err, "sequence write failed; fields left unchanged");
            return Err(err.into());
        }
        let updated = self.reflect(&next);
        info!(value = %next, fields = updated, "generated barcode");
        Ok(next)
    }

    fn reflect(&self, value: &str) -> usize {
        let fields = self.detector.editable_fields(self.doc.root());
        for field in &fields {
            let Some(input) = field.input() else {
                continue;
            };
            set_attr(&input, "value", value);
            self.doc.dispatch(&input, HostEventKind::Input);
            self.doc.dispatch(&input, HostEventKind::Change);
        }
        fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::attr;

    struct FailingStore {
        fail_get: bool,
    }

    #[async_trait(?Send)]
    impl SequenceStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_get {
                Err(StoreError::Unavailable("read".to_string()))
            } else {
                Ok(Some("0041".to_string()))
            }
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("write".to_string()))
        }
    }

    fn editable_page() -> HostDocument {
        HostDocument::parse(
            r#"<html><body>
                <div name="barcode"><input id="a" value="old"></div>
                <div name="barcode"><input id="b" value=""></div>
                <span name="barcode" id="ro">readonly</span>
            </body></html>"#,
        )
    }

    fn input_value(doc: &HostDocument, id: &str) -> String {
        attr(&doc.get_element_by_id(id).expect("input"), "value").unwrap_or_default()
    }

    #[test]
    fn padding_law() {
        assert_eq!(next_in_sequence("00042").expect("next"), "00043");
        assert_eq!(next_in_sequence("099").expect("next"), "100");
        assert_eq!(next_in_sequence("999").expect("next"), "1000");
        assert_eq!(next_in_sequence("0").expect("next"), "1");
        assert_eq!(next_in_sequence("0009").expect("next"), "0010");
    }

    #[test]
    fn long_values_keep_precision() {
        let last = "123456789012345678901234567890999";
        assert_eq!(
            next_in_sequence(last).expect("next"),
            "123456789012345678901234567891000"
        );
        let wide = "9".repeat(40);
        let next = next_in_sequence(&wide).expect("next");
        assert_eq!(next.len(), 41);
        assert!(next.starts_with('1'));
        assert!(next[1..].bytes().all(|b| b == b'0'));
    }

    #[test]
    fn non_digit_values_are_rejected() {
        for bad in ["", "12a", "-1", " 12", "1.5"] {
            assert!(matches!(
                next_in_sequence(bad),
                Err(OverlayError::InvalidSequence(_))
            ));
        }
    }

    #[tokio::test]
    async fn missing_record_starts_from_default() {
        let doc = editable_page();
        let store = Rc::new(MemorySequenceStore::new());
        let generator = SequenceGenerator::new(store.clone(), SequenceConfig::default(), doc.clone());

        let value = generator.generate_next().await.expect("generate");
        assert_eq!(value, "123456789013");
        assert_eq!(
            store.value("lastGeneratedBarcode").as_deref(),
            Some("123456789013")
        );
        assert_eq!(input_value(&doc, "a"), "123456789013");
        assert_eq!(input_value(&doc, "b"), "123456789013");
        let readonly = doc.get_element_by_id("ro").expect("ro");
        assert_eq!(readonly.text_contents(), "readonly");
    }

    #[tokio::test]
    async fn reflection_emits_input_then_change() {
        let doc = editable_page();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        doc.add_event_listener(move |event| {
            let id = attr(&event.target, "id").unwrap_or_default();
            sink.borrow_mut().push(format!("{}:{}", id, event.kind.as_str()));
        });
        let store = Rc::new(MemorySequenceStore::with_value("lastGeneratedBarcode", "00042"));
        let generator = SequenceGenerator::new(store, SequenceConfig::default(), doc.clone());
        assert_eq!(generator.generate_next().await.expect("generate"), "00043");
        assert_eq!(
            *events.borrow(),
            vec!["a:input", "a:change", "b:input", "b:change"]
        );
    }

    #[tokio::test]
    async fn write_failure_leaves_fields_untouched() {
        let doc = editable_page();
        let generator = SequenceGenerator::new(
            Rc::new(FailingStore { fail_get: false }),
            SequenceConfig::default(),
            doc.clone(),
        );
        let err = generator.generate_next().await.expect_err("write fails");
        assert!(matches!(err, OverlayError::Store(_)));
        assert_eq!(input_value(&doc, "a"), "old");
        assert_eq!(input_value(&doc, "b"), "");
    }

    #[tokio::test]
    async fn read_failure_fails_generation() {
        let doc = editable_page();
        let generator = SequenceGenerator::new(
            Rc::new(FailingStore { fail_get: true }),
            SequenceConfig::default(),
            doc.clone(),
        );
        assert!(matches!(
            generator.generate_next().await,
            Err(OverlayError::Store(_))
        ));
        assert_eq!(input_value(&doc, "a"), "old");
    }

    #[tokio::test]
    async fn corrupt_record_is_rejected_without_writing() {
        let doc = editable_page();
        let store = Rc::new(MemorySequenceStore::with_value("lastGeneratedBarcode", "abc"));
        let generator = SequenceGenerator::new(store.clone(), SequenceConfig::default(), doc.clone());
        assert!(matches!(
            generator.generate_next().await,
            Err(OverlayError::InvalidSequence(_))
        ));
        assert_eq!(store.value("lastGeneratedBarcode").as_deref(), Some("abc"));
        assert_eq!(input_value(&doc, "a"), "old");
    }

    // Suspends before every call so interleaved requests actually overlap.
    struct YieldingStore {
        inner: MemorySequenceStore,
    }

    #[async_trait(?Send)]
    impl SequenceStore for YieldingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            tokio::task::yield_now().await;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.inner.set(key, value).await
        }
    }

    #[tokio::test]
    async fn concurrent_requests_are_serialized() {
        let doc = editable_page();
        let store = Rc::new(YieldingStore {
            inner: MemorySequenceStore::with_value("lastGeneratedBarcode", "0998"),
        });
        let generator = SequenceGenerator::new(store.clone(), SequenceConfig::default(), doc.clone());
        let (a, b, c) = tokio::join!(
            generator.generate_next(),
            generator.generate_next(),
            generator.generate_next()
        );
        let mut values = vec![a.expect("a"), b.expect("b"), c.expect("c")];
        values.sort();
        assert_eq!(values, vec!["0999", "1000", "1001"]);
        assert_eq!(
            store.inner.value("lastGeneratedBarcode").as_deref(),
            Some("1001")
        );
        assert_eq!(input_value(&doc, "a"), "1001");
    }

    #[tokio::test]
    async fn custom_key_and_default_are_honoured() {
        let doc = editable_page();
        let store = Rc::new(MemorySequenceStore::new());
        let config = SequenceConfig {
            default_barcode: "0100".to_string(),
            storage_key: "labels.last".to_string(),
        };
        let generator = SequenceGenerator::new(store.clone(), config, doc);
        assert_eq!(generator.generate_next().await.expect("generate"), "0101");
        assert_eq!(store.value("labels.last").as_deref(), Some("0101"));
        assert!(store.value("lastGeneratedBarcode").is_none());
    }

    #[tokio::test]
    async fn json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("sequence.json");
        let first = JsonFileSequenceStore::new(&path);
        assert!(first.get("lastGeneratedBarcode").await.expect("get").is_none());
        first
            .set("lastGeneratedBarcode", "000123")
            .await
            .expect("set");
        first.set("other", "x").await.expect("set other");

        let second = JsonFileSequenceStore::new(&path);
        assert_eq!(
            second
                .get("lastGeneratedBarcode")
                .await
                .expect("get")
                .as_deref(),
            Some("000123")
        );
        assert_eq!(second.get("other").await.expect("get").as_deref(), Some("x"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn json_file_store_reports_corrupt_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sequence.json");
        fs::write(&path, "not json").expect("write");
        let store = JsonFileSequenceStore::new(&path);
        assert!(matches!(
            store.get("lastGeneratedBarcode").await,
            Err(StoreError::Json(_))
        ));
    }
}
