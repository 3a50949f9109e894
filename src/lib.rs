mod config;
mod detect;
mod dom;
mod error;
mod image_url;
mod inject;
pub mod logging;
mod modal;
mod observe;
mod print;
mod sequence;
mod surface;

use std::cell::RefCell;
use std::rc::Rc;

use barcode_overlay_contract as contract;
use kuchiki::NodeRef;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use config::{
    ImageServiceConfig, InjectConfig, OverlayConfig, PrintConfig, PrintTiming, SequenceConfig,
};
pub use detect::{DetectionStrategy, FieldDetector, FieldHandle, FieldScan, field_value};
pub use dom::{
    HostDocument, HostEvent, HostEventKind, HostEventListener, MutationRecord, parse_element,
    parse_fragment,
};
pub use error::{ConfigError, OverlayError, StoreError, SurfaceError};
pub use image_url::BarcodeImageUrl;
pub use inject::{ButtonInjector, ControlAction, control_action, control_field};
pub use modal::{ModalField, ModalSession, ModalState, PreviewGeometry, PrintModal};
pub use observe::ObservationLoop;
pub use print::{
    POPUP_BLOCKED_MESSAGE, PrintDocument, PrintDocumentGenerator, PrintJob, PrintOutcome,
    run_print_trigger,
};
pub use sequence::{
    JsonFileSequenceStore, MemorySequenceStore, SequenceGenerator, SequenceStore,
    next_in_sequence,
};
pub use surface::{ImageLoad, LogNotifier, Notifier, PrintSurface, SurfaceImage, SurfaceOpener};

#[derive(Debug)]
pub enum ClickOutcome {
    ModalOpened { barcode: String },
    Generated(String),
    ModalClosed,
    PrintStarted(JoinHandle<PrintOutcome>),
    Ignored,
}

// Must be driven from within a tokio LocalSet.
pub struct BarcodeOverlay {
    doc: HostDocument,
    config: OverlayConfig,
    observation: Rc<ObservationLoop>,
    generator: SequenceGenerator,
    modal: PrintModal,
    printer: PrintDocumentGenerator,
    observer_task: RefCell<Option<JoinHandle<()>>>,
}

pub struct BarcodeOverlayBuilder {
    doc: HostDocument,
    config: OverlayConfig,
    store: Option<Rc<dyn SequenceStore>>,
    opener: Option<Rc<dyn SurfaceOpener>>,
    notifier: Option<Rc<dyn Notifier>>,
}

impl BarcodeOverlayBuilder {
    pub fn new(doc: HostDocument) -> Self {
        Self {
            doc,
            config: OverlayConfig::default(),
            store: None,
            opener: None,
            notifier: None,
        }
    }

    pub fn config(mut self, config: OverlayConfig) -> Self {
        self.config = config;
        self
    }

    // Defaults to an in-memory store, which forgets the sequence on drop.
    pub fn store(mut self, store: Rc<dyn SequenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn surface_opener(mut self, opener: Rc<dyn SurfaceOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn notifier(mut self, notifier: Rc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<BarcodeOverlay, OverlayError> {
        self.config.validate()?;
        let opener = self.opener.ok_or_else(|| {
            OverlayError::InvalidConfiguration("a surface opener is required".to_string())
        })?;
        let store = self
            .store
            .unwrap_or_else(|| Rc::new(MemorySequenceStore::new()));
        let notifier = self.notifier.unwrap_or_else(|| Rc::new(LogNotifier));
        let image_url = BarcodeImageUrl::new(self.config.image_service.clone());

        let injector = ButtonInjector::new(self.doc.clone(), self.config.inject.clone());
        let observation = Rc::new(ObservationLoop::new(
            self.doc.clone(),
            FieldDetector::new(),
            injector,
        ));
        let generator =
            SequenceGenerator::new(store, self.config.sequence.clone(), self.doc.clone());
        let modal = PrintModal::new(
            self.doc.clone(),
            image_url.clone(),
            self.config.print.clone(),
        );
        let printer =
            PrintDocumentGenerator::new(opener, notifier, image_url, self.config.print.clone());

        Ok(BarcodeOverlay {
            doc: self.doc,
            config: self.config,
            observation,
            generator,
            modal,
            printer,
            observer_task: RefCell::new(None),
        })
    }
}

impl BarcodeOverlay {
    pub fn builder(doc: HostDocument) -> BarcodeOverlayBuilder {
        BarcodeOverlayBuilder::new(doc)
    }

    pub fn doc(&self) -> &HostDocument {
        &self.doc
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn modal(&self) -> &PrintModal {
        &self.modal
    }

    pub fn generator(&self) -> &SequenceGenerator {
        &self.generator
    }

    pub fn printer(&self) -> &PrintDocumentGenerator {
        &self.printer
    }

    pub fn start(&self) -> Result<usize, OverlayError> {
        let mut task = self.observer_task.borrow_mut();
        if task.is_some() {
            return Err(OverlayError::AlreadyStarted);
        }
        let injected = self.observation.pass();
        *task = Some(self.observation.clone().spawn(self.doc.observe()));
        let contract = contract::metadata();
        info!(
            contract = contract.contract_id,
            version = contract.contract_version,
            fingerprint = %contract.contract_fingerprint_sha256,
            injected,
            "barcode overlay started"
        );
        Ok(injected)
    }

    pub fn is_started(&self) -> bool {
        self.observer_task.borrow().is_some()
    }

    pub fn stop(&self) {
        if let Some(task) = self.observer_task.borrow_mut().take() {
            task.abort();
            debug!("barcode overlay stopped");
        }
    }

    pub async fn click(&self, target: &NodeRef) -> Result<ClickOutcome, OverlayError> {
        self.doc.dispatch(target, HostEventKind::Click);

        if let Some((action, control)) = control_action(target) {
            let Some(field) = control_field(&control) else {
                return Ok(ClickOutcome::Ignored);
            };
            return match action {
                ControlAction::Print => {
                    let barcode = field_value(&field).trim().to_string();
                    if barcode.is_empty() {
                        debug!("print requested for an empty field");
                        return Ok(ClickOutcome::Ignored);
                    }
                    self.modal.open(&barcode);
                    Ok(ClickOutcome::ModalOpened { barcode })
                }
                ControlAction::Generate => {
                    let value = self.generator.generate_next().await?;
                    Ok(ClickOutcome::Generated(value))
                }
            };
        }

        let Some(id) = target
            .inclusive_ancestors()
            .find_map(|node| dom::attr(&node, "id").filter(|id| contract::is_modal_control_id(id)))
        else {
            return Ok(ClickOutcome::Ignored);
        };
        match id.as_str() {
            contract::MODAL_PRINT_ID => {
                match self.modal.confirm(|job| self.printer.render(job)) {
                    Some(Ok(handle)) => Ok(ClickOutcome::PrintStarted(handle)),
                    Some(Err(err)) => Err(err),
                    None => Ok(ClickOutcome::Ignored),
                }
            }
            _ => {
                if !self.modal.is_open() {
                    return Ok(ClickOutcome::Ignored);
                }
                self.modal.cancel();
                Ok(ClickOutcome::ModalClosed)
            }
        }
    }

    pub fn input(&self, target: &NodeRef, value: &str) {
        dom::set_attr(target, "value", value);
        if let Some(field) = dom::attr(target, "id").and_then(|id| ModalField::from_id(&id)) {
            self.modal.edit(field, value);
        }
        self.doc.dispatch(target, HostEventKind::Input);
    }
}

impl Drop for BarcodeOverlay {
    fn drop(&mut self) {
        self.stop();
    }
}
