use std::rc::Rc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::detect::FieldDetector;
use crate::dom::{HostDocument, MutationRecord};
use crate::inject::ButtonInjector;

pub struct ObservationLoop {
    doc: HostDocument,
    detector: FieldDetector,
    injector: ButtonInjector,
}

impl ObservationLoop {
    pub fn new(doc: HostDocument, detector: FieldDetector, injector: ButtonInjector) -> Self {
        Self {
            doc,
            detector,
            injector,
        }
    }

    pub fn pass(&self) -> usize {
        let scan = self.detector.scan(self.doc.root());
        let strategy = scan.strategy();
        let mut injected = 0;
        for handle in scan {
            let allow_generate = self.injector.allows_generate(&handle);
            if self.injector.inject(&handle, allow_generate) {
                injected += 1;
            }
        }
        if injected > 0 {
            debug!(injected, ?strategy, "injection pass");
        }
        injected
    }

    pub fn spawn(self: Rc<Self>, mut notifications: UnboundedReceiver<MutationRecord>) -> JoinHandle<()> {
        tokio::task::spawn_local(async move {
            while let Some(record) = notifications.recv().await {
                trace!(sequence = record.sequence, "host mutation");
                self.pass();
            }
            debug!("observation loop finished");
        })
    }
}
