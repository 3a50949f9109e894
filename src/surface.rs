use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tracing::warn;

use crate::error::SurfaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLoad {
    Loaded,
    Errored,
}

pub enum SurfaceImage {
    // Already decoded (or already failed) when enumerated.
    Complete,
    // Resolves on the image's load or error event.
    Pending(LocalBoxFuture<'static, ImageLoad>),
}

impl SurfaceImage {
    pub fn pending<F>(settle: F) -> Self
    where
        F: std::future::Future<Output = ImageLoad> + 'static,
    {
        SurfaceImage::Pending(Box::pin(settle))
    }
}

impl std::fmt::Debug for SurfaceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceImage::Complete => write!(f, "SurfaceImage::Complete"),
            SurfaceImage::Pending(_) => write!(f, "SurfaceImage::Pending"),
        }
    }
}

pub trait PrintSurface {
    fn write(&self, html: &str);

    // End of document writing; resources start loading.
    fn close(&self);

    fn focus(&self);

    fn images(&self) -> Result<Vec<SurfaceImage>, SurfaceError>;

    fn print(&self) -> Result<(), SurfaceError>;
}

pub trait SurfaceOpener {
    // None when popups are blocked.
    fn open(&self, width: u32, height: u32) -> Option<Rc<dyn PrintSurface>>;
}

pub trait Notifier {
    fn alert(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        warn!(message, "user alert");
    }
}
