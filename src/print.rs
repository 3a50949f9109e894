use std::rc::Rc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{PrintConfig, PrintTiming};
use crate::error::OverlayError;
use crate::image_url::BarcodeImageUrl;
use crate::inject::escape_text;
use crate::surface::{ImageLoad, Notifier, PrintSurface, SurfaceImage, SurfaceOpener};

pub const POPUP_BLOCKED_MESSAGE: &str = "Please allow popups to print.";

#[derive(Debug, Clone, PartialEq)]
pub struct PrintJob {
    pub barcode: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub copies: u32,
}

impl PrintJob {
    pub fn new(barcode: impl Into<String>, width_mm: f64, height_mm: f64, copies: u32) -> Self {
        Self {
            barcode: barcode.into(),
            width_mm,
            height_mm,
            copies: copies.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintDocument {
    html: String,
    page_count: usize,
    width_mm: f64,
    height_mm: f64,
}

impl PrintDocument {
    pub fn build(job: &PrintJob, image_url: &BarcodeImageUrl, inset_mm: f64) -> Self {
        let page_count = job.copies.max(1) as usize;
        let src = escape_text(&image_url.for_barcode(&job.barcode));
        let alt = escape_text(&job.barcode);

        let mut pages = String::new();
        for index in 0..page_count {
            let last = index + 1 == page_count;
            let break_after = if last { "auto" } else { "always" };
            pages.push_str(&format!(
                "<div class=\"page\" style=\"page-break-after: {break_after};\"><img src=\"{src}\" alt=\"{alt}\"></div>\n"
            ));
        }

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<title>Print Barcode</title>
<style>
@page {{
  size: {width}mm {height}mm;
  margin: 0;
}}
body {{
  margin: 0;
  padding: 0;
  width: 100%;
  height: 100%;
}}
.page {{
  width: 100vw;
  height: 100vh;
  page-break-after: always;
  display: flex;
  justify-content: center;
  align-items: center;
  overflow: hidden;
  box-sizing: border-box;
  padding: {inset}mm;
}}
.page:last-child {{
  page-break-after: auto;
}}
img {{
  max-width: 100%;
  max-height: 100%;
  object-fit: contain;
  display: block;
}}
</style>
</head>
<body>
{pages}</body>
</html>
"#,
            width = job.width_mm,
            height = job.height_mm,
            inset = inset_mm,
        );

        Self {
            html,
            page_count,
            width_mm: job.width_mm,
            height_mm: job.height_mm,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn page_size_mm(&self) -> (f64, f64) {
        (self.width_mm, self.height_mm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintOutcome {
    Printed { images: usize, failed: usize },
    // Image enumeration failed; print was attempted after the fallback delay.
    PrintedAfterFallback,
    PrintFailed,
}

// Failed images count as settled. When enumeration is refused a single delayed
// print is attempted and its error swallowed.
pub async fn run_print_trigger(surface: Rc<dyn PrintSurface>, timing: PrintTiming) -> PrintOutcome {
    sleep(timing.start()).await;

    let images = match surface.images() {
        Ok(images) => images,
        Err(err) => {
            debug!(error = %err, "image enumeration failed; using delayed print");
            sleep(timing.fallback()).await;
            surface.focus();
            return match surface.print() {
                Ok(()) => PrintOutcome::PrintedAfterFallback,
                Err(err) => {
                    debug!(error = %err, "fallback print failed");
                    PrintOutcome::PrintFailed
                }
            };
        }
    };

    let total = images.len();
    let mut failed = 0;
    if total == 0 {
        sleep(timing.no_images()).await;
    } else {
        let mut settled = 0;
        let mut pending = FuturesUnordered::new();
        for image in images {
            match image {
                SurfaceImage::Complete => settled += 1,
                SurfaceImage::Pending(load) => pending.push(load),
            }
        }
        while let Some(load) = pending.next().await {
            settled += 1;
            if load == ImageLoad::Errored {
                failed += 1;
            }
        }
        debug!(settled, failed, "print images settled");
        sleep(timing.settled()).await;
    }

    surface.focus();
    match surface.print() {
        Ok(()) => {
            info!(images = total, failed, "print dialog opened");
            PrintOutcome::Printed {
                images: total,
                failed,
            }
        }
        Err(err) => {
            warn!(error = %err, "print command failed");
            PrintOutcome::PrintFailed
        }
    }
}

pub struct PrintDocumentGenerator {
    opener: Rc<dyn SurfaceOpener>,
    notifier: Rc<dyn Notifier>,
    image_url: BarcodeImageUrl,
    config: PrintConfig,
}

impl PrintDocumentGenerator {
    pub fn new(
        opener: Rc<dyn SurfaceOpener>,
        notifier: Rc<dyn Notifier>,
        image_url: BarcodeImageUrl,
        config: PrintConfig,
    ) -> Self {
        Self {
            opener,
            notifier,
            image_url,
            config,
        }
    }

    pub fn document(&self, job: &PrintJob) -> PrintDocument {
        let max = self.config.max_copies.max(1);
        if job.copies > max {
            warn!(requested = job.copies, max, "copy count capped");
            let capped = PrintJob {
                copies: max,
                ..job.clone()
            };
            return PrintDocument::build(&capped, &self.image_url, self.config.inset_mm);
        }
        PrintDocument::build(job, &self.image_url, self.config.inset_mm)
    }

    // The trigger task outlives the caller and never closes the surface.
    pub fn render(&self, job: PrintJob) -> Result<JoinHandle<PrintOutcome>, OverlayError> {
        let Some(surface) = self
            .opener
            .open(self.config.surface_width, self.config.surface_height)
        else {
            warn!("print surface blocked");
            self.notifier.alert(POPUP_BLOCKED_MESSAGE);
            return Err(OverlayError::SurfaceBlocked);
        };

        let document = self.document(&job);
        surface.write(document.html());
        surface.close();
        surface.focus();
        info!(
            barcode = %job.barcode,
            pages = document.page_count(),
            width_mm = job.width_mm,
            height_mm = job.height_mm,
            "print document written"
        );

        let timing = self.config.timing;
        Ok(tokio::task::spawn_local(run_print_trigger(surface, timing)))
    }
}
