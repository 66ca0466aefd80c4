//! Progress-callback trait for stage and page events.
//!
//! Inject an [`Arc<dyn FlattenProgressCallback>`] via
//! [`crate::config::FlattenConfigBuilder::progress_callback`] to follow a run
//! as it moves through the four stages.
//!
//! # Example
//!
//! ```rust
//! use pdf_flattener::{FlattenConfig, FlattenProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     assembled: AtomicUsize,
//! }
//!
//! impl FlattenProgressCallback for PageCounter {
//!     fn on_page_assembled(&self, page_num: usize, total_pages: usize) {
//!         self.assembled.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total_pages} embedded");
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { assembled: AtomicUsize::new(0) });
//!
//! let config = FlattenConfig::builder()
//!     .progress_callback(counter as Arc<dyn FlattenProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use crate::output::FlattenStats;
use std::sync::Arc;

/// Called by the pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in pipeline order on a single task.
pub trait FlattenProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once per page after the renderer has returned all images.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: pages in the source document
    /// * `width_px`, `height_px`: raster size of the page
    fn on_page_rendered(&self, page_num: usize, total_pages: usize, width_px: u32, height_px: u32) {
        let _ = (page_num, total_pages, width_px, height_px);
    }

    /// Called after a page has been encoded into the output document.
    fn on_page_assembled(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once after the output has been written (and patched).
    fn on_complete(&self, stats: &FlattenStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FlattenProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FlattenConfig`].
pub type ProgressCallback = Arc<dyn FlattenProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<Stage>>,
        pages: Mutex<Vec<usize>>,
    }

    impl FlattenProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_page_assembled(&self, page_num: usize, _total_pages: usize) {
            self.pages.lock().unwrap().push(page_num);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Rasterize);
        cb.on_page_rendered(1, 2, 1700, 2200);
        cb.on_page_assembled(1, 2);
        cb.on_complete(&FlattenStats::default());
    }

    #[test]
    fn recorder_receives_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Rasterize);
        rec.on_stage_start(Stage::Assemble);
        rec.on_page_assembled(1, 2);
        rec.on_page_assembled(2, 2);

        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![Stage::Rasterize, Stage::Assemble]
        );
        assert_eq!(*rec.pages.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Patch);
    }
}
