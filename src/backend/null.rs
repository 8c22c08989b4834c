//! Headless backend for testing and development.
//!
//! Performs no drawing: every render clears the target to the background
//! colour with infinite depth and no ids.

use crate::backend::{BackendError, BackendResult, FrameSnapshot, RenderBackend, RenderTarget, ViewSetup};
use crate::EngineConfig;

/// Backend that only clears.
#[derive(Debug, Default)]
pub struct NullBackend {
    initialized: bool,
    frames: u64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of render calls served.
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn init(&mut self, _config: &EngineConfig) -> BackendResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn render(
        &mut self,
        frame: &FrameSnapshot,
        view: &ViewSetup,
        target: &mut RenderTarget,
    ) -> BackendResult<()> {
        if !self.initialized {
            return Err(BackendError::NotInitialized);
        }
        log::trace!(
            "NullBackend: clearing {}x{} target ({} items ignored)",
            view.width,
            view.height,
            frame.items.len()
        );
        target.clear(frame.background);
        self.frames += 1;
        Ok(())
    }
}
