// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

pub use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Drawable size of the presentation target, in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a single `render` tick ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was recorded, submitted and queued for presentation.
    Presented,
    /// The presentable chain was rebuilt; no image reached the screen this tick.
    Recreated,
    /// Nothing to draw into (zero drawable size).
    Paused,
}

pub trait Renderer {
    /// Resize notification from the windowing side. Takes effect before the next frame.
    fn resize(&mut self, size: RenderSize);
    fn render(&mut self) -> Result<FrameStatus>;
}
