// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use vkquad_render::RenderSize;
use winit::window::Window;

/// Current drawable size of `window` in physical pixels.
pub fn drawable_size(window: &Window) -> RenderSize {
    let size = window.inner_size();
    RenderSize::new(size.width, size.height)
}
