// SPDX-License-Identifier: CEPL-1.0
use kiln_core::{DeviceError, Timer};
use kiln_render::RenderSize;
use winit::raw_window_handle::HasWindowHandle;

use crate::MouseButtons;

pub struct InitContext<'a> {
    pub window: Option<&'a dyn HasWindowHandle>,
    pub size: RenderSize,
}

/// Hooks a concrete application hands to the [`Runner`](crate::Runner).
pub trait Application {
    /// Create the device and everything else that lives for the whole run.
    fn on_init(&mut self, ctx: InitContext<'_>) -> Result<(), DeviceError>;

    /// The client area changed size. Also called once right after `on_init`.
    fn on_resize(&mut self, size: RenderSize) -> Result<(), DeviceError>;

    fn on_update(&mut self, timer: &Timer);

    fn on_render(&mut self, timer: &Timer) -> Result<(), DeviceError>;

    fn on_mouse_down(&mut self, _buttons: MouseButtons, _x: i32, _y: i32) {}
    fn on_mouse_up(&mut self, _buttons: MouseButtons, _x: i32, _y: i32) {}
    fn on_mouse_move(&mut self, _buttons: MouseButtons, _x: i32, _y: i32) {}
}
