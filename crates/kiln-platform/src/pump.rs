// SPDX-License-Identifier: CEPL-1.0
use kiln_render::RenderSize;
use winit::raw_window_handle::HasWindowHandle;

use crate::WindowMessage;

/// Source of window messages for the main loop.
pub trait MessagePump {
    /// Removes the next pending message. `None` means the queue is empty
    /// right now and the loop is free to do idle work.
    fn poll(&mut self) -> Option<WindowMessage>;

    /// Queues [`WindowMessage::Quit`]. It is handed out only after every
    /// other pending message.
    fn post_quit(&mut self, code: i32);

    fn set_title(&mut self, title: &str);

    fn client_size(&self) -> RenderSize;

    /// `None` for pumps without a real window.
    fn window_handle(&self) -> Option<&dyn HasWindowHandle>;
}
