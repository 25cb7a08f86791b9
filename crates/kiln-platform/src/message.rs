// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use kiln_render::RenderSize;
use winit::keyboard::KeyCode;

bitflags! {
    /// Mouse buttons held while a mouse message was generated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MouseButtons: u8 {
        const LEFT = 0b001;
        const RIGHT = 0b010;
        const MIDDLE = 0b100;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeKind {
    Restored,
    Minimized,
    Maximized,
}

/// Window-system events, in the order the OS delivered them.
#[derive(Clone, Debug, PartialEq)]
pub enum WindowMessage {
    Activated(bool),
    Resized { size: RenderSize, kind: SizeKind },
    /// The user grabbed a resize bar or the title bar.
    EnterSizeMove,
    /// The user let go of it.
    ExitSizeMove,
    CloseRequested,
    Destroyed,
    KeyUp(KeyCode),
    MouseDown { buttons: MouseButtons, x: i32, y: i32 },
    MouseUp { buttons: MouseButtons, x: i32, y: i32 },
    MouseMove { buttons: MouseButtons, x: i32, y: i32 },
    Quit(i32),
}
