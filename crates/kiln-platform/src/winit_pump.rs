// SPDX-License-Identifier: CEPL-1.0
//! [`MessagePump`] over a winit event loop driven with `pump_app_events`, so
//! the caller owns the loop the same way a `PeekMessage` loop would.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use kiln_render::RenderSize;
use tracing::info;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::PhysicalKey,
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::HasWindowHandle,
    window::{Window, WindowAttributes, WindowId},
};

use crate::{MessagePump, MouseButtons, PlatformError, SizeKind, WindowMessage};

/// Smallest client area the window can be dragged down to.
const MIN_CLIENT_SIZE: u32 = 200;
const CREATE_ATTEMPTS: u32 = 100;

type Queue = Rc<RefCell<VecDeque<WindowMessage>>>;

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub size: RenderSize,
}

pub struct WinitPump {
    event_loop: EventLoop<()>,
    state: PumpState,
    quit: Option<i32>,
    exited: bool,
}

struct PumpState {
    attributes: WindowAttributes,
    queue: Queue,
    cursor: (i32, i32),
    buttons: MouseButtons,
    failure: Option<String>,
    // Must drop before the window it is attached to.
    #[cfg(windows)]
    size_move: Option<size_move::SizeMoveHook>,
    window: Option<Window>,
}

impl WinitPump {
    /// Opens the window. Returns once it exists.
    pub fn new(cfg: &WindowConfig) -> Result<Self, PlatformError> {
        let mut event_loop =
            EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;

        let attributes = Window::default_attributes()
            .with_title(cfg.title.clone())
            .with_inner_size(PhysicalSize::new(cfg.size.width, cfg.size.height))
            .with_min_inner_size(PhysicalSize::new(MIN_CLIENT_SIZE, MIN_CLIENT_SIZE));

        let mut state = PumpState {
            attributes,
            queue: Queue::default(),
            cursor: (0, 0),
            buttons: MouseButtons::empty(),
            failure: None,
            #[cfg(windows)]
            size_move: None,
            window: None,
        };

        for _ in 0..CREATE_ATTEMPTS {
            let status = event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut state);
            if let Some(reason) = state.failure.take() {
                return Err(PlatformError::WindowCreation(reason));
            }
            if state.window.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = status {
                return Err(PlatformError::WindowCreation(format!(
                    "event loop exited with {code} before the window opened"
                )));
            }
        }

        if state.window.is_none() {
            return Err(PlatformError::WindowCreation(
                "window never opened".to_owned(),
            ));
        }

        Ok(Self {
            event_loop,
            state,
            quit: None,
            exited: false,
        })
    }

    fn pop(&self) -> Option<WindowMessage> {
        self.state.queue.borrow_mut().pop_front()
    }
}

impl MessagePump for WinitPump {
    fn poll(&mut self) -> Option<WindowMessage> {
        if let Some(msg) = self.pop() {
            return Some(msg);
        }

        if !self.exited {
            let status = self
                .event_loop
                .pump_app_events(Some(Duration::ZERO), &mut self.state);
            if let PumpStatus::Exit(code) = status {
                self.exited = true;
                self.post_quit(code);
            }
            if let Some(msg) = self.pop() {
                return Some(msg);
            }
        }

        self.quit.take().map(WindowMessage::Quit)
    }

    fn post_quit(&mut self, code: i32) {
        if self.quit.is_none() {
            self.quit = Some(code);
        }
    }

    fn set_title(&mut self, title: &str) {
        if let Some(w) = &self.state.window {
            w.set_title(title);
        }
    }

    fn client_size(&self) -> RenderSize {
        match &self.state.window {
            Some(w) => {
                let size = w.inner_size();
                RenderSize::new(size.width, size.height)
            }
            None => RenderSize::new(0, 0),
        }
    }

    fn window_handle(&self) -> Option<&dyn HasWindowHandle> {
        self.state.window.as_ref().map(|w| w as &dyn HasWindowHandle)
    }
}

impl PumpState {
    fn push(&self, msg: WindowMessage) {
        self.queue.borrow_mut().push_back(msg);
    }

    fn size_kind(&self, size: PhysicalSize<u32>) -> SizeKind {
        let Some(window) = &self.window else {
            return SizeKind::Restored;
        };
        if size.width == 0 || size.height == 0 || window.is_minimized() == Some(true) {
            SizeKind::Minimized
        } else if window.is_maximized() {
            SizeKind::Maximized
        } else {
            SizeKind::Restored
        }
    }
}

impl ApplicationHandler for PumpState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                info!("window ready ({}x{})", size.width, size.height);

                #[cfg(windows)]
                {
                    self.size_move = size_move::SizeMoveHook::install(&window, self.queue.clone());
                }
                self.window = Some(window);
            }
            Err(e) => self.failure = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::Focused(focused) => self.push(WindowMessage::Activated(focused)),

            WindowEvent::Resized(size) => {
                let kind = self.size_kind(size);
                self.push(WindowMessage::Resized {
                    size: RenderSize::new(size.width, size.height),
                    kind,
                });
            }

            WindowEvent::CloseRequested => self.push(WindowMessage::CloseRequested),
            WindowEvent::Destroyed => self.push(WindowMessage::Destroyed),

            WindowEvent::KeyboardInput { event, .. } => {
                if let (ElementState::Released, PhysicalKey::Code(code)) =
                    (event.state, event.physical_key)
                {
                    self.push(WindowMessage::KeyUp(code));
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as i32, position.y as i32);
                self.push(WindowMessage::MouseMove {
                    buttons: self.buttons,
                    x: self.cursor.0,
                    y: self.cursor.1,
                });
            }

            WindowEvent::MouseInput { state, button, .. } => {
                let flag = match button {
                    MouseButton::Left => MouseButtons::LEFT,
                    MouseButton::Right => MouseButtons::RIGHT,
                    MouseButton::Middle => MouseButtons::MIDDLE,
                    _ => return,
                };
                let (x, y) = self.cursor;
                match state {
                    ElementState::Pressed => {
                        self.buttons.insert(flag);
                        self.push(WindowMessage::MouseDown {
                            buttons: self.buttons,
                            x,
                            y,
                        });
                    }
                    ElementState::Released => {
                        self.buttons.remove(flag);
                        self.push(WindowMessage::MouseUp {
                            buttons: self.buttons,
                            x,
                            y,
                        });
                    }
                }
            }

            _ => {}
        }
    }
}

/// winit does not report the start and end of a modal size/move drag, so a
/// subclass procedure picks up `WM_ENTERSIZEMOVE` / `WM_EXITSIZEMOVE` and
/// feeds them into the same queue. The queue pointer travels as the
/// subclass reference data.
#[cfg(windows)]
mod size_move {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::UI::Shell::{DefSubclassProc, RemoveWindowSubclass, SetWindowSubclass};
    use windows::Win32::UI::WindowsAndMessaging::{WM_ENTERSIZEMOVE, WM_EXITSIZEMOVE};
    use winit::raw_window_handle::{HasWindowHandle, RawWindowHandle};
    use winit::window::Window;

    use super::Queue;
    use crate::WindowMessage;

    const SUBCLASS_ID: usize = 1;

    pub(super) struct SizeMoveHook {
        hwnd: HWND,
        // Keeps the reference data alive while the subclass is installed.
        _queue: Queue,
    }

    impl SizeMoveHook {
        pub(super) fn install(window: &Window, queue: Queue) -> Option<Self> {
            let RawWindowHandle::Win32(handle) = window.window_handle().ok()?.as_raw() else {
                return None;
            };
            let hwnd = HWND(handle.hwnd.get() as *mut _);
            let data = std::rc::Rc::as_ptr(&queue) as usize;

            // SAFETY: `hwnd` is a live window owned by this thread; `data`
            // stays valid until the hook removes itself on drop.
            let installed = unsafe { SetWindowSubclass(hwnd, Some(subclass_proc), SUBCLASS_ID, data) };
            installed.as_bool().then_some(Self {
                hwnd,
                _queue: queue,
            })
        }
    }

    impl Drop for SizeMoveHook {
        fn drop(&mut self) {
            // SAFETY: removes the subclass installed in `install`.
            unsafe {
                let _ = RemoveWindowSubclass(self.hwnd, Some(subclass_proc), SUBCLASS_ID);
            }
        }
    }

    unsafe extern "system" fn subclass_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
        _id: usize,
        data: usize,
    ) -> LRESULT {
        let message = match msg {
            WM_ENTERSIZEMOVE => Some(WindowMessage::EnterSizeMove),
            WM_EXITSIZEMOVE => Some(WindowMessage::ExitSizeMove),
            _ => None,
        };

        if let Some(message) = message {
            // SAFETY: `data` is the queue pointer set in `install`.
            let queue = unsafe { &*(data as *const RefCell<VecDeque<WindowMessage>>) };
            if let Ok(mut q) = queue.try_borrow_mut() {
                q.push_back(message);
            }
        }

        // SAFETY: forwarding the untouched message down the subclass chain.
        unsafe { DefSubclassProc(hwnd, msg, wparam, lparam) }
    }
}
