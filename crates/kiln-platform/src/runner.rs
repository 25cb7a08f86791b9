// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use kiln_core::{DeviceError, FrameStats, Timer};
use kiln_render::RenderSize;
use tracing::{debug, info};
use winit::keyboard::KeyCode;

use crate::{
    AppRegistration, Application, InitContext, MessagePump, PlatformError, SizeKind,
    WindowMessage,
};

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Window caption; frame stats are appended to it.
    pub caption: String,
    /// How long to yield per idle poll while paused.
    pub paused_sleep: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            caption: "d3d App".to_owned(),
            paused_sleep: Duration::from_millis(100),
        }
    }
}

/// The main loop: drains window messages, and while idle ticks the timer and
/// runs exactly one update followed by one render.
pub struct Runner<P: MessagePump, A: Application> {
    pump: P,
    app: A,
    cfg: RunnerConfig,
    timer: Timer,
    stats: FrameStats,
    size: RenderSize,

    initialized: bool,
    paused: bool,
    minimized: bool,
    maximized: bool,
    resizing: bool,

    _registration: AppRegistration,
}

/// Builds a runner, initializes the application and runs it to completion.
/// The loop is never entered if initialization fails.
pub fn launch<P: MessagePump, A: Application>(
    pump: P,
    app: A,
    cfg: RunnerConfig,
) -> Result<i32, PlatformError> {
    let mut runner = Runner::new(pump, app, cfg)?;
    runner.initialize()?;
    Ok(runner.run()?)
}

impl<P: MessagePump, A: Application> Runner<P, A> {
    pub fn new(pump: P, app: A, cfg: RunnerConfig) -> Result<Self, PlatformError> {
        let registration = AppRegistration::acquire()?;
        let size = pump.client_size();
        Ok(Self {
            pump,
            app,
            cfg,
            timer: Timer::new(),
            stats: FrameStats::new(),
            size,
            initialized: false,
            paused: false,
            minimized: false,
            maximized: false,
            resizing: false,
            _registration: registration,
        })
    }

    pub fn initialize(&mut self) -> Result<(), DeviceError> {
        let ctx = InitContext {
            window: self.pump.window_handle(),
            size: self.size,
        };
        self.app.on_init(ctx)?;
        self.app.on_resize(self.size)?;
        self.initialized = true;
        info!("initialized at {}x{}", self.size.width, self.size.height);
        Ok(())
    }

    /// Runs until a quit message arrives and returns its exit code.
    pub fn run(&mut self) -> Result<i32, DeviceError> {
        self.timer.reset();

        loop {
            if let Some(msg) = self.pump.poll() {
                if let Some(code) = self.handle_message(msg)? {
                    info!("quit → exit code {code}");
                    return Ok(code);
                }
                continue;
            }

            if self.paused {
                std::thread::sleep(self.cfg.paused_sleep);
                continue;
            }

            self.timer.tick();
            self.publish_frame_stats();
            self.app.on_update(&self.timer);
            self.app.on_render(&self.timer)?;
        }
    }

    /// Applies one window message. Returns the exit code for `Quit`.
    pub fn handle_message(&mut self, msg: WindowMessage) -> Result<Option<i32>, DeviceError> {
        match msg {
            WindowMessage::Activated(active) => {
                self.paused = !active;
                if active {
                    self.timer.start();
                } else {
                    self.timer.stop();
                }
                info!("activated={active} → paused={}", self.paused);
            }

            WindowMessage::Resized { size, kind } => {
                self.size = size;
                if self.initialized {
                    self.on_size(kind)?;
                }
            }

            WindowMessage::EnterSizeMove => {
                self.paused = true;
                self.resizing = true;
                self.timer.stop();
            }

            WindowMessage::ExitSizeMove => {
                self.paused = false;
                self.resizing = false;
                self.timer.start();
                self.resize()?;
            }

            WindowMessage::CloseRequested | WindowMessage::Destroyed => self.pump.post_quit(0),

            WindowMessage::KeyUp(KeyCode::Escape) => self.pump.post_quit(0),
            WindowMessage::KeyUp(_) => {}

            WindowMessage::MouseDown { buttons, x, y } => self.app.on_mouse_down(buttons, x, y),
            WindowMessage::MouseUp { buttons, x, y } => self.app.on_mouse_up(buttons, x, y),
            WindowMessage::MouseMove { buttons, x, y } => self.app.on_mouse_move(buttons, x, y),

            WindowMessage::Quit(code) => return Ok(Some(code)),
        }
        Ok(None)
    }

    fn on_size(&mut self, kind: SizeKind) -> Result<(), DeviceError> {
        match kind {
            SizeKind::Minimized => {
                self.paused = true;
                self.minimized = true;
                self.maximized = false;
                info!("minimized → paused=true");
            }
            SizeKind::Maximized => {
                self.paused = false;
                self.minimized = false;
                self.maximized = true;
                self.resize()?;
            }
            SizeKind::Restored => {
                if self.minimized {
                    self.paused = false;
                    self.minimized = false;
                    self.resize()?;
                } else if self.maximized {
                    self.paused = false;
                    self.maximized = false;
                    self.resize()?;
                } else if self.resizing {
                    // Deferred until ExitSizeMove.
                } else {
                    self.resize()?;
                }
            }
        }
        Ok(())
    }

    fn resize(&mut self) -> Result<(), DeviceError> {
        self.app.on_resize(self.size)
    }

    fn publish_frame_stats(&mut self) {
        if let Some(rate) = self.stats.record_frame(self.timer.total_time()) {
            debug!("fps ~ {:.0} ({:.3} ms)", rate.fps, rate.mspf);
            let title = rate.caption(&self.cfg.caption);
            self.pump.set_title(&title);
        }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn pump(&self) -> &P {
        &self.pump
    }

    pub fn pump_mut(&mut self) -> &mut P {
        &mut self.pump
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn client_size(&self) -> RenderSize {
        self.size
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn is_maximized(&self) -> bool {
        self.maximized
    }

    pub fn is_resizing(&self) -> bool {
        self.resizing
    }
}
