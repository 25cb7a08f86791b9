// SPDX-License-Identifier: CEPL-1.0
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use kiln_core::{hresult, DeviceError, Timer};
use kiln_platform::winit::keyboard::KeyCode;
use kiln_platform::winit::raw_window_handle::HasWindowHandle;
use kiln_platform::{
    launch, AppRegistration, Application, InitContext, MessagePump, MouseButtons,
    PlatformError, Runner, RunnerConfig, SizeKind, WindowMessage,
};
use kiln_render::{FrameRenderer, HeadlessDevice, RenderSize};

// Only one runner may exist per process, and tests run on parallel threads.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

const SCRIPT_EXHAUSTED: i32 = i32::MIN;

enum Step {
    Msg(WindowMessage),
    Idle,
    /// Idle after letting wall-clock time pass.
    Stall(Duration),
}

struct ScriptedPump {
    script: VecDeque<Step>,
    quit: Option<i32>,
    size: RenderSize,
    titles: Vec<String>,
}

impl ScriptedPump {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            script: steps.into(),
            quit: None,
            size: RenderSize::new(800, 600),
            titles: Vec::new(),
        }
    }
}

impl MessagePump for ScriptedPump {
    fn poll(&mut self) -> Option<WindowMessage> {
        if matches!(self.script.front(), Some(Step::Msg(_))) {
            if let Some(Step::Msg(msg)) = self.script.pop_front() {
                return Some(msg);
            }
        }
        if let Some(code) = self.quit.take() {
            return Some(WindowMessage::Quit(code));
        }
        match self.script.pop_front() {
            Some(Step::Idle) => None,
            Some(Step::Stall(d)) => {
                std::thread::sleep(d);
                None
            }
            _ => Some(WindowMessage::Quit(SCRIPT_EXHAUSTED)),
        }
    }

    fn post_quit(&mut self, code: i32) {
        if self.quit.is_none() {
            self.quit = Some(code);
        }
    }

    fn set_title(&mut self, title: &str) {
        self.titles.push(title.to_owned());
    }

    fn client_size(&self) -> RenderSize {
        self.size
    }

    fn window_handle(&self) -> Option<&dyn HasWindowHandle> {
        None
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Init,
    Resize(RenderSize),
    Update,
    Render,
    MouseDown(MouseButtons, i32, i32),
    MouseUp(MouseButtons, i32, i32),
    MouseMove(MouseButtons, i32, i32),
}

type Log = Rc<RefCell<Vec<Event>>>;

#[derive(Default)]
struct Recorder {
    log: Log,
    fail_init: bool,
    fail_render_on: Option<usize>,
    renders: usize,
}

impl Recorder {
    fn count(&self, event: &Event) -> usize {
        self.log.borrow().iter().filter(|e| *e == event).count()
    }

    fn resizes(&self) -> Vec<RenderSize> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Resize(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

impl Application for Recorder {
    fn on_init(&mut self, _ctx: InitContext<'_>) -> Result<(), DeviceError> {
        if self.fail_init {
            return Err(DeviceError::new(
                "D3D12CreateDevice",
                file!(),
                line!(),
                hresult::E_FAIL,
            ));
        }
        self.log.borrow_mut().push(Event::Init);
        Ok(())
    }

    fn on_resize(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        self.log.borrow_mut().push(Event::Resize(size));
        Ok(())
    }

    fn on_update(&mut self, _timer: &Timer) {
        self.log.borrow_mut().push(Event::Update);
    }

    fn on_render(&mut self, _timer: &Timer) -> Result<(), DeviceError> {
        self.renders += 1;
        if self.fail_render_on == Some(self.renders) {
            return Err(DeviceError::new(
                "IDXGISwapChain::Present",
                file!(),
                line!(),
                hresult::DXGI_ERROR_DEVICE_REMOVED,
            ));
        }
        self.log.borrow_mut().push(Event::Render);
        Ok(())
    }

    fn on_mouse_down(&mut self, buttons: MouseButtons, x: i32, y: i32) {
        self.log.borrow_mut().push(Event::MouseDown(buttons, x, y));
    }

    fn on_mouse_up(&mut self, buttons: MouseButtons, x: i32, y: i32) {
        self.log.borrow_mut().push(Event::MouseUp(buttons, x, y));
    }

    fn on_mouse_move(&mut self, buttons: MouseButtons, x: i32, y: i32) {
        self.log.borrow_mut().push(Event::MouseMove(buttons, x, y));
    }
}

fn cfg() -> RunnerConfig {
    RunnerConfig {
        caption: "test".to_owned(),
        paused_sleep: Duration::ZERO,
    }
}

fn idle(n: usize) -> impl Iterator<Item = Step> {
    (0..n).map(|_| Step::Idle)
}

fn msg(m: WindowMessage) -> Step {
    Step::Msg(m)
}

fn runner(steps: Vec<Step>) -> Runner<ScriptedPump, Recorder> {
    let mut r = Runner::new(ScriptedPump::new(steps), Recorder::default(), cfg()).unwrap();
    r.initialize().unwrap();
    r.app().log.borrow_mut().clear();
    r
}

fn resized(w: u32, h: u32, kind: SizeKind) -> WindowMessage {
    WindowMessage::Resized {
        size: RenderSize::new(w, h),
        kind,
    }
}

#[test]
fn immediate_quit_returns_payload_without_ticking() {
    let _g = serial();
    let mut r = runner(vec![msg(WindowMessage::Quit(42))]);

    assert_eq!(r.run().unwrap(), 42);
    assert!(r.app().log.borrow().is_empty());
}

#[test]
fn each_idle_tick_updates_then_renders_once() {
    let _g = serial();
    for n in [0usize, 1, 7] {
        let mut steps: Vec<Step> = idle(n).collect();
        steps.push(msg(WindowMessage::Quit(0)));
        let mut r = runner(steps);

        assert_eq!(r.run().unwrap(), 0);

        let log = r.app().log.borrow().clone();
        assert_eq!(log.len(), 2 * n);
        for pair in log.chunks(2) {
            assert_eq!(pair, [Event::Update, Event::Render]);
        }
    }
}

#[test]
fn nothing_renders_while_inactive_and_ticking_resumes_after() {
    let _g = serial();
    let mut steps: Vec<Step> = idle(2).collect();
    steps.push(msg(WindowMessage::Activated(false)));
    steps.extend(idle(5));
    steps.push(msg(WindowMessage::Activated(true)));
    steps.extend(idle(3));
    steps.push(msg(WindowMessage::Quit(0)));
    let mut r = runner(steps);

    r.run().unwrap();
    assert_eq!(r.app().count(&Event::Update), 5);
    assert_eq!(r.app().count(&Event::Render), 5);
    assert!(!r.is_paused());
}

#[test]
fn deactivation_stops_the_timer() {
    let _g = serial();
    let mut r = runner(vec![]);
    r.handle_message(WindowMessage::Activated(false)).unwrap();
    assert!(r.is_paused());
    assert!(r.timer().is_stopped());

    r.handle_message(WindowMessage::Activated(true)).unwrap();
    assert!(!r.is_paused());
    assert!(!r.timer().is_stopped());
}

#[test]
fn drag_resize_defers_buffer_recreation_until_the_drag_ends() {
    let _g = serial();
    let mut r = runner(vec![]);

    r.handle_message(WindowMessage::EnterSizeMove).unwrap();
    assert!(r.is_resizing());
    assert!(r.is_paused());

    for w in [810, 820, 830] {
        r.handle_message(resized(w, 600, SizeKind::Restored)).unwrap();
    }
    assert!(r.app().resizes().is_empty());

    r.handle_message(WindowMessage::ExitSizeMove).unwrap();
    assert!(!r.is_resizing());
    assert!(!r.is_paused());
    assert_eq!(r.app().resizes(), vec![RenderSize::new(830, 600)]);
}

#[test]
fn restored_resize_outside_a_drag_applies_immediately() {
    let _g = serial();
    let mut r = runner(vec![]);
    r.handle_message(resized(640, 480, SizeKind::Restored)).unwrap();
    assert_eq!(r.app().resizes(), vec![RenderSize::new(640, 480)]);
    assert_eq!(r.client_size(), RenderSize::new(640, 480));
}

#[test]
fn minimize_pauses_and_restore_resumes() {
    let _g = serial();
    let mut steps = vec![msg(resized(0, 0, SizeKind::Minimized))];
    steps.extend(idle(4));
    steps.push(msg(resized(800, 600, SizeKind::Restored)));
    steps.extend(idle(2));
    steps.push(msg(WindowMessage::Quit(0)));
    let mut r = runner(steps);

    r.run().unwrap();
    assert_eq!(r.app().count(&Event::Render), 2);
    assert_eq!(r.app().resizes(), vec![RenderSize::new(800, 600)]);
    assert!(!r.is_minimized());
}

#[test]
fn maximize_and_restore_both_resize() {
    let _g = serial();
    let mut r = runner(vec![]);
    r.handle_message(resized(1920, 1080, SizeKind::Maximized)).unwrap();
    assert!(r.is_maximized());
    r.handle_message(resized(800, 600, SizeKind::Restored)).unwrap();
    assert!(!r.is_maximized());
    assert_eq!(
        r.app().resizes(),
        vec![RenderSize::new(1920, 1080), RenderSize::new(800, 600)]
    );
}

#[test]
fn resize_before_initialization_is_only_remembered() {
    let _g = serial();
    let mut r = Runner::new(ScriptedPump::new(vec![]), Recorder::default(), cfg()).unwrap();
    r.handle_message(resized(300, 200, SizeKind::Restored)).unwrap();
    assert!(r.app().resizes().is_empty());

    r.initialize().unwrap();
    assert_eq!(
        *r.app().log.borrow(),
        vec![Event::Init, Event::Resize(RenderSize::new(300, 200))]
    );
}

#[test]
fn close_request_posts_a_zero_exit_code() {
    let _g = serial();
    let mut r = runner(vec![]);

    assert_eq!(r.handle_message(WindowMessage::CloseRequested).unwrap(), None);
    assert_eq!(r.pump().quit, Some(0));
    assert!(r.app().log.borrow().is_empty());

    assert_eq!(r.run().unwrap(), 0);
}

#[test]
fn frame_stats_reach_the_caption_once_a_second_has_passed() {
    let _g = serial();
    let mut r = runner(vec![
        Step::Idle,
        Step::Idle,
        Step::Stall(Duration::from_millis(1100)),
        Step::Idle,
        msg(WindowMessage::Quit(0)),
    ]);

    r.run().unwrap();
    let titles = &r.pump().titles;
    assert_eq!(titles.len(), 1, "{titles:?}");
    assert!(titles[0].starts_with("test    fps: "), "{}", titles[0]);
    assert!(titles[0].contains("   mspf: "));
}

#[test]
fn escape_key_quits() {
    let _g = serial();
    let mut r = runner(vec![
        msg(WindowMessage::KeyUp(KeyCode::KeyA)),
        msg(WindowMessage::KeyUp(KeyCode::Escape)),
    ]);
    assert_eq!(r.run().unwrap(), 0);
}

#[test]
fn mouse_messages_reach_the_application() {
    let _g = serial();
    let mut r = runner(vec![]);
    r.handle_message(WindowMessage::MouseDown {
        buttons: MouseButtons::LEFT,
        x: 10,
        y: 20,
    })
    .unwrap();
    r.handle_message(WindowMessage::MouseMove {
        buttons: MouseButtons::LEFT | MouseButtons::RIGHT,
        x: 11,
        y: 21,
    })
    .unwrap();
    r.handle_message(WindowMessage::MouseUp {
        buttons: MouseButtons::empty(),
        x: 12,
        y: 22,
    })
    .unwrap();

    assert_eq!(
        *r.app().log.borrow(),
        vec![
            Event::MouseDown(MouseButtons::LEFT, 10, 20),
            Event::MouseMove(MouseButtons::LEFT | MouseButtons::RIGHT, 11, 21),
            Event::MouseUp(MouseButtons::empty(), 12, 22),
        ]
    );
}

#[test]
fn render_failure_ends_the_loop_with_the_device_error() {
    let _g = serial();
    let mut r = Runner::new(
        ScriptedPump::new(idle(10).collect()),
        Recorder {
            fail_render_on: Some(3),
            ..Recorder::default()
        },
        cfg(),
    )
    .unwrap();
    r.initialize().unwrap();

    let err = r.run().unwrap_err();
    assert_eq!(err.code, hresult::DXGI_ERROR_DEVICE_REMOVED);
    assert_eq!(r.app().count(&Event::Render), 2);
    assert_eq!(r.app().count(&Event::Update), 3);
}

#[test]
fn failed_initialization_never_enters_the_loop() {
    let _g = serial();
    let log = Log::default();
    let app = Recorder {
        log: log.clone(),
        fail_init: true,
        ..Recorder::default()
    };
    let pump = ScriptedPump::new(idle(5).collect());

    match launch(pump, app, cfg()) {
        Err(PlatformError::Device(e)) => {
            assert_eq!(e.code, hresult::E_FAIL);
            assert_eq!(e.operation, "D3D12CreateDevice");
        }
        other => panic!("expected a device error, got {other:?}"),
    }
    assert!(log.borrow().is_empty());
    assert!(!AppRegistration::is_live());
}

#[test]
fn launch_runs_to_the_quit_payload() {
    let _g = serial();
    let log = Log::default();
    let app = Recorder {
        log: log.clone(),
        ..Recorder::default()
    };
    let mut steps: Vec<Step> = idle(3).collect();
    steps.push(msg(WindowMessage::Quit(7)));

    assert_eq!(launch(ScriptedPump::new(steps), app, cfg()).unwrap(), 7);
    assert_eq!(log.borrow().iter().filter(|e| **e == Event::Render).count(), 3);
}

#[test]
fn only_one_live_instance() {
    let _g = serial();
    let first = Runner::new(ScriptedPump::new(vec![]), Recorder::default(), cfg()).unwrap();
    assert!(AppRegistration::is_live());

    let second = Runner::new(ScriptedPump::new(vec![]), Recorder::default(), cfg());
    assert!(matches!(second, Err(PlatformError::AlreadyRunning)));

    drop(first);
    assert!(!AppRegistration::is_live());
    assert!(Runner::new(ScriptedPump::new(vec![]), Recorder::default(), cfg()).is_ok());
}

struct ClearScreen {
    size: RenderSize,
    renderer: Option<FrameRenderer<HeadlessDevice>>,
}

impl Application for ClearScreen {
    fn on_init(&mut self, ctx: InitContext<'_>) -> Result<(), DeviceError> {
        let device = HeadlessDevice::new(2, ctx.size)?;
        self.renderer = Some(FrameRenderer::new(device, ctx.size));
        Ok(())
    }

    fn on_resize(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        self.size = size;
        match &mut self.renderer {
            Some(r) => r.resize(size),
            None => Ok(()),
        }
    }

    fn on_update(&mut self, _timer: &Timer) {}

    fn on_render(&mut self, _timer: &Timer) -> Result<(), DeviceError> {
        match &mut self.renderer {
            Some(r) => r.render_frame(),
            None => Ok(()),
        }
    }
}

#[test]
fn runner_drives_the_frame_renderer() {
    let _g = serial();
    let mut steps: Vec<Step> = idle(5).collect();
    steps.push(msg(WindowMessage::EnterSizeMove));
    steps.push(msg(resized(400, 300, SizeKind::Restored)));
    steps.extend(idle(3));
    steps.push(msg(WindowMessage::ExitSizeMove));
    steps.extend(idle(3));
    steps.push(msg(WindowMessage::Quit(0)));

    let app = ClearScreen {
        size: RenderSize::new(0, 0),
        renderer: None,
    };
    let mut r = Runner::new(ScriptedPump::new(steps), app, cfg()).unwrap();
    r.initialize().unwrap();
    r.run().unwrap();

    let renderer = r.app().renderer.as_ref().unwrap();
    assert_eq!(renderer.frames_rendered(), 8);
    // Resize reset the index to 0, then three frames on two buffers.
    assert_eq!(renderer.back_buffer_index(), 1);
    assert_eq!(renderer.size(), RenderSize::new(400, 300));
    assert_eq!(r.app().size, RenderSize::new(400, 300));
}
