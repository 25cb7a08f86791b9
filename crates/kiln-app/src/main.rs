// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::{Parser, ValueEnum};
use kiln_core::{hresult, init_tracing, DeviceError, Timer};
use kiln_platform::{
    launch, show_fatal_error, Application, InitContext, RunnerConfig, WindowConfig, WinitPump,
};
use kiln_render::{FrameRenderer, HeadlessDevice, RenderSize, LIGHT_STEEL_BLUE};
#[cfg(windows)]
use kiln_render_d3d12::{D3d12Config, D3d12Device};
use tracing::{info, warn};

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Choose renderer backend: d3d12 | headless
    #[arg(long, value_enum, default_value_t = BackendKind::platform_default())]
    backend: BackendKind,

    /// TOML config file; missing means defaults
    #[arg(long, default_value = "kiln.toml")]
    config: PathBuf,

    /// Use the WARP software adapter
    #[arg(long)]
    warp: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    D3d12,
    Headless,
}

impl BackendKind {
    fn platform_default() -> Self {
        if cfg!(windows) {
            BackendKind::D3d12
        } else {
            BackendKind::Headless
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "d3d App".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct RenderCfg {
    #[serde(default = "default_clear")]
    clear_color: [f32; 4],
    #[serde(default = "default_back_buffer_count")]
    back_buffer_count: usize,
    #[serde(default = "default_debug_layer")]
    debug_layer: bool,
    #[serde(default)]
    use_warp: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            back_buffer_count: default_back_buffer_count(),
            debug_layer: default_debug_layer(),
            use_warp: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AppCfg {
    #[serde(default)]
    window: WindowCfg,
    #[serde(default)]
    render: RenderCfg,
}

fn default_clear() -> [f32; 4] {
    LIGHT_STEEL_BLUE
}
fn default_back_buffer_count() -> usize {
    2
}
fn default_debug_layer() -> bool {
    cfg!(debug_assertions)
}

fn parse_cfg(text: &str) -> Result<AppCfg> {
    Ok(toml::from_str::<AppCfg>(text)?)
}

fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{}: {e:#}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(_) => AppCfg::default(),
    }
}

enum Backend {
    #[cfg(windows)]
    D3d12(Box<FrameRenderer<D3d12Device>>),
    Headless(Box<FrameRenderer<HeadlessDevice>>),
}

impl Backend {
    fn name(&self) -> &'static str {
        match self {
            #[cfg(windows)]
            Backend::D3d12(_) => "d3d12",
            Backend::Headless(_) => "headless",
        }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        match self {
            #[cfg(windows)]
            Backend::D3d12(r) => r.set_clear_color(rgba),
            Backend::Headless(r) => r.set_clear_color(rgba),
        }
    }

    fn resize(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        match self {
            #[cfg(windows)]
            Backend::D3d12(r) => r.resize(size),
            Backend::Headless(r) => r.resize(size),
        }
    }

    fn render_frame(&mut self) -> Result<(), DeviceError> {
        match self {
            #[cfg(windows)]
            Backend::D3d12(r) => r.render_frame(),
            Backend::Headless(r) => r.render_frame(),
        }
    }
}

/// Clears the window to one color every frame.
struct ClearApp {
    choice: BackendKind,
    render: RenderCfg,
    force_warp: bool,
    backend: Option<Backend>,
}

impl ClearApp {
    fn new(choice: BackendKind, render: RenderCfg, force_warp: bool) -> Self {
        Self {
            choice,
            render,
            force_warp,
            backend: None,
        }
    }

    #[cfg(windows)]
    fn create_d3d12(&self, ctx: &InitContext<'_>) -> Result<Backend, DeviceError> {
        let window = ctx.window.ok_or_else(|| {
            DeviceError::new("CreateSwapChainForHwnd", file!(), line!(), hresult::E_INVALIDARG)
                .with_message("no window to present to")
        })?;
        let cfg = D3d12Config {
            buffer_count: self.render.back_buffer_count,
            debug_layer: self.render.debug_layer,
            use_warp: self.render.use_warp || self.force_warp,
        };
        let device = D3d12Device::new(window, ctx.size, &cfg)?;
        Ok(Backend::D3d12(Box::new(FrameRenderer::new(device, ctx.size))))
    }

    #[cfg(not(windows))]
    fn create_d3d12(&self, _ctx: &InitContext<'_>) -> Result<Backend, DeviceError> {
        Err(DeviceError::new("D3D12CreateDevice", file!(), line!(), hresult::E_FAIL)
            .with_message("Direct3D 12 needs Windows; try --backend headless"))
    }
}

impl Application for ClearApp {
    fn on_init(&mut self, ctx: InitContext<'_>) -> Result<(), DeviceError> {
        let mut backend = match self.choice {
            BackendKind::D3d12 => self.create_d3d12(&ctx)?,
            BackendKind::Headless => {
                let device = HeadlessDevice::new(self.render.back_buffer_count, ctx.size)?;
                Backend::Headless(Box::new(FrameRenderer::new(device, ctx.size)))
            }
        };
        backend.set_clear_color(self.render.clear_color);

        info!("backend = {}", backend.name());
        self.backend = Some(backend);
        Ok(())
    }

    fn on_resize(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        match &mut self.backend {
            Some(b) => b.resize(size),
            None => Ok(()),
        }
    }

    fn on_update(&mut self, _timer: &Timer) {}

    fn on_render(&mut self, _timer: &Timer) -> Result<(), DeviceError> {
        match &mut self.backend {
            Some(b) => b.render_frame(),
            None => Ok(()),
        }
    }
}

fn run(args: &Args, cfg: AppCfg) -> Result<i32> {
    let pump = WinitPump::new(&WindowConfig {
        title: cfg.window.title.clone(),
        size: RenderSize::new(cfg.window.width, cfg.window.height),
    })?;

    let app = ClearApp::new(args.backend, cfg.render, args.warp);
    let runner_cfg = RunnerConfig {
        caption: cfg.window.title,
        ..RunnerConfig::default()
    };
    Ok(launch(pump, app, runner_cfg)?)
}

fn main() {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    info!("config = {} → {:?}", args.config.display(), cfg);

    let code = match run(&args, cfg) {
        Ok(code) => code,
        Err(e) => {
            show_fatal_error(&format!("{e:#}"));
            // Fatal errors exit like a normal quit.
            0
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg.window.title, "d3d App");
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        assert_eq!(cfg.render.clear_color, LIGHT_STEEL_BLUE);
        assert_eq!(cfg.render.back_buffer_count, 2);
        assert!(!cfg.render.use_warp);
    }

    #[test]
    fn partial_sections_keep_the_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [window]
            width = 1280

            [render]
            back_buffer_count = 3
            clear_color = [0.0, 0.0, 0.0, 1.0]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.window.title, "d3d App");
        assert_eq!(cfg.render.back_buffer_count, 3);
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn malformed_config_is_an_error_and_loading_falls_back() {
        assert!(parse_cfg("[render]\nback_buffer_count = \"two\"").is_err());

        let missing = load_cfg(Path::new("definitely/not/here/kiln.toml"));
        assert_eq!(missing.render.back_buffer_count, 2);
    }

    #[test]
    fn cli_flags_parse() {
        let args = Args::try_parse_from(["kiln", "--backend", "headless", "--warp", "--config", "x.toml"]).unwrap();
        assert_eq!(args.backend, BackendKind::Headless);
        assert!(args.warp);
        assert_eq!(args.config, PathBuf::from("x.toml"));

        let args = Args::try_parse_from(["kiln"]).unwrap();
        assert_eq!(args.backend, BackendKind::platform_default());
        assert_eq!(args.config, PathBuf::from("kiln.toml"));
        assert!(!args.warp);

        assert!(Args::try_parse_from(["kiln", "--backend", "vulkan"]).is_err());
    }

    #[test]
    fn headless_app_renders_after_init() {
        let mut app = ClearApp::new(BackendKind::Headless, RenderCfg::default(), false);
        let size = RenderSize::new(64, 48);
        app.on_init(InitContext { window: None, size }).unwrap();
        app.on_resize(size).unwrap();

        let timer = Timer::new();
        for _ in 0..3 {
            app.on_update(&timer);
            app.on_render(&timer).unwrap();
        }
        match &app.backend {
            Some(Backend::Headless(r)) => {
                assert_eq!(r.frames_rendered(), 3);
                assert_eq!(r.clear_color(), LIGHT_STEEL_BLUE);
            }
            _ => panic!("expected the headless backend"),
        }
    }

    #[test]
    fn bad_buffer_count_fails_init() {
        let render = RenderCfg {
            back_buffer_count: 0,
            ..RenderCfg::default()
        };
        let mut app = ClearApp::new(BackendKind::Headless, render, false);
        let err = app
            .on_init(InitContext {
                window: None,
                size: RenderSize::new(8, 8),
            })
            .unwrap_err();
        assert_eq!(err.code, hresult::DXGI_ERROR_INVALID_CALL);
        assert!(app.backend.is_none());
    }
}
