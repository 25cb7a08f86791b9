// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub use winit;

mod app;
mod dialog;
mod error;
mod message;
mod pump;
mod registration;
mod runner;
#[cfg(not(any(target_arch = "wasm32", target_os = "ios")))]
mod winit_pump;

pub use app::{Application, InitContext};
pub use dialog::show_fatal_error;
pub use error::PlatformError;
pub use message::{MouseButtons, SizeKind, WindowMessage};
pub use pump::MessagePump;
pub use registration::AppRegistration;
pub use runner::{launch, Runner, RunnerConfig};
#[cfg(not(any(target_arch = "wasm32", target_os = "ios")))]
pub use winit_pump::{WindowConfig, WinitPump};
