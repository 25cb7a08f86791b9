// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod stats;
pub mod timer;

pub use error::{hresult, DeviceError, NativeError};
pub use stats::{FrameRate, FrameStats};
pub use timer::Timer;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
