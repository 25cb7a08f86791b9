// SPDX-License-Identifier: CEPL-1.0
use kiln_core::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("another application instance is already running")]
    AlreadyRunning,
    #[error("event loop: {0}")]
    EventLoop(String),
    #[error("window creation: {0}")]
    WindowCreation(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
}
