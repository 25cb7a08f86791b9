// SPDX-License-Identifier: CEPL-1.0
//! Fatal GPU-call failures.
//!
//! Every failing native graphics call is wrapped into a [`DeviceError`] that
//! remembers which call failed, where it was made from, and the native error
//! code. None of these are retried; they travel up to the entry point.

use std::fmt;

use thiserror::Error;

/// Native result codes the backends report. Values are HRESULTs as `i32`.
pub mod hresult {
    pub const S_OK: i32 = 0;
    pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;
    pub const E_INVALIDARG: i32 = 0x8007_0057_u32 as i32;
    pub const DXGI_ERROR_INVALID_CALL: i32 = 0x887A_0001_u32 as i32;
    pub const DXGI_ERROR_DEVICE_REMOVED: i32 = 0x887A_0005_u32 as i32;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct DeviceError {
    pub operation: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub code: i32,
    pub message: String,
}

impl DeviceError {
    pub fn new(operation: &'static str, file: &'static str, line: u32, code: i32) -> Self {
        Self {
            operation,
            file,
            line,
            code,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed in {}; line {}; error: 0x{:08X}",
            self.operation, self.file, self.line, self.code as u32
        )?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message.trim_end())?;
        }
        Ok(())
    }
}

/// A native error type that carries an HRESULT-style code.
pub trait NativeError {
    fn native_code(&self) -> i32;

    fn native_message(&self) -> String {
        String::new()
    }
}

/// Evaluates a fallible native call and turns its error into a [`DeviceError`]
/// tagged with the call text (or an explicit operation name) and source
/// location.
///
/// ```ignore
/// let queue = check_hr!(device.CreateCommandQueue(&desc))?;
/// check_hr!("IDXGISwapChain::Present", swap_chain.Present(0, DXGI_PRESENT(0)).ok())?;
/// ```
#[macro_export]
macro_rules! check_hr {
    ($op:literal, $call:expr) => {
        ($call).map_err(|e| {
            let code = $crate::NativeError::native_code(&e);
            let message = $crate::NativeError::native_message(&e);
            $crate::DeviceError::new($op, file!(), line!(), code).with_message(message)
        })
    };
    ($call:expr) => {
        ($call).map_err(|e| {
            let code = $crate::NativeError::native_code(&e);
            let message = $crate::NativeError::native_message(&e);
            $crate::DeviceError::new(stringify!($call), file!(), line!(), code).with_message(message)
        })
    };
}

#[cfg(windows)]
impl NativeError for windows_core::Error {
    fn native_code(&self) -> i32 {
        self.code().0
    }

    fn native_message(&self) -> String {
        self.message().to_string()
    }
}
