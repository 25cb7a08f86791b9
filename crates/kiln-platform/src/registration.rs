// SPDX-License-Identifier: CEPL-1.0
use std::sync::atomic::{AtomicBool, Ordering};

use crate::PlatformError;

static LIVE: AtomicBool = AtomicBool::new(false);

/// Proof that this is the only live application instance in the process.
/// Released on drop.
#[derive(Debug)]
pub struct AppRegistration {
    _private: (),
}

impl AppRegistration {
    pub fn acquire() -> Result<Self, PlatformError> {
        LIVE.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PlatformError::AlreadyRunning)?;
        Ok(Self { _private: () })
    }

    pub fn is_live() -> bool {
        LIVE.load(Ordering::Acquire)
    }
}

impl Drop for AppRegistration {
    fn drop(&mut self) {
        LIVE.store(false, Ordering::Release);
    }
}
