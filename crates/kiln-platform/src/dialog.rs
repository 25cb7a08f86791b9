// SPDX-License-Identifier: CEPL-1.0
use tracing::error;

/// Reports a fatal error to the user. Blocks on a modal message box on
/// Windows; elsewhere the error log is all there is.
pub fn show_fatal_error(text: &str) {
    error!("{text}");

    #[cfg(windows)]
    {
        use windows::core::{w, HSTRING};
        use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_OK};

        // SAFETY: both strings outlive the call; no owner window.
        unsafe {
            MessageBoxW(None, &HSTRING::from(text), w!("HR Failed"), MB_OK);
        }
    }
}
