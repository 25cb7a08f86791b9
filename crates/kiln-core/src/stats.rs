// SPDX-License-Identifier: CEPL-1.0
/// Frames-per-second snapshot published once per second of timer time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate {
    pub fps: f32,
    pub mspf: f32,
}

impl FrameRate {
    pub fn caption(&self, base: &str) -> String {
        format!("{base}    fps: {:.0}   mspf: {:.6}", self.fps, self.mspf)
    }
}

/// Counts frames and averages them over one-second windows.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    frames: u32,
    window_start: f32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one frame at `total_time` seconds. Returns a rate when a full
    /// second has passed since the last one.
    pub fn record_frame(&mut self, total_time: f32) -> Option<FrameRate> {
        self.frames += 1;

        let elapsed = total_time - self.window_start;
        if elapsed < 1.0 {
            return None;
        }

        let fps = self.frames as f32 / elapsed;
        let rate = FrameRate {
            fps,
            mspf: 1000.0 / fps,
        };

        self.frames = 0;
        self.window_start += 1.0;
        Some(rate)
    }
}
