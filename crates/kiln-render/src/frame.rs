// SPDX-License-Identifier: CEPL-1.0
use kiln_core::DeviceError;
use tracing::{info, warn};

use crate::{GpuDevice, RenderSize, ResourceState, ScissorRect, Viewport};

/// `DirectX::Colors::LightSteelBlue`.
pub const LIGHT_STEEL_BLUE: [f32; 4] = [0.690_196_1, 0.768_627_5, 0.870_588_3, 1.0];

/// Records, submits and presents one cleared frame per call, then waits for
/// the GPU to go idle.
///
/// Owns the only command allocator/list pair and the back-buffer index, so
/// nothing else may touch them. The full drain at the end of every frame is
/// what makes the allocator reset at the start of the next one legal.
pub struct FrameRenderer<D: GpuDevice> {
    device: D,
    back_buffer: usize,
    buffer_states: Vec<ResourceState>,
    fence: u64,
    size: RenderSize,
    viewport: Viewport,
    scissor: ScissorRect,
    clear_color: [f32; 4],
    frames: u64,
}

impl<D: GpuDevice> FrameRenderer<D> {
    /// The device's back buffers must all be in `PRESENT` state.
    pub fn new(device: D, size: RenderSize) -> Self {
        let size = clamp_size(size);
        let buffer_states = vec![ResourceState::Present; device.buffer_count()];
        Self {
            device,
            back_buffer: 0,
            buffer_states,
            fence: 0,
            size,
            viewport: Viewport::full(size),
            scissor: ScissorRect::full(size),
            clear_color: LIGHT_STEEL_BLUE,
            frames: 0,
        }
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn back_buffer_index(&self) -> usize {
        self.back_buffer
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_states.len()
    }

    /// Tracked state of back buffer `index`.
    pub fn buffer_state(&self, index: usize) -> ResourceState {
        self.buffer_states[index]
    }

    /// Last value the queue was asked to signal.
    pub fn fence_value(&self) -> u64 {
        self.fence
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    // STRICT PER-FRAME ORDER, every step is load-bearing:
    // reset allocator, reset list, PRESENT -> RENDER_TARGET, viewport/scissor,
    // clears, bind targets, RENDER_TARGET -> PRESENT, close, submit, present,
    // advance index, drain.
    pub fn render_frame(&mut self) -> Result<(), DeviceError> {
        let bb = self.back_buffer;

        // 1) Safe only because the previous frame drained the queue.
        self.device.reset_allocator()?;
        self.device.reset_command_list()?;

        self.transition(bb, ResourceState::Present, ResourceState::RenderTarget);

        // Viewport and scissor do not survive a list reset.
        self.device.set_viewport(&self.viewport, &self.scissor);

        self.device.clear_render_target(bb, self.clear_color);
        self.device.clear_depth_stencil(1.0, 0);
        self.device.set_render_targets(bb);

        self.transition(bb, ResourceState::RenderTarget, ResourceState::Present);

        // 2) Submit
        self.device.close_command_list()?;
        self.device.execute_command_list()?;

        // 3) Present, no vsync and no tearing flag
        self.device.present(0)?;
        self.back_buffer = (bb + 1) % self.buffer_states.len();

        // 4) Drain
        self.flush()?;

        self.frames += 1;
        Ok(())
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn flush(&mut self) -> Result<(), DeviceError> {
        self.fence += 1;
        self.device.signal(self.fence)?;

        if self.device.completed_value() < self.fence {
            self.device.wait_for(self.fence)?;
        }
        Ok(())
    }

    /// Recreates the swap-chain buffers for a new client size.
    pub fn resize(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        let size = clamp_size(size);

        // Nothing may reference the old buffers.
        self.flush()?;
        self.device.resize_buffers(size)?;
        self.flush()?;

        self.back_buffer = 0;
        self.buffer_states.fill(ResourceState::Present);

        self.size = size;
        self.viewport = Viewport::full(size);
        self.scissor = ScissorRect::full(size);

        info!("resize → {}x{}", size.width, size.height);
        Ok(())
    }

    fn transition(&mut self, index: usize, before: ResourceState, after: ResourceState) {
        debug_assert_eq!(
            self.buffer_states[index], before,
            "back buffer {index} is not in {before:?}"
        );
        self.device.transition_back_buffer(index, before, after);
        self.buffer_states[index] = after;
    }
}

impl<D: GpuDevice> Drop for FrameRenderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("final drain failed: {e}");
        }
    }
}

fn clamp_size(size: RenderSize) -> RenderSize {
    RenderSize {
        width: size.width.max(1),
        height: size.height.max(1),
    }
}
