// SPDX-License-Identifier: CEPL-1.0
use kiln_core::DeviceError;

mod frame;
pub mod headless;

pub use frame::{FrameRenderer, LIGHT_STEEL_BLUE};
pub use headless::HeadlessDevice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(size: RenderSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width as f32,
            height: size.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn full(size: RenderSize) -> Self {
        Self {
            left: 0,
            top: 0,
            right: size.width as i32,
            bottom: size.height as i32,
        }
    }
}

/// Usage state of a swap-chain back buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
}

/// What the frame renderer needs from a graphics device, its direct queue,
/// one command allocator, one command list and a swap chain.
///
/// Recording calls (`transition_back_buffer` through `set_render_targets`)
/// only append to the open command list and cannot fail on their own; bad
/// recordings surface from `close_command_list` or later.
pub trait GpuDevice {
    fn buffer_count(&self) -> usize;

    /// Only legal once the GPU finished every list recorded from it.
    fn reset_allocator(&mut self) -> Result<(), DeviceError>;
    /// Reopens the command list against the allocator, no pipeline state.
    fn reset_command_list(&mut self) -> Result<(), DeviceError>;

    fn transition_back_buffer(&mut self, index: usize, before: ResourceState, after: ResourceState);
    fn set_viewport(&mut self, viewport: &Viewport, scissor: &ScissorRect);
    fn clear_render_target(&mut self, index: usize, rgba: [f32; 4]);
    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8);
    fn set_render_targets(&mut self, index: usize);

    fn close_command_list(&mut self) -> Result<(), DeviceError>;
    fn execute_command_list(&mut self) -> Result<(), DeviceError>;
    fn present(&mut self, sync_interval: u32) -> Result<(), DeviceError>;

    /// Queues a fence signal to `value` behind all submitted work.
    fn signal(&mut self, value: u64) -> Result<(), DeviceError>;
    fn completed_value(&self) -> u64;
    /// Blocks until the fence reaches `value`. No timeout.
    fn wait_for(&mut self, value: u64) -> Result<(), DeviceError>;

    /// Resizes the swap chain and recreates the views and depth buffer. The
    /// queue must be idle.
    fn resize_buffers(&mut self, size: RenderSize) -> Result<(), DeviceError>;
}

