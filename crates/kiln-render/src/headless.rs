// SPDX-License-Identifier: CEPL-1.0
//! A simulated device with no GPU behind it.
//!
//! It holds the same rules a D3D12 driver with the debug layer enabled would
//! enforce, and keeps a log of every call. The simulated GPU finishes
//! submitted work only when somebody waits on the fence, so any code that
//! forgets to drain before reusing the allocator gets an error.

use kiln_core::{hresult, DeviceError};

use crate::{GpuDevice, RenderSize, ResourceState, ScissorRect, Viewport};

/// DXGI refuses flip-model swap chains outside this range.
const MIN_BUFFERS: usize = 2;
const MAX_BUFFERS: usize = 16;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    ResetAllocator,
    ResetCommandList,
    Barrier {
        buffer: usize,
        before: ResourceState,
        after: ResourceState,
    },
    SetViewport(Viewport, ScissorRect),
    ClearRenderTarget { buffer: usize, rgba: [f32; 4] },
    ClearDepthStencil { depth: f32, stencil: u8 },
    SetRenderTargets { buffer: usize },
    Close,
    Execute,
    Present { buffer: usize, sync_interval: u32 },
    Signal(u64),
    Wait(u64),
    ResizeBuffers(RenderSize),
}

/// Operations that can be made to fail once on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    ResetAllocator,
    Close,
    Execute,
    Present,
    Signal,
    ResizeBuffers,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    size: RenderSize,
    states: Vec<ResourceState>,
    next_present: usize,
    bound_target: Option<usize>,
    presented: u64,

    list_open: bool,
    validation: Option<String>,

    unsignaled_work: bool,
    allocator_busy_until: Option<u64>,
    signaled: u64,
    completed: u64,

    fault: Option<Fault>,
    calls: Vec<Call>,
}

impl HeadlessDevice {
    pub fn new(buffer_count: usize, size: RenderSize) -> Result<Self, DeviceError> {
        if !(MIN_BUFFERS..=MAX_BUFFERS).contains(&buffer_count) {
            return Err(fail("CreateSwapChain", hresult::DXGI_ERROR_INVALID_CALL)
                .with_message(format!("{buffer_count} back buffers requested")));
        }
        Ok(Self {
            size,
            states: vec![ResourceState::Present; buffer_count],
            next_present: 0,
            bound_target: None,
            presented: 0,
            list_open: false,
            validation: None,
            unsignaled_work: false,
            allocator_busy_until: None,
            signaled: 0,
            completed: 0,
            fault: None,
            calls: Vec::new(),
        })
    }

    /// The next call of kind `fault` fails with `E_FAIL`.
    pub fn inject_fault(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Index of the buffer the presentation engine will show next.
    pub fn next_present_index(&self) -> usize {
        self.next_present
    }

    pub fn buffer_state(&self, index: usize) -> ResourceState {
        self.states[index]
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    /// True when nothing submitted is still running on the simulated GPU.
    pub fn is_idle(&self) -> bool {
        !self.unsignaled_work && self.completed >= self.signaled
    }

    fn take_fault(&mut self, fault: Fault, operation: &'static str) -> Result<(), DeviceError> {
        if self.fault == Some(fault) {
            self.fault = None;
            return Err(fail(operation, hresult::E_FAIL).with_message("injected fault"));
        }
        Ok(())
    }

    fn invalid(&mut self, what: String) {
        if self.validation.is_none() {
            self.validation = Some(what);
        }
    }

    fn require_open(&mut self, operation: &str) {
        if !self.list_open {
            self.invalid(format!("{operation} recorded on a closed command list"));
        }
    }

    fn require_render_target(&mut self, index: usize, operation: &str) {
        if self.states.get(index) != Some(&ResourceState::RenderTarget) {
            self.invalid(format!(
                "{operation} on back buffer {index} which is not in RENDER_TARGET"
            ));
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn buffer_count(&self) -> usize {
        self.states.len()
    }

    fn reset_allocator(&mut self) -> Result<(), DeviceError> {
        self.calls.push(Call::ResetAllocator);
        self.take_fault(Fault::ResetAllocator, "ID3D12CommandAllocator::Reset")?;

        let busy = self.unsignaled_work
            || self
                .allocator_busy_until
                .is_some_and(|value| self.completed < value);
        if busy || self.list_open {
            return Err(fail("ID3D12CommandAllocator::Reset", hresult::E_FAIL)
                .with_message("allocator still referenced by in-flight or open command lists"));
        }
        self.allocator_busy_until = None;
        Ok(())
    }

    fn reset_command_list(&mut self) -> Result<(), DeviceError> {
        self.calls.push(Call::ResetCommandList);
        if self.list_open {
            return Err(fail("ID3D12GraphicsCommandList::Reset", hresult::E_FAIL)
                .with_message("command list was not closed"));
        }
        self.list_open = true;
        self.validation = None;
        self.bound_target = None;
        Ok(())
    }

    fn transition_back_buffer(&mut self, index: usize, before: ResourceState, after: ResourceState) {
        self.calls.push(Call::Barrier {
            buffer: index,
            before,
            after,
        });
        self.require_open("ResourceBarrier");
        match self.states.get(index).copied() {
            Some(current) if current == before => self.states[index] = after,
            Some(current) => self.invalid(format!(
                "barrier on back buffer {index} expects {before:?} but it is {current:?}"
            )),
            None => self.invalid(format!("barrier on missing back buffer {index}")),
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport, scissor: &ScissorRect) {
        self.calls.push(Call::SetViewport(*viewport, *scissor));
        self.require_open("RSSetViewports");
    }

    fn clear_render_target(&mut self, index: usize, rgba: [f32; 4]) {
        self.calls.push(Call::ClearRenderTarget {
            buffer: index,
            rgba,
        });
        self.require_open("ClearRenderTargetView");
        self.require_render_target(index, "ClearRenderTargetView");
    }

    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
        self.calls.push(Call::ClearDepthStencil { depth, stencil });
        self.require_open("ClearDepthStencilView");
    }

    fn set_render_targets(&mut self, index: usize) {
        self.calls.push(Call::SetRenderTargets { buffer: index });
        self.require_open("OMSetRenderTargets");
        self.require_render_target(index, "OMSetRenderTargets");
        self.bound_target = Some(index);
    }

    fn close_command_list(&mut self) -> Result<(), DeviceError> {
        self.calls.push(Call::Close);
        self.take_fault(Fault::Close, "ID3D12GraphicsCommandList::Close")?;

        if !self.list_open {
            return Err(fail("ID3D12GraphicsCommandList::Close", hresult::E_FAIL)
                .with_message("command list is already closed"));
        }
        self.list_open = false;

        match self.validation.take() {
            Some(what) => Err(fail("ID3D12GraphicsCommandList::Close", hresult::E_INVALIDARG)
                .with_message(what)),
            None => Ok(()),
        }
    }

    fn execute_command_list(&mut self) -> Result<(), DeviceError> {
        self.calls.push(Call::Execute);
        self.take_fault(Fault::Execute, "ID3D12CommandQueue::ExecuteCommandLists")?;

        if self.list_open {
            return Err(fail(
                "ID3D12CommandQueue::ExecuteCommandLists",
                hresult::DXGI_ERROR_DEVICE_REMOVED,
            )
            .with_message("submitted an open command list"));
        }
        self.unsignaled_work = true;
        Ok(())
    }

    fn present(&mut self, sync_interval: u32) -> Result<(), DeviceError> {
        let buffer = self.next_present;
        self.calls.push(Call::Present {
            buffer,
            sync_interval,
        });
        self.take_fault(Fault::Present, "IDXGISwapChain::Present")?;

        if self.states[buffer] != ResourceState::Present {
            return Err(fail("IDXGISwapChain::Present", hresult::DXGI_ERROR_INVALID_CALL)
                .with_message(format!("back buffer {buffer} is not in PRESENT")));
        }
        if let Some(rendered) = self.bound_target {
            if rendered != buffer {
                return Err(fail("IDXGISwapChain::Present", hresult::DXGI_ERROR_INVALID_CALL)
                    .with_message(format!(
                        "rendered into back buffer {rendered} but buffer {buffer} is presented"
                    )));
            }
        }

        self.bound_target = None;
        self.next_present = (self.next_present + 1) % self.states.len();
        self.presented += 1;
        Ok(())
    }

    fn signal(&mut self, value: u64) -> Result<(), DeviceError> {
        self.calls.push(Call::Signal(value));
        self.take_fault(Fault::Signal, "ID3D12CommandQueue::Signal")?;

        if self.unsignaled_work {
            self.unsignaled_work = false;
            self.allocator_busy_until = Some(value);
        }
        self.signaled = self.signaled.max(value);
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        self.completed
    }

    fn wait_for(&mut self, value: u64) -> Result<(), DeviceError> {
        self.calls.push(Call::Wait(value));
        if value > self.signaled {
            // A real queue would block forever here.
            return Err(fail("ID3D12Fence::SetEventOnCompletion", hresult::E_FAIL)
                .with_message(format!("fence value {value} is never signaled")));
        }
        self.completed = self.completed.max(value);
        Ok(())
    }

    fn resize_buffers(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        self.calls.push(Call::ResizeBuffers(size));
        self.take_fault(Fault::ResizeBuffers, "IDXGISwapChain::ResizeBuffers")?;

        if !self.is_idle() || self.list_open {
            return Err(fail("IDXGISwapChain::ResizeBuffers", hresult::DXGI_ERROR_INVALID_CALL)
                .with_message("back buffers are still referenced by GPU work"));
        }
        self.states.fill(ResourceState::Present);
        self.next_present = 0;
        self.size = size;
        Ok(())
    }
}

fn fail(operation: &'static str, code: i32) -> DeviceError {
    DeviceError::new(operation, file!(), line!(), code)
}
