// SPDX-License-Identifier: CEPL-1.0
//! Direct3D 12 implementation of [`GpuDevice`]: one direct queue, one command
//! allocator and list, a flip-discard swap chain plus a D24S8 depth buffer.
#![cfg(windows)]
#![deny(unsafe_op_in_unsafe_fn)]

use std::mem::ManuallyDrop;

use kiln_core::{check_hr, hresult, DeviceError};
use kiln_render::{GpuDevice, RenderSize, ResourceState, ScissorRect, Viewport};
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use tracing::{debug, info, warn};

use windows::core::{w, Interface, HSTRING, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, HWND, RECT, WAIT_EVENT, WAIT_FAILED};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

const BACK_BUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;
const DEPTH_STENCIL_FORMAT: DXGI_FORMAT = DXGI_FORMAT_D24_UNORM_S8_UINT;

#[derive(Clone, Debug)]
pub struct D3d12Config {
    pub buffer_count: usize,
    /// Enables the D3D12 debug layer and a debug DXGI factory.
    pub debug_layer: bool,
    /// Skips hardware adapters and goes straight to WARP.
    pub use_warp: bool,
}

impl Default for D3d12Config {
    fn default() -> Self {
        Self {
            buffer_count: 2,
            debug_layer: cfg!(debug_assertions),
            use_warp: false,
        }
    }
}

pub struct D3d12Device {
    swap_chain: IDXGISwapChain1,
    back_buffers: Vec<ID3D12Resource>,
    depth_stencil: Option<ID3D12Resource>,
    rtv_heap: ID3D12DescriptorHeap,
    dsv_heap: ID3D12DescriptorHeap,
    rtv_size: usize,

    list: ID3D12GraphicsCommandList,
    allocator: ID3D12CommandAllocator,
    queue: ID3D12CommandQueue,
    fence: ID3D12Fence,
    fence_event: HANDLE,

    device: ID3D12Device,
    _factory: IDXGIFactory4,

    buffer_count: usize,
    adapter: String,
}

impl Drop for D3d12Device {
    fn drop(&mut self) {
        // SAFETY: the event was created in `new` and is closed exactly once.
        unsafe {
            let _ = CloseHandle(self.fence_event);
        }
    }
}

fn hwnd_of(window: &dyn HasWindowHandle) -> Result<HWND, DeviceError> {
    let invalid = || DeviceError::new("HasWindowHandle::window_handle", file!(), line!(), hresult::E_INVALIDARG);
    let handle = window.window_handle().map_err(|e| invalid().with_message(e.to_string()))?;
    match handle.as_raw() {
        RawWindowHandle::Win32(h) => Ok(HWND(h.hwnd.get() as *mut _)),
        other => Err(invalid().with_message(format!("not a Win32 window: {other:?}"))),
    }
}

fn wide_name(raw: &[u16]) -> String {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..end])
}

fn d3d_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            // Borrowed pointer; ManuallyDrop keeps the barrier from releasing it.
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                StateBefore: before,
                StateAfter: after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}

fn wait_status(status: WAIT_EVENT) -> Result<(), DeviceError> {
    if status != WAIT_FAILED {
        return Ok(());
    }
    // SAFETY: reads the calling thread's last-error slot.
    let code = match unsafe { GetLastError() }.to_hresult().0 {
        0 => hresult::E_FAIL,
        code => code,
    };
    Err(DeviceError::new("WaitForSingleObject", file!(), line!(), code))
}

fn create_factory(debug_layer: bool) -> Result<IDXGIFactory4, DeviceError> {
    let mut flags = DXGI_CREATE_FACTORY_FLAGS(0);
    if debug_layer {
        let mut debug: Option<ID3D12Debug> = None;
        // SAFETY: plain out-parameter COM call.
        match unsafe { D3D12GetDebugInterface(&mut debug) }.ok().and(debug) {
            Some(debug) => {
                unsafe { debug.EnableDebugLayer() };
                flags |= DXGI_CREATE_FACTORY_DEBUG;
                info!("D3D12 debug layer enabled");
            }
            None => warn!("D3D12 debug layer unavailable"),
        }
    }
    unsafe { check_hr!("CreateDXGIFactory2", CreateDXGIFactory2(flags)) }
}

fn log_adapters(factory: &IDXGIFactory4) {
    for i in 0u32.. {
        let Ok(adapter) = (unsafe { factory.EnumAdapters1(i) }) else {
            break;
        };
        let Ok(desc) = (unsafe { adapter.GetDesc1() }) else {
            continue;
        };
        debug!("adapter {i}: {}", wide_name(&desc.Description));

        for j in 0u32.. {
            let Ok(output) = (unsafe { adapter.EnumOutputs(j) }) else {
                break;
            };
            if let Ok(out) = unsafe { output.GetDesc() } {
                debug!("  output {j}: {}", wide_name(&out.DeviceName));
            }
        }
    }
}

/// First hardware adapter that can host a feature level 11.0 device, or WARP.
fn create_device(factory: &IDXGIFactory4, use_warp: bool) -> Result<(ID3D12Device, String), DeviceError> {
    if !use_warp {
        for i in 0u32.. {
            let Ok(adapter) = (unsafe { factory.EnumAdapters1(i) }) else {
                break;
            };
            let Ok(desc) = (unsafe { adapter.GetDesc1() }) else {
                continue;
            };
            if (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE) != DXGI_ADAPTER_FLAG_NONE {
                continue;
            }

            let mut device: Option<ID3D12Device> = None;
            if unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }.is_ok() {
                if let Some(device) = device {
                    return Ok((device, wide_name(&desc.Description)));
                }
            }
        }
        warn!("no hardware adapter can create a D3D12 device → WARP");
    }

    let adapter: IDXGIAdapter = unsafe { check_hr!("IDXGIFactory4::EnumWarpAdapter", factory.EnumWarpAdapter())? };
    let mut device: Option<ID3D12Device> = None;
    unsafe {
        check_hr!(
            "D3D12CreateDevice",
            D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)
        )?;
    }
    let device = device.ok_or_else(|| DeviceError::new("D3D12CreateDevice", file!(), line!(), hresult::E_FAIL))?;
    Ok((device, "WARP".to_owned()))
}

fn create_depth_stencil(device: &ID3D12Device, size: RenderSize) -> Result<ID3D12Resource, DeviceError> {
    let desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        Alignment: 0,
        Width: size.width as u64,
        Height: size.height,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DEPTH_STENCIL_FORMAT,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
    };
    let clear = D3D12_CLEAR_VALUE {
        Format: DEPTH_STENCIL_FORMAT,
        Anonymous: D3D12_CLEAR_VALUE_0 {
            DepthStencil: D3D12_DEPTH_STENCIL_VALUE { Depth: 1.0, Stencil: 0 },
        },
    };
    let heap = D3D12_HEAP_PROPERTIES {
        Type: D3D12_HEAP_TYPE_DEFAULT,
        ..Default::default()
    };

    let mut depth: Option<ID3D12Resource> = None;
    unsafe {
        check_hr!(
            "ID3D12Device::CreateCommittedResource",
            device.CreateCommittedResource(
                &heap,
                D3D12_HEAP_FLAG_NONE,
                &desc,
                D3D12_RESOURCE_STATE_DEPTH_WRITE,
                Some(&clear),
                &mut depth,
            )
        )?;
    }
    let depth = depth.ok_or_else(|| {
        DeviceError::new("ID3D12Device::CreateCommittedResource", file!(), line!(), hresult::E_FAIL)
    })?;
    let _ = unsafe { depth.SetName(w!("kiln depth stencil")) };
    Ok(depth)
}

impl D3d12Device {
    pub fn new(window: &dyn HasWindowHandle, size: RenderSize, cfg: &D3d12Config) -> Result<Self, DeviceError> {
        let hwnd = hwnd_of(window)?;
        let buffer_count = cfg.buffer_count;
        let size = RenderSize::new(size.width.max(1), size.height.max(1));

        let factory = create_factory(cfg.debug_layer)?;
        log_adapters(&factory);
        let (device, adapter) = create_device(&factory, cfg.use_warp)?;

        let mut this = unsafe {
            let fence: ID3D12Fence = check_hr!(
                "ID3D12Device::CreateFence",
                device.CreateFence(0, D3D12_FENCE_FLAG_NONE)
            )?;

            let queue: ID3D12CommandQueue = check_hr!(
                "ID3D12Device::CreateCommandQueue",
                device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                    Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                    Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                    ..Default::default()
                })
            )?;
            let allocator: ID3D12CommandAllocator = check_hr!(
                "ID3D12Device::CreateCommandAllocator",
                device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
            )?;
            let list: ID3D12GraphicsCommandList = check_hr!(
                "ID3D12Device::CreateCommandList",
                device.CreateCommandList(
                    0,
                    D3D12_COMMAND_LIST_TYPE_DIRECT,
                    &allocator,
                    None::<&ID3D12PipelineState>,
                )
            )?;
            // Created open; the first frame expects it closed.
            check_hr!("ID3D12GraphicsCommandList::Close", list.Close())?;

            let _ = queue.SetName(w!("kiln direct queue"));
            let _ = allocator.SetName(w!("kiln command allocator"));
            let _ = list.SetName(w!("kiln command list"));

            let desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: size.width,
                Height: size.height,
                Format: BACK_BUFFER_FORMAT,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: buffer_count as u32,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                ..Default::default()
            };
            let swap_chain: IDXGISwapChain1 = check_hr!(
                "IDXGIFactory2::CreateSwapChainForHwnd",
                factory.CreateSwapChainForHwnd(&queue, hwnd, &desc, None, None)
            )?;
            check_hr!(
                "IDXGIFactory::MakeWindowAssociation",
                factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)
            )?;

            let rtv_heap: ID3D12DescriptorHeap = check_hr!(
                "ID3D12Device::CreateDescriptorHeap",
                device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                    NumDescriptors: buffer_count as u32,
                    Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                    NodeMask: 0,
                })
            )?;
            let dsv_heap: ID3D12DescriptorHeap = check_hr!(
                "ID3D12Device::CreateDescriptorHeap",
                device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    Type: D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
                    NumDescriptors: 1,
                    Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                    NodeMask: 0,
                })
            )?;
            let rtv_size = device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) as usize;

            // Last, so an earlier failure cannot leak it.
            let fence_event = check_hr!("CreateEventW", CreateEventW(None, false, false, PCWSTR::null()))?;

            Self {
                swap_chain,
                back_buffers: Vec::with_capacity(buffer_count),
                depth_stencil: None,
                rtv_heap,
                dsv_heap,
                rtv_size,
                list,
                allocator,
                queue,
                fence,
                fence_event,
                device,
                _factory: factory,
                buffer_count,
                adapter,
            }
        };

        this.resize_buffers(size)?;

        info!(
            "D3D12 swap chain ready on {} ({}x{}, {} buffers)",
            this.adapter, size.width, size.height, buffer_count
        );
        Ok(this)
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter
    }

    fn rtv(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let start = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index * self.rtv_size,
        }
    }

    fn dsv(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        unsafe { self.dsv_heap.GetCPUDescriptorHandleForHeapStart() }
    }
}

impl GpuDevice for D3d12Device {
    fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn reset_allocator(&mut self) -> Result<(), DeviceError> {
        unsafe { check_hr!("ID3D12CommandAllocator::Reset", self.allocator.Reset()) }
    }

    fn reset_command_list(&mut self) -> Result<(), DeviceError> {
        unsafe {
            check_hr!(
                "ID3D12GraphicsCommandList::Reset",
                self.list.Reset(&self.allocator, None::<&ID3D12PipelineState>)
            )
        }
    }

    fn transition_back_buffer(&mut self, index: usize, before: ResourceState, after: ResourceState) {
        let barrier = transition_barrier(&self.back_buffers[index], d3d_state(before), d3d_state(after));
        unsafe { self.list.ResourceBarrier(&[barrier]) };
    }

    fn set_viewport(&mut self, viewport: &Viewport, scissor: &ScissorRect) {
        let vp = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        let rect = RECT {
            left: scissor.left,
            top: scissor.top,
            right: scissor.right,
            bottom: scissor.bottom,
        };
        unsafe {
            self.list.RSSetViewports(&[vp]);
            self.list.RSSetScissorRects(&[rect]);
        }
    }

    fn clear_render_target(&mut self, index: usize, rgba: [f32; 4]) {
        let rtv = self.rtv(index);
        unsafe { self.list.ClearRenderTargetView(rtv, &rgba, None) };
    }

    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
        let dsv = self.dsv();
        unsafe {
            self.list
                .ClearDepthStencilView(dsv, D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL, depth, stencil, None)
        };
    }

    fn set_render_targets(&mut self, index: usize) {
        let rtv = self.rtv(index);
        let dsv = self.dsv();
        unsafe { self.list.OMSetRenderTargets(1, Some(&rtv), true, Some(&dsv)) };
    }

    fn close_command_list(&mut self) -> Result<(), DeviceError> {
        unsafe { check_hr!("ID3D12GraphicsCommandList::Close", self.list.Close()) }
    }

    fn execute_command_list(&mut self) -> Result<(), DeviceError> {
        let list: ID3D12CommandList = check_hr!("ID3D12GraphicsCommandList::QueryInterface", self.list.cast())?;
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }

    fn present(&mut self, sync_interval: u32) -> Result<(), DeviceError> {
        unsafe {
            check_hr!(
                "IDXGISwapChain::Present",
                self.swap_chain.Present(sync_interval, DXGI_PRESENT::default()).ok()
            )
        }
    }

    fn signal(&mut self, value: u64) -> Result<(), DeviceError> {
        unsafe { check_hr!("ID3D12CommandQueue::Signal", self.queue.Signal(&self.fence, value)) }
    }

    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_for(&mut self, value: u64) -> Result<(), DeviceError> {
        unsafe {
            check_hr!(
                "ID3D12Fence::SetEventOnCompletion",
                self.fence.SetEventOnCompletion(value, self.fence_event)
            )?;
            wait_status(WaitForSingleObject(self.fence_event, INFINITE))
        }
    }

    fn resize_buffers(&mut self, size: RenderSize) -> Result<(), DeviceError> {
        // Every reference to the old buffers must go before ResizeBuffers.
        self.back_buffers.clear();
        self.depth_stencil = None;

        unsafe {
            check_hr!(
                "IDXGISwapChain::ResizeBuffers",
                self.swap_chain.ResizeBuffers(
                    self.buffer_count as u32,
                    size.width,
                    size.height,
                    BACK_BUFFER_FORMAT,
                    DXGI_SWAP_CHAIN_FLAG(0),
                )
            )?;

            for i in 0..self.buffer_count {
                let buffer: ID3D12Resource =
                    check_hr!("IDXGISwapChain::GetBuffer", self.swap_chain.GetBuffer(i as u32))?;
                self.device.CreateRenderTargetView(&buffer, None, self.rtv(i));
                let _ = buffer.SetName(&HSTRING::from(format!("kiln back buffer {i}")));
                self.back_buffers.push(buffer);
            }
        }

        let depth = create_depth_stencil(&self.device, size)?;
        let dsv_desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
            Format: DEPTH_STENCIL_FORMAT,
            ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
            Flags: D3D12_DSV_FLAG_NONE,
            Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
            },
        };

        unsafe {
            self.device.CreateDepthStencilView(&depth, Some(&dsv_desc), self.dsv());
        }

        self.depth_stencil = Some(depth);
        debug!("D3D12 buffers resized to {}x{}", size.width, size.height);
        Ok(())
    }
}
