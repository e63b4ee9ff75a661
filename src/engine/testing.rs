//! ### English
//! Test doubles: an instrumented GPU device, a compositor, a playback engine, a texture
//! registrar and a method sink.
//!
//! ### 中文
//! 测试替身：插桩 GPU 设备、合成器、播放引擎、纹理注册器以及方法通道。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicIsize, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dpi::PhysicalSize;
use parking_lot::Mutex;

use super::dimensions::VideoParams;
use super::engine_api::{
    GetProcAddress, MethodSink, PlaybackEngine, RenderApi, RenderContext, RenderTarget,
    TextureKind, TextureRegistrar, UpdateCallback,
};
use super::error::{BridgeError, Result};
use super::rendering::device::{GpuBufferObjects, GpuDevice, GpuDeviceFactory};
use super::rendering::texture::{CompositorGpu, PixelBufferView, PopulatedTexture, VideoTexture};

pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub(crate) const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeviceEvent {
    Created,
    CreateBuffer { texture: u32, share_handle: u64 },
    Fence(u64),
    DeleteFence(u64),
    DestroyShareHandle(u64),
    DeleteObjects { texture: u32 },
    Destroyed,
}

/// Event log shared by every [`CountingDevice`] a factory creates.
pub(crate) struct DeviceLog {
    events: Mutex<Vec<DeviceEvent>>,
    /// Allocations left before `create_buffer` starts failing.
    allocation_budget: AtomicUsize,
    next_name: AtomicU32,
}

impl DeviceLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            allocation_budget: AtomicUsize::new(usize::MAX),
            next_name: AtomicU32::new(1),
        })
    }

    pub(crate) fn limit_allocations(&self, remaining: usize) {
        self.allocation_budget.store(remaining, Ordering::SeqCst);
    }

    pub(crate) fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: DeviceEvent) {
        self.events.lock().push(event);
    }

    fn count(&self, matches: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| matches(event)).count()
    }

    pub(crate) fn buffers_created(&self) -> usize {
        self.count(|event| matches!(event, DeviceEvent::CreateBuffer { .. }))
    }

    pub(crate) fn live_textures(&self) -> usize {
        self.buffers_created() - self.count(|event| matches!(event, DeviceEvent::DeleteObjects { .. }))
    }

    pub(crate) fn live_share_handles(&self) -> usize {
        self.buffers_created() - self.count(|event| matches!(event, DeviceEvent::DestroyShareHandle(_)))
    }

    pub(crate) fn live_fences(&self) -> usize {
        self.count(|event| matches!(event, DeviceEvent::Fence(_)))
            - self.count(|event| matches!(event, DeviceEvent::DeleteFence(_)))
    }

    pub(crate) fn live_devices(&self) -> usize {
        self.count(|event| matches!(event, DeviceEvent::Created))
            - self.count(|event| matches!(event, DeviceEvent::Destroyed))
    }
}

/// [`GpuDevice`] that hands out fake names and records every call.
pub(crate) struct CountingDevice {
    log: Arc<DeviceLog>,
    destroyed: bool,
}

impl CountingDevice {
    pub(crate) fn new(log: Arc<DeviceLog>) -> Self {
        log.record(DeviceEvent::Created);
        Self { log, destroyed: false }
    }

    fn next_name(&self) -> u32 {
        self.log.next_name.fetch_add(1, Ordering::SeqCst)
    }
}

impl GpuDevice for CountingDevice {
    fn make_current(&mut self, _current: bool) -> Result<()> {
        if self.destroyed {
            return Err(BridgeError::ContextBind { code: 0x3002 });
        }
        Ok(())
    }

    fn create_buffer(&mut self, size: PhysicalSize<u32>) -> Result<GpuBufferObjects> {
        let budget = self.log.allocation_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(BridgeError::ResourceExhausted("test budget exhausted".to_string()));
        }
        if budget != usize::MAX {
            self.log.allocation_budget.store(budget - 1, Ordering::SeqCst);
        }
        let texture = self.next_name();
        let framebuffer = self.next_name();
        let share_handle = u64::from(self.next_name()) | 0x1000_0000;
        self.log.record(DeviceEvent::CreateBuffer { texture, share_handle });
        Ok(GpuBufferObjects {
            texture,
            framebuffer,
            share_handle,
            size,
        })
    }

    fn bind_buffer(&mut self, _buffer: &GpuBufferObjects) {}

    fn insert_fence(&mut self) -> u64 {
        let fence = u64::from(self.next_name());
        self.log.record(DeviceEvent::Fence(fence));
        fence
    }

    fn wait_and_delete_fence(&mut self, fence: u64) {
        if fence != 0 {
            self.log.record(DeviceEvent::DeleteFence(fence));
        }
    }

    fn destroy_share_handle(&mut self, share_handle: u64) {
        if share_handle != 0 {
            self.log.record(DeviceEvent::DestroyShareHandle(share_handle));
        }
    }

    fn delete_buffer_objects(&mut self, buffer: &GpuBufferObjects) {
        self.log.record(DeviceEvent::DeleteObjects {
            texture: buffer.texture,
        });
    }

    fn get_proc_address(&self) -> GetProcAddress {
        Arc::new(|_| std::ptr::null())
    }

    fn destroy(&mut self) {
        if !std::mem::replace(&mut self.destroyed, true) {
            self.log.record(DeviceEvent::Destroyed);
        }
    }
}

impl Drop for CountingDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub(crate) struct CountingDeviceFactory {
    pub(crate) log: Arc<DeviceLog>,
    pub(crate) fail: AtomicBool,
}

impl CountingDeviceFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            log: DeviceLog::new(),
            fail: AtomicBool::new(false),
        })
    }
}

impl GpuDeviceFactory for CountingDeviceFactory {
    fn create_device(&self) -> Result<Box<dyn GpuDevice>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::HardwareUnavailable("test device disabled".to_string()));
        }
        Ok(Box::new(CountingDevice::new(Arc::clone(&self.log))))
    }
}

/// [`CompositorGpu`] that names imported textures after their share handle.
#[derive(Default)]
pub(crate) struct CountingCompositor {
    live: AtomicIsize,
    next_name: AtomicU32,
    pub(crate) waited_fences: Mutex<Vec<u64>>,
    pub(crate) imported_handles: Mutex<Vec<u64>>,
    /// Compositor texture name -> share handle it was imported from.
    imports: Mutex<HashMap<u32, u64>>,
    pub(crate) fail_imports: AtomicBool,
}

impl CountingCompositor {
    pub(crate) fn live_textures(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn share_handle_of(&self, name: u32) -> Option<u64> {
        self.imports.lock().get(&name).copied()
    }

    fn allocate(&self) -> u32 {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.next_name.fetch_add(1, Ordering::SeqCst) + 100
    }
}

impl CompositorGpu for CountingCompositor {
    fn wait_fence(&self, fence: u64) {
        if fence != 0 {
            self.waited_fences.lock().push(fence);
        }
    }

    fn import_share_handle(&self, share_handle: u64) -> Result<u32> {
        if self.fail_imports.load(Ordering::SeqCst) {
            return Err(BridgeError::ResourceExhausted("import disabled".to_string()));
        }
        self.imported_handles.lock().push(share_handle);
        let name = self.allocate();
        self.imports.lock().insert(name, share_handle);
        Ok(name)
    }

    fn delete_texture(&self, _texture: u32) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn create_placeholder(&self) -> Result<u32> {
        Ok(self.allocate())
    }
}

/// One fake player instance: its video size, callback and render history.
#[derive(Default)]
pub(crate) struct MockPlayer {
    params: Mutex<Option<VideoParams>>,
    callback: Mutex<Option<UpdateCallback>>,
    renders: Mutex<Vec<PhysicalSize<u32>>>,
    apis: Mutex<Vec<&'static str>>,
    frames: AtomicU32,
    pub(crate) swaps: AtomicUsize,
    pub(crate) live_contexts: AtomicIsize,
    pub(crate) reject_opengl: AtomicBool,
}

impl MockPlayer {
    pub(crate) fn set_video_size(&self, width: i64, height: i64) {
        *self.params.lock() = Some(VideoParams {
            dw: width,
            dh: height,
            rotate: 0,
        });
    }

    /// Simulates the engine decoding a new frame.
    pub(crate) fn fire_update(&self) -> bool {
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    pub(crate) fn renders(&self) -> Vec<PhysicalSize<u32>> {
        self.renders.lock().clone()
    }

    pub(crate) fn apis(&self) -> Vec<&'static str> {
        self.apis.lock().clone()
    }
}

pub(crate) struct MockRenderContext {
    player: Arc<MockPlayer>,
}

impl RenderContext for MockRenderContext {
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>) {
        *self.player.callback.lock() = callback;
    }

    fn render(&mut self, target: RenderTarget<'_>) -> Result<()> {
        let frame = self.player.frames.fetch_add(1, Ordering::SeqCst) + 1;
        let size = match target {
            RenderTarget::Framebuffer { size, .. } => size,
            RenderTarget::Software { size, pixels, .. } => {
                // Stamp the frame number into the first pixel.
                pixels[..4].copy_from_slice(&frame.to_le_bytes());
                size
            }
        };
        self.player.renders.lock().push(size);
        Ok(())
    }

    fn report_swap(&mut self) {
        self.player.swaps.fetch_add(1, Ordering::SeqCst);
    }

    fn video_params(&self) -> Option<VideoParams> {
        *self.player.params.lock()
    }
}

impl Drop for MockRenderContext {
    fn drop(&mut self) {
        self.player.live_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct MockEngine {
    players: Mutex<HashMap<i64, Arc<MockPlayer>>>,
}

impl MockEngine {
    pub(crate) fn player(&self, handle: i64) -> Arc<MockPlayer> {
        Arc::clone(self.players.lock().entry(handle).or_default())
    }
}

impl PlaybackEngine for MockEngine {
    fn create_render_context(&self, handle: i64, api: RenderApi) -> Result<Box<dyn RenderContext>> {
        let player = self.player(handle);
        let name = match api {
            RenderApi::OpenGl { .. } if player.reject_opengl.load(Ordering::SeqCst) => {
                return Err(BridgeError::Engine("OpenGL render API rejected".to_string()));
            }
            RenderApi::OpenGl { .. } => "opengl",
            RenderApi::Software => "sw",
        };
        player.apis.lock().push(name);
        player.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRenderContext { player }))
    }
}

/// Host registrar double. Unregistering releases compositor objects and completes at once
/// unless `hold_unregister` is set, in which case the completion is parked and never runs.
#[derive(Default)]
pub(crate) struct MockRegistrar {
    next_id: AtomicI64,
    textures: Mutex<HashMap<i64, Arc<VideoTexture>>>,
    frames_marked: Mutex<HashMap<i64, usize>>,
    unregistered: Mutex<Vec<i64>>,
    parked: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    pub(crate) compositor: CountingCompositor,
    pub(crate) hold_unregister: AtomicBool,
}

impl MockRegistrar {
    pub(crate) fn texture(&self, id: i64) -> Option<Arc<VideoTexture>> {
        self.textures.lock().get(&id).cloned()
    }

    pub(crate) fn registered(&self) -> usize {
        self.textures.lock().len()
    }

    pub(crate) fn frames_marked(&self, id: i64) -> usize {
        self.frames_marked.lock().get(&id).copied().unwrap_or(0)
    }

    pub(crate) fn unregistered(&self) -> Vec<i64> {
        self.unregistered.lock().clone()
    }

    pub(crate) fn populate(&self, id: i64) -> Option<PopulatedTexture> {
        self.texture(id).map(|texture| texture.populate(&self.compositor))
    }

    pub(crate) fn copy_pixels(&self, id: i64) -> Option<PixelBufferView> {
        self.texture(id).map(|texture| texture.copy_pixels())
    }
}

impl TextureRegistrar for MockRegistrar {
    fn register_texture(&self, _kind: TextureKind, texture: Arc<VideoTexture>) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.textures.lock().insert(id, texture);
        Ok(id)
    }

    fn unregister_texture(&self, id: i64, on_done: Box<dyn FnOnce() + Send>) {
        if let Some(texture) = self.textures.lock().remove(&id) {
            texture.release_compositor_objects(&self.compositor);
        }
        self.unregistered.lock().push(id);
        if self.hold_unregister.load(Ordering::SeqCst) {
            self.parked.lock().push(on_done);
        } else {
            on_done();
        }
    }

    fn mark_frame_available(&self, id: i64) {
        *self.frames_marked.lock().entry(id).or_default() += 1;
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingSink {
    pub(crate) fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().clone()
    }
}

impl MethodSink for RecordingSink {
    fn invoke(&self, method: &str, payload: serde_json::Value) {
        self.calls.lock().push((method.to_string(), payload));
    }
}
