//! ### English
//! Producer-side GPU operations used by the frame buffer set.
//!
//! Everything the buffering protocol does to the GPU goes through [`GpuDevice`], so the protocol
//! can be exercised with an instrumented device that counts live objects.
//!
//! ### 中文
//! 帧缓冲集合使用的生产者侧 GPU 操作。
//!
//! 缓冲协议对 GPU 的所有操作都经过 [`GpuDevice`]，因此可以用统计存活对象的插桩设备来测试协议。

use dpi::PhysicalSize;

use crate::engine::engine_api::GetProcAddress;
use crate::engine::error::Result;

/// ### English
/// GPU objects backing one frame buffer.
///
/// ### 中文
/// 支撑单个帧缓冲的 GPU 对象。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuBufferObjects {
    /// Color texture the engine renders into.
    pub texture: u32,
    /// Framebuffer object with `texture` attached.
    pub framebuffer: u32,
    /// ### English
    /// Cross-context share handle for `texture` (`EGLImage` as `u64`).
    ///
    /// ### 中文
    /// `texture` 的跨上下文共享句柄（`EGLImage` 转为 `u64`）。
    pub share_handle: u64,
    pub size: PhysicalSize<u32>,
}

/// ### English
/// A GPU context owned by one render thread.
///
/// Every method must be called on the thread that created the device.
///
/// ### 中文
/// 由单个渲染线程持有的 GPU 上下文。
///
/// 所有方法都必须在创建该设备的线程上调用。
pub trait GpuDevice {
    /// ### English
    /// Binds (`true`) or releases (`false`) the context on the calling thread.
    ///
    /// ### 中文
    /// 在调用线程上绑定（`true`）或释放（`false`）上下文。
    fn make_current(&mut self, current: bool) -> Result<()>;

    /// ### English
    /// Allocates a texture, a framebuffer around it and a share handle for it.
    /// On error nothing stays allocated.
    ///
    /// ### 中文
    /// 分配纹理、包裹它的 framebuffer 以及它的共享句柄。出错时不会残留任何已分配对象。
    fn create_buffer(&mut self, size: PhysicalSize<u32>) -> Result<GpuBufferObjects>;

    /// Binds the buffer's framebuffer and viewport for rendering.
    fn bind_buffer(&mut self, buffer: &GpuBufferObjects);

    /// ### English
    /// Flushes pending commands and inserts a fence after them. Returns 0 when fences are
    /// unsupported, in which case the device has already waited for completion.
    ///
    /// ### 中文
    /// 刷新挂起的命令并在其后插入 fence。不支持 fence 时返回 0，此时设备已同步等待完成。
    fn insert_fence(&mut self) -> u64;

    /// Waits for (bounded) and deletes a fence returned by [`GpuDevice::insert_fence`].
    fn wait_and_delete_fence(&mut self, fence: u64);

    fn destroy_share_handle(&mut self, share_handle: u64);

    fn delete_buffer_objects(&mut self, buffer: &GpuBufferObjects);

    /// Symbol resolver the playback engine uses to drive this context.
    fn get_proc_address(&self) -> GetProcAddress;

    /// ### English
    /// Destroys the context. Idempotent; the device is unusable afterwards.
    ///
    /// ### 中文
    /// 销毁上下文。可重复调用；调用后设备不可再用。
    fn destroy(&mut self);
}

/// ### English
/// Creates GPU devices on the render thread that will own them.
///
/// ### 中文
/// 在将要持有 GPU 设备的渲染线程上创建设备。
pub trait GpuDeviceFactory: Send + Sync {
    fn create_device(&self) -> Result<Box<dyn GpuDevice>>;
}
