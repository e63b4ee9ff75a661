//! ### English
//! Interfaces to the outside world: the playback engine's render API, the host texture
//! registrar and the host method channel.
//!
//! The FFI layer implements these over C vtables; tests implement them with mocks.
//!
//! ### 中文
//! 与外部交互的接口：播放引擎的渲染 API、宿主纹理注册器以及宿主方法通道。
//!
//! FFI 层基于 C 函数表实现这些接口；测试中使用 mock 实现。

use std::ffi::{CStr, c_void};
use std::sync::Arc;

use dpi::PhysicalSize;

use super::dimensions::VideoParams;
use super::error::Result;
use super::rendering::texture::VideoTexture;

/// ### English
/// Engine "new frame available" callback. May be invoked from any engine thread.
///
/// ### 中文
/// 引擎的“有新帧”回调，可能在引擎的任意线程上被调用。
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// ### English
/// GL symbol resolver (`eglGetProcAddress`-like).
///
/// ### 中文
/// GL 符号解析器（类似 `eglGetProcAddress`）。
pub type GetProcAddress = Arc<dyn Fn(&CStr) -> *const c_void + Send + Sync>;

/// ### English
/// Rendering API a render context is created for.
///
/// ### 中文
/// 创建渲染上下文时选择的渲染 API。
#[derive(Clone)]
pub enum RenderApi {
    OpenGl { get_proc_address: GetProcAddress },
    Software,
}

impl std::fmt::Debug for RenderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenGl { .. } => f.write_str("OpenGl"),
            Self::Software => f.write_str("Software"),
        }
    }
}

/// Pixel format of software targets: 4 bytes per pixel, padding byte last.
pub const SOFTWARE_PIXEL_FORMAT: &CStr = c"rgb0";

/// ### English
/// Where the engine should draw the next frame.
///
/// ### 中文
/// 引擎绘制下一帧的目标。
#[derive(Debug)]
pub enum RenderTarget<'a> {
    /// GL framebuffer object bound on the bridge's context.
    Framebuffer {
        fbo: u32,
        size: PhysicalSize<u32>,
        flip_y: bool,
    },
    /// CPU pixel buffer in [`SOFTWARE_PIXEL_FORMAT`].
    Software {
        size: PhysicalSize<u32>,
        stride: usize,
        pixels: &'a mut [u8],
    },
}

/// ### English
/// Per-session engine render context. Lives on the session's render thread; dropping it frees
/// the engine-side context, so it must be dropped while the GPU context is still alive.
///
/// ### 中文
/// 每个会话的引擎渲染上下文。存活于会话的渲染线程；drop 即释放引擎侧上下文，
/// 因此必须在 GPU 上下文仍然存活时 drop。
pub trait RenderContext {
    /// ### English
    /// Installs (or clears with `None`) the update callback. After `None` returns the engine
    /// must not call the previous callback anymore.
    ///
    /// ### 中文
    /// 安装（或以 `None` 清除）更新回调。传入 `None` 返回后，引擎不得再调用之前的回调。
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>);

    fn render(&mut self, target: RenderTarget<'_>) -> Result<()>;

    /// Tells the engine a rendered frame has been presented.
    fn report_swap(&mut self) {}

    /// Current video output parameters, `None` before the first decoded frame.
    fn video_params(&self) -> Option<VideoParams>;
}

/// ### English
/// The external playback engine. `handle` identifies the player instance.
///
/// ### 中文
/// 外部播放引擎。`handle` 标识播放器实例。
pub trait PlaybackEngine: Send + Sync {
    fn create_render_context(&self, handle: i64, api: RenderApi) -> Result<Box<dyn RenderContext>>;
}

/// ### English
/// Kind of texture registered with the host compositor.
///
/// ### 中文
/// 注册到宿主合成器的纹理类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureKind {
    Gl = 0,
    PixelBuffer = 1,
}

/// ### English
/// Host texture registry.
///
/// The host routes its populate / copy-pixels calls to the [`VideoTexture`] it was given until
/// `unregister_texture` completes. `on_done` must run exactly once, on any thread, after the host
/// will never touch the texture again (releasing compositor objects first via
/// [`VideoTexture::release_compositor_objects`] for GL textures).
///
/// ### 中文
/// 宿主纹理注册表。
///
/// 在 `unregister_texture` 完成之前，宿主会把 populate / copy-pixels 调用路由到其持有的
/// [`VideoTexture`]。`on_done` 必须在宿主不再访问该纹理后（GL 纹理需先通过
/// [`VideoTexture::release_compositor_objects`] 释放合成器对象）恰好调用一次，可在任意线程。
pub trait TextureRegistrar: Send + Sync {
    fn register_texture(&self, kind: TextureKind, texture: Arc<VideoTexture>) -> Result<i64>;

    fn unregister_texture(&self, id: i64, on_done: Box<dyn FnOnce() + Send>);

    fn mark_frame_available(&self, id: i64);
}

/// ### English
/// Out-of-band method channel towards the host (e.g. `VideoOutput.Resize`).
///
/// ### 中文
/// 通往宿主的带外方法通道（例如 `VideoOutput.Resize`）。
pub trait MethodSink: Send + Sync {
    fn invoke(&self, method: &str, payload: serde_json::Value);
}
