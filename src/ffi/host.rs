//! ### English
//! Host-supplied C function tables and their Rust trait adapters: the playback engine's render
//! API, the texture registrar and the method-channel sink.
//!
//! ### 中文
//! 宿主提供的 C 函数表及其 Rust trait 适配：播放引擎渲染 API、纹理注册器与方法通道。

use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::engine::dimensions::VideoParams;
use crate::engine::engine_api::{
    GetProcAddress, MethodSink, PlaybackEngine, RenderApi, RenderContext, RenderTarget,
    SOFTWARE_PIXEL_FORMAT, TextureKind, TextureRegistrar, UpdateCallback,
};
use crate::engine::error::{BridgeError, Result};
use crate::engine::rendering::texture::VideoTexture;

use super::texture::{KitVideoTexture, TextureHost};

/// ### English
/// GL symbol resolver in C form (`ctx` is passed back verbatim).
///
/// ### 中文
/// C 形式的 GL 符号解析器（`ctx` 原样传回）。
pub type KitVideoGetProcAddress = unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char) -> *const c_void;

/// ### English
/// Engine frame callback in C form.
///
/// ### 中文
/// C 形式的引擎新帧回调。
pub type KitVideoUpdateCallback = unsafe extern "C" fn(ctx: *mut c_void);

/// ### English
/// Completion callback handed to `unregister_texture`.
///
/// ### 中文
/// 交给 `unregister_texture` 的完成回调。
pub type KitVideoDoneCallback = unsafe extern "C" fn(ctx: *mut c_void);

/// `api` value selecting the OpenGL render API.
pub const KIT_VIDEO_RENDER_API_OPENGL: u32 = 0;
/// `api` value selecting the software render API.
pub const KIT_VIDEO_RENDER_API_SOFTWARE: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
/// ### English
/// Video output parameters reported by the engine.
///
/// ### 中文
/// 引擎报告的视频输出参数。
pub struct KitVideoParams {
    pub dw: i64,
    pub dh: i64,
    pub rotate: i64,
}

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Playback engine render API. Every function may be called from any bridge render thread; the
/// host must make them thread-safe. A missing function disables the matching feature.
///
/// ### 中文
/// 播放引擎渲染 API。所有函数都可能在任一桥接渲染线程上被调用，宿主须保证其线程安全。
/// 缺失的函数会禁用相应功能。
pub struct KitVideoEngineVTable {
    pub user_data: *mut c_void,
    /// ### English
    /// Creates a render context for player `handle`. `api` is one of `KIT_VIDEO_RENDER_API_*`;
    /// `get_proc_address` is only set for OpenGL. Returns NULL on failure.
    ///
    /// ### 中文
    /// 为播放器 `handle` 创建渲染上下文。`api` 取 `KIT_VIDEO_RENDER_API_*` 之一；
    /// 仅 OpenGL 时提供 `get_proc_address`。失败返回 NULL。
    pub create_render_context: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            handle: i64,
            api: u32,
            get_proc_address: Option<KitVideoGetProcAddress>,
            get_proc_address_ctx: *mut c_void,
        ) -> *mut c_void,
    >,
    /// ### English
    /// Installs (or clears, with NULL) the frame callback. After clearing returns the engine must
    /// not invoke the previous callback anymore.
    ///
    /// ### 中文
    /// 安装（或以 NULL 清除）新帧回调。清除返回后引擎不得再调用之前的回调。
    pub set_update_callback:
        Option<unsafe extern "C" fn(context: *mut c_void, callback: Option<KitVideoUpdateCallback>, ctx: *mut c_void)>,
    /// Renders into framebuffer `fbo` on the current context. Returns 0 on success.
    pub render_fbo:
        Option<unsafe extern "C" fn(context: *mut c_void, fbo: u32, width: u32, height: u32, flip_y: bool) -> i32>,
    /// Renders into CPU memory in the given pixel format. Returns 0 on success.
    pub render_sw: Option<
        unsafe extern "C" fn(
            context: *mut c_void,
            width: u32,
            height: u32,
            stride: usize,
            format: *const c_char,
            pixels: *mut u8,
        ) -> i32,
    >,
    pub report_swap: Option<unsafe extern "C" fn(context: *mut c_void)>,
    /// Writes the current output parameters; returns `false` before the first frame.
    pub video_params: Option<unsafe extern "C" fn(context: *mut c_void, out: *mut KitVideoParams) -> bool>,
    pub free_render_context: Option<unsafe extern "C" fn(context: *mut c_void)>,
}

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Host texture registry and method channel.
///
/// `register_texture` takes ownership of the `KitVideoTexture` and returns its texture id (> 0),
/// or a value <= 0 on failure (ownership stays with the bridge). `unregister_texture` must, on
/// the compositor thread, call `kit_video_bridge_texture_release` and then `on_done(on_done_ctx)`
/// exactly once.
///
/// ### 中文
/// 宿主纹理注册表与方法通道。
///
/// `register_texture` 接管 `KitVideoTexture` 的所有权并返回纹理 id（> 0）；失败时返回 <= 0
/// （所有权仍归桥接层）。`unregister_texture` 必须在合成器线程上先调用
/// `kit_video_bridge_texture_release`，再恰好调用一次 `on_done(on_done_ctx)`。
pub struct KitVideoHostVTable {
    pub user_data: *mut c_void,
    pub register_texture:
        Option<unsafe extern "C" fn(user_data: *mut c_void, kind: u32, texture: *mut KitVideoTexture) -> i64>,
    pub unregister_texture: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            id: i64,
            on_done: KitVideoDoneCallback,
            on_done_ctx: *mut c_void,
        ),
    >,
    pub mark_frame_available: Option<unsafe extern "C" fn(user_data: *mut c_void, id: i64)>,
    /// Sends an out-of-band method call (`payload_json` is a JSON document).
    pub invoke_method:
        Option<unsafe extern "C" fn(user_data: *mut c_void, method: *const c_char, payload_json: *const c_char)>,
}

/// ### English
/// [`PlaybackEngine`] over a [`KitVideoEngineVTable`].
///
/// ### 中文
/// 基于 [`KitVideoEngineVTable`] 的 [`PlaybackEngine`]。
pub(crate) struct FfiEngine {
    vtable: KitVideoEngineVTable,
}

// The host guarantees the table's functions and `user_data` are usable from any thread.
unsafe impl Send for FfiEngine {}
unsafe impl Sync for FfiEngine {}

impl FfiEngine {
    pub(crate) fn new(vtable: KitVideoEngineVTable) -> Self {
        Self { vtable }
    }
}

impl PlaybackEngine for FfiEngine {
    fn create_render_context(&self, handle: i64, api: RenderApi) -> Result<Box<dyn RenderContext>> {
        let create = self
            .vtable
            .create_render_context
            .ok_or_else(|| BridgeError::Engine("create_render_context missing".to_string()))?;

        let (api_code, resolver) = match api {
            RenderApi::OpenGl { get_proc_address } => (KIT_VIDEO_RENDER_API_OPENGL, Some(Box::new(get_proc_address))),
            RenderApi::Software => (KIT_VIDEO_RENDER_API_SOFTWARE, None),
        };
        let (trampoline, resolver_ctx) = match &resolver {
            Some(resolver) => (
                Some(get_proc_address_trampoline as KitVideoGetProcAddress),
                &**resolver as *const GetProcAddress as *mut c_void,
            ),
            None => (None, std::ptr::null_mut()),
        };

        let context = unsafe { create(self.vtable.user_data, handle, api_code, trampoline, resolver_ctx) };
        let context = NonNull::new(context)
            .ok_or_else(|| BridgeError::Engine(format!("engine refused render API {api_code}")))?;
        Ok(Box::new(FfiRenderContext {
            vtable: self.vtable,
            context,
            callback: None,
            _resolver: resolver,
        }))
    }
}

unsafe extern "C" fn get_proc_address_trampoline(ctx: *mut c_void, name: *const c_char) -> *const c_void {
    if ctx.is_null() || name.is_null() {
        return std::ptr::null();
    }
    let resolver = unsafe { &*(ctx as *const GetProcAddress) };
    resolver(unsafe { CStr::from_ptr(name) })
}

unsafe extern "C" fn update_trampoline(ctx: *mut c_void) {
    if ctx.is_null() {
        return;
    }
    let callback = unsafe { &*(ctx as *const UpdateCallback) };
    callback();
}

struct FfiRenderContext {
    vtable: KitVideoEngineVTable,
    context: NonNull<c_void>,
    /// Boxed so the pointer handed to the engine stays put.
    callback: Option<Box<UpdateCallback>>,
    _resolver: Option<Box<GetProcAddress>>,
}

impl FfiRenderContext {
    fn check(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(BridgeError::Engine(format!("engine render failed with code {code}")))
        }
    }
}

impl RenderContext for FfiRenderContext {
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>) {
        let Some(set) = self.vtable.set_update_callback else {
            self.callback = None;
            return;
        };
        match callback {
            Some(callback) => {
                let boxed = Box::new(callback);
                let ctx = &*boxed as *const UpdateCallback as *mut c_void;
                unsafe { set(self.context.as_ptr(), Some(update_trampoline), ctx) };
                self.callback = Some(boxed);
            }
            None => {
                unsafe { set(self.context.as_ptr(), None, std::ptr::null_mut()) };
                self.callback = None;
            }
        }
    }

    fn render(&mut self, target: RenderTarget<'_>) -> Result<()> {
        match target {
            RenderTarget::Framebuffer { fbo, size, flip_y } => {
                let render = self
                    .vtable
                    .render_fbo
                    .ok_or_else(|| BridgeError::Engine("render_fbo missing".to_string()))?;
                Self::check(unsafe { render(self.context.as_ptr(), fbo, size.width, size.height, flip_y) })
            }
            RenderTarget::Software { size, stride, pixels } => {
                let render = self
                    .vtable
                    .render_sw
                    .ok_or_else(|| BridgeError::Engine("render_sw missing".to_string()))?;
                Self::check(unsafe {
                    render(
                        self.context.as_ptr(),
                        size.width,
                        size.height,
                        stride,
                        SOFTWARE_PIXEL_FORMAT.as_ptr(),
                        pixels.as_mut_ptr(),
                    )
                })
            }
        }
    }

    fn report_swap(&mut self) {
        if let Some(report) = self.vtable.report_swap {
            unsafe { report(self.context.as_ptr()) };
        }
    }

    fn video_params(&self) -> Option<VideoParams> {
        let query = self.vtable.video_params?;
        let mut params = KitVideoParams::default();
        let known = unsafe { query(self.context.as_ptr(), &mut params) };
        known.then_some(VideoParams {
            dw: params.dw,
            dh: params.dh,
            rotate: params.rotate,
        })
    }
}

impl Drop for FfiRenderContext {
    fn drop(&mut self) {
        if self.callback.is_some() {
            self.set_update_callback(None);
        }
        if let Some(free) = self.vtable.free_render_context {
            unsafe { free(self.context.as_ptr()) };
        }
    }
}

/// ### English
/// [`TextureRegistrar`] and [`MethodSink`] over a [`KitVideoHostVTable`].
///
/// ### 中文
/// 基于 [`KitVideoHostVTable`] 的 [`TextureRegistrar`] 与 [`MethodSink`]。
pub(crate) struct FfiHost {
    vtable: KitVideoHostVTable,
    textures: Arc<TextureHost>,
}

// The host guarantees the table's functions and `user_data` are usable from any thread.
unsafe impl Send for FfiHost {}
unsafe impl Sync for FfiHost {}

impl FfiHost {
    pub(crate) fn new(vtable: KitVideoHostVTable, textures: Arc<TextureHost>) -> Self {
        Self { vtable, textures }
    }
}

impl TextureRegistrar for FfiHost {
    fn register_texture(&self, kind: TextureKind, texture: Arc<VideoTexture>) -> Result<i64> {
        let register = self
            .vtable
            .register_texture
            .ok_or_else(|| BridgeError::Engine("register_texture missing".to_string()))?;
        let raw = KitVideoTexture::into_raw(texture, Arc::clone(&self.textures));
        let id = unsafe { register(self.vtable.user_data, kind as u32, raw) };
        if id <= 0 {
            unsafe { KitVideoTexture::free(raw) };
            return Err(BridgeError::ResourceExhausted(format!("host refused texture ({id})")));
        }
        Ok(id)
    }

    fn unregister_texture(&self, id: i64, on_done: Box<dyn FnOnce() + Send>) {
        let Some(unregister) = self.vtable.unregister_texture else {
            on_done();
            return;
        };
        let ctx = Box::into_raw(Box::new(on_done)) as *mut c_void;
        unsafe { unregister(self.vtable.user_data, id, done_trampoline, ctx) };
    }

    fn mark_frame_available(&self, id: i64) {
        if let Some(mark) = self.vtable.mark_frame_available {
            unsafe { mark(self.vtable.user_data, id) };
        }
    }
}

unsafe extern "C" fn done_trampoline(ctx: *mut c_void) {
    if ctx.is_null() {
        return;
    }
    let on_done = unsafe { Box::from_raw(ctx as *mut Box<dyn FnOnce() + Send>) };
    on_done();
}

impl MethodSink for FfiHost {
    fn invoke(&self, method: &str, payload: serde_json::Value) {
        let Some(invoke) = self.vtable.invoke_method else {
            return;
        };
        let (Ok(method), Ok(payload)) = (CString::new(method), CString::new(payload.to_string())) else {
            tracing::warn!(method, "notification contains a NUL byte, dropped");
            return;
        };
        unsafe { invoke(self.vtable.user_data, method.as_ptr(), payload.as_ptr()) };
    }
}
