/// ### English
/// EGL-backed GPU context for a session's render thread.
///
/// Creates an offscreen context in the host compositor's share group so textures rendered here
/// can be handed to the compositor as `EGLImage`s. Context creation walks a tier list
/// (GLES 3, GLES 2, desktop GL) and only reports hardware as unavailable when every tier fails.
///
/// ### 中文
/// 会话渲染线程使用的基于 EGL 的 GPU 上下文。
///
/// 在宿主合成器的共享组中创建离屏上下文，使此处渲染的纹理能以 `EGLImage` 形式交给合成器。
/// 上下文创建按层级列表（GLES 3、GLES 2、桌面 GL）依次尝试，仅当所有层级都失败时才报告硬件不可用。
use std::cell::Cell;
use std::ffi::{CString, c_void};
use std::rc::Rc;

use dpi::PhysicalSize;
use gleam::gl::{self, Gl};
use glow::HasContext as _;

use crate::engine::engine_api::GetProcAddress;
use crate::engine::error::{BridgeError, Result};

use super::device::{GpuBufferObjects, GpuDevice, GpuDeviceFactory};
use super::egl::{
    EGL_ALPHA_SIZE, EGL_BLUE_SIZE, EGL_CONTEXT_CLIENT_VERSION, EGL_GREEN_SIZE, EGL_HEIGHT,
    EGL_NONE, EGL_OPENGL_API, EGL_OPENGL_BIT, EGL_OPENGL_ES_API, EGL_OPENGL_ES2_BIT,
    EGL_OPENGL_ES3_BIT, EGL_PBUFFER_BIT, EGL_RED_SIZE, EGL_RENDERABLE_TYPE, EGL_SURFACE_TYPE,
    EGL_WIDTH, EglApi, EglContext, EglDisplay, EglEnum, EglImage, EglInt, EglSurface,
};

/// Upper bound for CPU-side fence waits during teardown (nanoseconds).
const FENCE_WAIT_TIMEOUT_NS: i32 = 100_000_000;

/// ### English
/// Parses `"4.6.0 ..."` or `"OpenGL ES 3.2 ..."` into `(major, minor)`; unknown parts are 0.
///
/// ### 中文
/// 把 `"4.6.0 ..."` 或 `"OpenGL ES 3.2 ..."` 解析为 `(major, minor)`；无法识别的部分为 0。
pub(crate) fn parse_gl_version(version: &str) -> (u32, u32) {
    let Some(token) = version
        .split_whitespace()
        .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))
    else {
        return (0, 0);
    };
    let mut parts = token.split('.').map(|part| part.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// ### English
/// Whether sync objects are core: GLES 3.0+, desktop GL 3.2+.
///
/// ### 中文
/// sync 对象是否为核心特性：GLES 3.0+，桌面 GL 3.2+。
pub(crate) fn sync_objects_supported(version: &str) -> bool {
    let (major, minor) = parse_gl_version(version);
    if version.starts_with("OpenGL ES") {
        major >= 3
    } else {
        major > 3 || (major == 3 && minor >= 2)
    }
}

thread_local! {
    /// ### English
    /// Per-thread "current EGL context" cache to avoid redundant `eglMakeCurrent` calls.
    ///
    /// ### 中文
    /// 每线程缓存“当前 EGL 上下文”，避免重复调用 `eglMakeCurrent`。
    static CURRENT_EGL_CONTEXT: Cell<usize> = const { Cell::new(0) };
}

/// ### English
/// Context configurations tried in order.
///
/// ### 中文
/// 按顺序尝试的上下文配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextTier {
    Gles3,
    Gles2,
    DesktopGl,
}

impl ContextTier {
    pub const ORDERED: [ContextTier; 3] = [Self::Gles3, Self::Gles2, Self::DesktopGl];

    fn api(self) -> EglEnum {
        match self {
            Self::Gles3 | Self::Gles2 => EGL_OPENGL_ES_API,
            Self::DesktopGl => EGL_OPENGL_API,
        }
    }

    fn renderable_bit(self) -> EglInt {
        match self {
            Self::Gles3 => EGL_OPENGL_ES3_BIT,
            Self::Gles2 => EGL_OPENGL_ES2_BIT,
            Self::DesktopGl => EGL_OPENGL_BIT,
        }
    }

    fn context_attribs(self) -> &'static [EglInt] {
        match self {
            Self::Gles3 => &[EGL_CONTEXT_CLIENT_VERSION, 3, EGL_NONE],
            Self::Gles2 => &[EGL_CONTEXT_CLIENT_VERSION, 2, EGL_NONE],
            Self::DesktopGl => &[EGL_NONE],
        }
    }
}

/// ### English
/// Host GL environment: symbol resolver, the compositor's `EGLDisplay` and (optionally) its
/// context to share objects with. Pointers are stored as addresses so the factory is `Send`.
///
/// ### 中文
/// 宿主 GL 环境：符号解析器、合成器的 `EGLDisplay` 以及（可选的）用于共享对象的上下文。
/// 指针以地址形式保存，使工厂满足 `Send`。
#[derive(Clone)]
pub struct EglDeviceFactory {
    pub resolver: GetProcAddress,
    pub display: usize,
    pub share_context: usize,
}

impl GpuDeviceFactory for EglDeviceFactory {
    fn create_device(&self) -> Result<Box<dyn GpuDevice>> {
        Ok(Box::new(EglGpuContext::create(self)?))
    }
}

/// ### English
/// Offscreen EGL context plus the GL loaders bound to it.
///
/// ### 中文
/// 离屏 EGL 上下文以及绑定其上的 GL 加载器。
pub struct EglGpuContext {
    egl: EglApi,
    resolver: GetProcAddress,
    display: EglDisplay,
    context: EglContext,
    /// 1×1 pbuffer; all real rendering targets framebuffer objects.
    surface: EglSurface,
    tier: ContextTier,
    /// ### English
    /// gleam GL API used for texture and framebuffer objects.
    ///
    /// ### 中文
    /// 用于纹理与 framebuffer 对象的 gleam GL API。
    gl: Rc<dyn Gl>,
    /// ### English
    /// glow GL API used for fence/sync operations.
    ///
    /// ### 中文
    /// 用于 fence/sync 操作的 glow GL API。
    glow: glow::Context,
    fences_supported: bool,
    destroyed: bool,
}

impl EglGpuContext {
    /// ### English
    /// Creates the context on the calling thread, which becomes its owner.
    ///
    /// ### 中文
    /// 在调用线程上创建上下文，调用线程即为其所有者。
    pub fn create(host: &EglDeviceFactory) -> Result<Self> {
        let egl = EglApi::load(&host.resolver)?;
        let display = host.display as EglDisplay;
        if display.is_null() {
            return Err(BridgeError::HardwareUnavailable(
                "host did not provide an EGL display".to_string(),
            ));
        }
        let share = host.share_context as EglContext;

        let mut failures = Vec::with_capacity(ContextTier::ORDERED.len());
        for tier in ContextTier::ORDERED {
            match unsafe { create_tier(&egl, display, share, tier) } {
                Ok((context, surface)) => {
                    return unsafe { Self::bind_loaders(egl, host.resolver.clone(), display, context, surface, tier) };
                }
                Err(code) => {
                    tracing::debug!(?tier, code, "GPU context tier unavailable");
                    failures.push(format!("{tier:?}: {code:#x}"));
                }
            }
        }
        Err(BridgeError::HardwareUnavailable(failures.join(", ")))
    }

    unsafe fn bind_loaders(
        egl: EglApi,
        resolver: GetProcAddress,
        display: EglDisplay,
        context: EglContext,
        surface: EglSurface,
        tier: ContextTier,
    ) -> Result<Self> {
        if !unsafe { egl.make_current(display, surface, context) } {
            let code = egl.error();
            unsafe {
                egl.destroy_surface(display, surface);
                egl.destroy_context(display, context);
            }
            return Err(BridgeError::ContextBind { code });
        }
        CURRENT_EGL_CONTEXT.with(|current| current.set(context as usize));

        let load = |name: &str| -> *const c_void {
            match CString::new(name) {
                Ok(name) => resolver(name.as_c_str()),
                Err(_) => std::ptr::null(),
            }
        };
        let glow = unsafe { glow::Context::from_loader_function(load) };
        let version = unsafe { glow.get_parameter_string(glow::VERSION) };
        let gl: Rc<dyn Gl> = unsafe {
            if version.starts_with("OpenGL ES") {
                gl::GlesFns::load_with(load)
            } else {
                gl::GlFns::load_with(load)
            }
        };
        let fences_supported = sync_objects_supported(&version);
        tracing::info!(?tier, %version, fences_supported, "GPU context created");

        Ok(Self {
            egl,
            resolver,
            display,
            context,
            surface,
            tier,
            gl,
            glow,
            fences_supported,
            destroyed: false,
        })
    }

    pub fn tier(&self) -> ContextTier {
        self.tier
    }
}

/// ### English
/// Tries one tier; returns the EGL error code on failure with nothing left allocated.
///
/// ### 中文
/// 尝试一个层级；失败时返回 EGL 错误码，且不残留任何已分配对象。
unsafe fn create_tier(
    egl: &EglApi,
    display: EglDisplay,
    share: EglContext,
    tier: ContextTier,
) -> std::result::Result<(EglContext, EglSurface), EglInt> {
    unsafe {
        if !egl.bind_api(tier.api()) {
            return Err(egl.error());
        }
        let config_attribs = [
            EGL_SURFACE_TYPE,
            EGL_PBUFFER_BIT,
            EGL_RENDERABLE_TYPE,
            tier.renderable_bit(),
            EGL_RED_SIZE,
            8,
            EGL_GREEN_SIZE,
            8,
            EGL_BLUE_SIZE,
            8,
            EGL_ALPHA_SIZE,
            8,
            EGL_NONE,
        ];
        let Some(config) = egl.choose_config(display, &config_attribs) else {
            return Err(egl.error());
        };
        let context = egl.create_context(display, config, share, tier.context_attribs());
        if context.is_null() {
            return Err(egl.error());
        }
        let surface = egl.create_pbuffer_surface(display, config, &[EGL_WIDTH, 1, EGL_HEIGHT, 1, EGL_NONE]);
        if surface.is_null() {
            let code = egl.error();
            egl.destroy_context(display, context);
            return Err(code);
        }
        Ok((context, surface))
    }
}

impl GpuDevice for EglGpuContext {
    fn make_current(&mut self, current: bool) -> Result<()> {
        if self.destroyed {
            return Err(BridgeError::ContextBind { code: 0 });
        }
        CURRENT_EGL_CONTEXT.with(|cached| {
            let target = if current { self.context as usize } else { 0 };
            if cached.get() == target {
                return Ok(());
            }
            let ok = unsafe {
                if current {
                    self.egl.make_current(self.display, self.surface, self.context)
                } else {
                    self.egl
                        .make_current(self.display, std::ptr::null_mut(), std::ptr::null_mut())
                }
            };
            if !ok {
                cached.set(0);
                return Err(BridgeError::ContextBind { code: self.egl.error() });
            }
            cached.set(target);
            Ok(())
        })
    }

    fn create_buffer(&mut self, size: PhysicalSize<u32>) -> Result<GpuBufferObjects> {
        let gl = &self.gl;
        let framebuffer = gl.gen_framebuffers(1).first().copied().unwrap_or(0);
        let texture = gl.gen_textures(1).first().copied().unwrap_or(0);
        if framebuffer == 0 || texture == 0 {
            gl.delete_framebuffers(&[framebuffer]);
            gl.delete_textures(&[texture]);
            return Err(BridgeError::ResourceExhausted("glGen* returned no name".to_string()));
        }

        gl.bind_texture(gl::TEXTURE_2D, texture);
        gl.tex_image_2d(
            gl::TEXTURE_2D,
            0,
            gl::RGBA as gl::GLint,
            size.width as gl::GLsizei,
            size.height as gl::GLsizei,
            0,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            None,
        );
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as gl::GLint);
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as gl::GLint);
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as gl::GLint);
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as gl::GLint);
        gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);
        gl.framebuffer_texture_2d(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, texture, 0);
        let status = gl.check_frame_buffer_status(gl::FRAMEBUFFER);
        let error = gl.get_error();
        gl.bind_texture(gl::TEXTURE_2D, 0);
        gl.bind_framebuffer(gl::FRAMEBUFFER, 0);

        if status != gl::FRAMEBUFFER_COMPLETE || error == gl::OUT_OF_MEMORY {
            gl.delete_textures(&[texture]);
            gl.delete_framebuffers(&[framebuffer]);
            return Err(BridgeError::ResourceExhausted(format!(
                "{}x{} framebuffer incomplete (status {status:#x}, error {error:#x})",
                size.width, size.height
            )));
        }

        let image = unsafe { self.egl.create_texture_image(self.display, self.context, texture) };
        if image.is_null() {
            let code = self.egl.error();
            gl.delete_textures(&[texture]);
            gl.delete_framebuffers(&[framebuffer]);
            return Err(BridgeError::ResourceExhausted(format!(
                "eglCreateImageKHR failed ({code:#x})"
            )));
        }

        Ok(GpuBufferObjects {
            texture,
            framebuffer,
            share_handle: image as usize as u64,
            size,
        })
    }

    fn bind_buffer(&mut self, buffer: &GpuBufferObjects) {
        self.gl.bind_framebuffer(gl::FRAMEBUFFER, buffer.framebuffer);
        self.gl.viewport(
            0,
            0,
            buffer.size.width as gl::GLsizei,
            buffer.size.height as gl::GLsizei,
        );
    }

    fn insert_fence(&mut self) -> u64 {
        if self.fences_supported {
            match unsafe { self.glow.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) } {
                Ok(fence) => {
                    self.gl.flush();
                    return fence.0 as usize as u64;
                }
                Err(err) => tracing::warn!(%err, "glFenceSync failed; finishing instead"),
            }
        }
        self.gl.finish();
        0
    }

    fn wait_and_delete_fence(&mut self, fence: u64) {
        if fence == 0 {
            return;
        }
        let sync = glow::NativeFence(fence as usize as *mut _);
        unsafe {
            self.glow
                .client_wait_sync(sync, glow::SYNC_FLUSH_COMMANDS_BIT, FENCE_WAIT_TIMEOUT_NS);
            self.glow.delete_sync(sync);
        }
    }

    fn destroy_share_handle(&mut self, share_handle: u64) {
        if share_handle == 0 {
            return;
        }
        unsafe {
            self.egl
                .destroy_image(self.display, share_handle as usize as EglImage);
        }
    }

    fn delete_buffer_objects(&mut self, buffer: &GpuBufferObjects) {
        self.gl.delete_textures(&[buffer.texture]);
        self.gl.delete_framebuffers(&[buffer.framebuffer]);
    }

    fn get_proc_address(&self) -> GetProcAddress {
        self.resolver.clone()
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        unsafe {
            self.egl
                .make_current(self.display, std::ptr::null_mut(), std::ptr::null_mut());
            CURRENT_EGL_CONTEXT.with(|current| current.set(0));
            self.egl.destroy_surface(self.display, self.surface);
            self.egl.destroy_context(self.display, self.context);
        }
        tracing::debug!(tier = ?self.tier, "GPU context destroyed");
    }
}

impl Drop for EglGpuContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
