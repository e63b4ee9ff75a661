//! ### English
//! Minimal EGL entry points resolved through the host's `get_proc_address`.
//!
//! The bridge never links EGL itself; the host passes a resolver that knows its platform's EGL
//! (libEGL, or ANGLE's on Windows), the same way the host already hands its GL symbols around.
//!
//! ### 中文
//! 通过宿主的 `get_proc_address` 解析出的最小 EGL 入口点集合。
//!
//! 桥接层自身从不链接 EGL；宿主传入一个了解其平台 EGL（libEGL，或 Windows 上的 ANGLE）的解析器，
//! 与宿主分发 GL 符号的方式相同。

use std::ffi::{CStr, c_void};

use crate::engine::engine_api::GetProcAddress;
use crate::engine::error::{BridgeError, Result};

pub type EglDisplay = *mut c_void;
pub type EglConfig = *mut c_void;
pub type EglContext = *mut c_void;
pub type EglSurface = *mut c_void;
pub type EglImage = *mut c_void;
pub type EglClientBuffer = *mut c_void;
pub type EglInt = i32;
pub type EglBoolean = u32;
pub type EglEnum = u32;

pub const EGL_FALSE: EglBoolean = 0;
pub const EGL_NONE: EglInt = 0x3038;
pub const EGL_ALPHA_SIZE: EglInt = 0x3021;
pub const EGL_BLUE_SIZE: EglInt = 0x3022;
pub const EGL_GREEN_SIZE: EglInt = 0x3023;
pub const EGL_RED_SIZE: EglInt = 0x3024;
pub const EGL_SURFACE_TYPE: EglInt = 0x3033;
pub const EGL_RENDERABLE_TYPE: EglInt = 0x3040;
pub const EGL_HEIGHT: EglInt = 0x3056;
pub const EGL_WIDTH: EglInt = 0x3057;
pub const EGL_CONTEXT_CLIENT_VERSION: EglInt = 0x3098;
pub const EGL_PBUFFER_BIT: EglInt = 0x0001;
pub const EGL_OPENGL_ES2_BIT: EglInt = 0x0004;
pub const EGL_OPENGL_BIT: EglInt = 0x0008;
pub const EGL_OPENGL_ES3_BIT: EglInt = 0x0040;
pub const EGL_OPENGL_ES_API: EglEnum = 0x30A0;
pub const EGL_OPENGL_API: EglEnum = 0x30A2;
pub const EGL_GL_TEXTURE_2D_KHR: EglEnum = 0x30B1;
pub const EGL_IMAGE_PRESERVED_KHR: EglInt = 0x30D2;
pub const EGL_TRUE_INT: EglInt = 1;

type EglGetError = unsafe extern "system" fn() -> EglInt;
type EglBindApi = unsafe extern "system" fn(EglEnum) -> EglBoolean;
type EglChooseConfig =
    unsafe extern "system" fn(EglDisplay, *const EglInt, *mut EglConfig, EglInt, *mut EglInt) -> EglBoolean;
type EglCreateContext =
    unsafe extern "system" fn(EglDisplay, EglConfig, EglContext, *const EglInt) -> EglContext;
type EglDestroyContext = unsafe extern "system" fn(EglDisplay, EglContext) -> EglBoolean;
type EglCreatePbufferSurface =
    unsafe extern "system" fn(EglDisplay, EglConfig, *const EglInt) -> EglSurface;
type EglDestroySurface = unsafe extern "system" fn(EglDisplay, EglSurface) -> EglBoolean;
type EglMakeCurrent =
    unsafe extern "system" fn(EglDisplay, EglSurface, EglSurface, EglContext) -> EglBoolean;
type EglCreateImageKhr = unsafe extern "system" fn(
    EglDisplay,
    EglContext,
    EglEnum,
    EglClientBuffer,
    *const EglInt,
) -> EglImage;
type EglDestroyImageKhr = unsafe extern "system" fn(EglDisplay, EglImage) -> EglBoolean;

/// ### English
/// `glEGLImageTargetTexture2DOES`: binds an `EGLImage` as the storage of the bound texture.
///
/// ### 中文
/// `glEGLImageTargetTexture2DOES`：把 `EGLImage` 绑定为当前纹理的存储。
pub type GlEglImageTargetTexture2dOes = unsafe extern "system" fn(u32, EglImage);

/// ### English
/// Resolves one symbol and reinterprets it as the function pointer type `F`.
///
/// ### 中文
/// 解析一个符号并将其重新解释为函数指针类型 `F`。
///
/// # Safety
/// `F` must be the symbol's real signature.
pub(crate) unsafe fn resolve<F: Copy>(resolver: &GetProcAddress, name: &CStr) -> Result<F> {
    debug_assert_eq!(size_of::<F>(), size_of::<*const c_void>());
    let address = resolver(name);
    if address.is_null() {
        return Err(BridgeError::HardwareUnavailable(format!(
            "missing symbol {}",
            name.to_string_lossy()
        )));
    }
    Ok(unsafe { std::mem::transmute_copy::<*const c_void, F>(&address) })
}

/// ### English
/// Loaded EGL function table.
///
/// ### 中文
/// 已加载的 EGL 函数表。
#[derive(Clone, Copy)]
pub struct EglApi {
    get_error: EglGetError,
    bind_api: EglBindApi,
    choose_config: EglChooseConfig,
    create_context: EglCreateContext,
    destroy_context: EglDestroyContext,
    create_pbuffer_surface: EglCreatePbufferSurface,
    destroy_surface: EglDestroySurface,
    make_current: EglMakeCurrent,
    create_image: EglCreateImageKhr,
    destroy_image: EglDestroyImageKhr,
}

impl EglApi {
    /// ### English
    /// Resolves every entry point; any missing one makes hardware rendering unavailable.
    ///
    /// ### 中文
    /// 解析全部入口点；缺少任何一个都意味着硬件渲染不可用。
    pub fn load(resolver: &GetProcAddress) -> Result<Self> {
        unsafe {
            Ok(Self {
                get_error: resolve(resolver, c"eglGetError")?,
                bind_api: resolve(resolver, c"eglBindAPI")?,
                choose_config: resolve(resolver, c"eglChooseConfig")?,
                create_context: resolve(resolver, c"eglCreateContext")?,
                destroy_context: resolve(resolver, c"eglDestroyContext")?,
                create_pbuffer_surface: resolve(resolver, c"eglCreatePbufferSurface")?,
                destroy_surface: resolve(resolver, c"eglDestroySurface")?,
                make_current: resolve(resolver, c"eglMakeCurrent")?,
                create_image: resolve(resolver, c"eglCreateImageKHR")?,
                destroy_image: resolve(resolver, c"eglDestroyImageKHR")?,
            })
        }
    }

    pub fn error(&self) -> EglInt {
        unsafe { (self.get_error)() }
    }

    pub unsafe fn bind_api(&self, api: EglEnum) -> bool {
        unsafe { (self.bind_api)(api) != EGL_FALSE }
    }

    /// Returns the first config matching `attribs`, or `None`.
    pub unsafe fn choose_config(&self, display: EglDisplay, attribs: &[EglInt]) -> Option<EglConfig> {
        let mut config: EglConfig = std::ptr::null_mut();
        let mut count: EglInt = 0;
        let ok = unsafe { (self.choose_config)(display, attribs.as_ptr(), &mut config, 1, &mut count) };
        (ok != EGL_FALSE && count > 0 && !config.is_null()).then_some(config)
    }

    pub unsafe fn create_context(
        &self,
        display: EglDisplay,
        config: EglConfig,
        share: EglContext,
        attribs: &[EglInt],
    ) -> EglContext {
        unsafe { (self.create_context)(display, config, share, attribs.as_ptr()) }
    }

    pub unsafe fn destroy_context(&self, display: EglDisplay, context: EglContext) {
        unsafe {
            (self.destroy_context)(display, context);
        }
    }

    pub unsafe fn create_pbuffer_surface(
        &self,
        display: EglDisplay,
        config: EglConfig,
        attribs: &[EglInt],
    ) -> EglSurface {
        unsafe { (self.create_pbuffer_surface)(display, config, attribs.as_ptr()) }
    }

    pub unsafe fn destroy_surface(&self, display: EglDisplay, surface: EglSurface) {
        unsafe {
            (self.destroy_surface)(display, surface);
        }
    }

    pub unsafe fn make_current(
        &self,
        display: EglDisplay,
        surface: EglSurface,
        context: EglContext,
    ) -> bool {
        unsafe { (self.make_current)(display, surface, surface, context) != EGL_FALSE }
    }

    /// ### English
    /// Wraps a GL texture of `context` into an `EGLImage` other contexts can import.
    ///
    /// ### 中文
    /// 把 `context` 中的 GL 纹理包装为其它上下文可导入的 `EGLImage`。
    pub unsafe fn create_texture_image(
        &self,
        display: EglDisplay,
        context: EglContext,
        texture: u32,
    ) -> EglImage {
        let attribs = [EGL_IMAGE_PRESERVED_KHR, EGL_TRUE_INT, EGL_NONE];
        unsafe {
            (self.create_image)(
                display,
                context,
                EGL_GL_TEXTURE_2D_KHR,
                texture as usize as EglClientBuffer,
                attribs.as_ptr(),
            )
        }
    }

    pub unsafe fn destroy_image(&self, display: EglDisplay, image: EglImage) {
        unsafe {
            (self.destroy_image)(display, image);
        }
    }
}
