//! ### English
//! GPU operations performed in the host compositor's context.
//!
//! ### 中文
//! 在宿主合成器上下文中执行的 GPU 操作。

use std::ffi::{CString, c_void};
use std::rc::Rc;

use gleam::gl::{self, Gl};
use glow::HasContext as _;

use crate::engine::engine_api::GetProcAddress;
use crate::engine::error::{BridgeError, Result};
use crate::engine::rendering::egl::{EglImage, GlEglImageTargetTexture2dOes, resolve};
use crate::engine::rendering::gpu_context::sync_objects_supported;

/// `GL_TEXTURE_2D`, the target of every texture handed to the compositor.
pub const GL_TEXTURE_2D: u32 = 0x0DE1;

/// ### English
/// Compositor-context GPU calls used by [`super::VideoTexture::populate`].
///
/// Called only on the compositor thread with its context current.
///
/// ### 中文
/// [`super::VideoTexture::populate`] 使用的合成器上下文 GPU 调用。
///
/// 只在合成器线程上、且其上下文为 current 时调用。
pub trait CompositorGpu {
    /// ### English
    /// Makes the compositor context wait for a producer fence (0 = nothing to wait for).
    ///
    /// ### 中文
    /// 让合成器上下文等待生产者 fence（0 表示无需等待）。
    fn wait_fence(&self, fence: u64);

    /// ### English
    /// Creates a compositor texture whose storage is the shared buffer behind `share_handle`.
    ///
    /// ### 中文
    /// 创建一个以 `share_handle` 背后的共享缓冲为存储的合成器纹理。
    fn import_share_handle(&self, share_handle: u64) -> Result<u32>;

    fn delete_texture(&self, texture: u32);

    /// Creates a 1×1 opaque black texture.
    fn create_placeholder(&self) -> Result<u32>;
}

/// ### English
/// [`CompositorGpu`] over the compositor's GL context, importing `EGLImage` share handles.
///
/// ### 中文
/// 基于合成器 GL 上下文的 [`CompositorGpu`] 实现，导入 `EGLImage` 共享句柄。
pub struct GlCompositor {
    gl: Rc<dyn Gl>,
    glow: glow::Context,
    image_target_texture_2d: GlEglImageTargetTexture2dOes,
    /// ### English
    /// `glWaitSync` available. Without it the producer finishes its frames on the CPU and never
    /// publishes a fence.
    ///
    /// ### 中文
    /// 是否可用 `glWaitSync`。不可用时生产者会在 CPU 上 finish，并且从不发布 fence。
    wait_sync_supported: bool,
}

impl GlCompositor {
    /// ### English
    /// Loads GL entry points for the compositor context, which must be current.
    ///
    /// ### 中文
    /// 为合成器上下文加载 GL 入口点；调用时该上下文必须为 current。
    pub fn load(resolver: &GetProcAddress) -> Result<Self> {
        let image_target_texture_2d =
            unsafe { resolve::<GlEglImageTargetTexture2dOes>(resolver, c"glEGLImageTargetTexture2DOES")? };
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
        Ok(Self {
            gl,
            glow,
            image_target_texture_2d,
            wait_sync_supported: sync_objects_supported(&version),
        })
    }

    fn new_texture(&self) -> Result<u32> {
        let texture = self.gl.gen_textures(1).first().copied().unwrap_or(0);
        if texture == 0 {
            return Err(BridgeError::ResourceExhausted("glGenTextures returned no name".to_string()));
        }
        self.gl.bind_texture(gl::TEXTURE_2D, texture);
        self.gl
            .tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as gl::GLint);
        self.gl
            .tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as gl::GLint);
        self.gl
            .tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as gl::GLint);
        self.gl
            .tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as gl::GLint);
        Ok(texture)
    }
}

impl CompositorGpu for GlCompositor {
    fn wait_fence(&self, fence: u64) {
        if fence == 0 || !self.wait_sync_supported {
            return;
        }
        let sync = glow::NativeFence(fence as usize as *mut _);
        unsafe {
            self.glow.wait_sync(sync, 0, u64::MAX);
        }
    }

    fn import_share_handle(&self, share_handle: u64) -> Result<u32> {
        let texture = self.new_texture()?;
        unsafe {
            (self.image_target_texture_2d)(gl::TEXTURE_2D, share_handle as usize as EglImage);
        }
        let error = self.gl.get_error();
        self.gl.bind_texture(gl::TEXTURE_2D, 0);
        if error != gl::NO_ERROR {
            self.gl.delete_textures(&[texture]);
            return Err(BridgeError::ResourceExhausted(format!(
                "glEGLImageTargetTexture2DOES failed ({error:#x})"
            )));
        }
        Ok(texture)
    }

    fn delete_texture(&self, texture: u32) {
        if texture != 0 {
            self.gl.delete_textures(&[texture]);
        }
    }

    fn create_placeholder(&self) -> Result<u32> {
        let texture = self.new_texture()?;
        self.gl.tex_image_2d(
            gl::TEXTURE_2D,
            0,
            gl::RGBA as gl::GLint,
            1,
            1,
            0,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            Some(&[0, 0, 0, 0xff]),
        );
        self.gl.bind_texture(gl::TEXTURE_2D, 0);
        Ok(texture)
    }
}
