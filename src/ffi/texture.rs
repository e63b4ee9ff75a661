//! ### English
//! Compositor-side C ABI: the texture object handed to the host and the populate / copy-pixels
//! calls the host makes on its compositor thread.
//!
//! ### 中文
//! 合成器侧 C ABI：交给宿主的纹理对象，以及宿主在合成器线程上发起的 populate / copy-pixels 调用。

use std::cell::RefCell;
use std::sync::Arc;

use crate::engine::engine_api::{GetProcAddress, TextureKind};
use crate::engine::rendering::texture::{GlCompositor, VideoTexture};

thread_local! {
    /// GL entry points of the compositor context current on this thread.
    static COMPOSITOR: RefCell<Option<GlCompositor>> = const { RefCell::new(None) };
}

/// ### English
/// What compositor threads need to talk to their own GL context.
///
/// ### 中文
/// 合成器线程访问其自身 GL 上下文所需的信息。
pub(crate) struct TextureHost {
    resolver: Option<GetProcAddress>,
}

impl TextureHost {
    pub(crate) fn new(resolver: Option<GetProcAddress>) -> Self {
        Self { resolver }
    }

    /// ### English
    /// Runs `f` with this thread's compositor GL bindings, loading them on first use.
    ///
    /// ### 中文
    /// 使用本线程的合成器 GL 绑定执行 `f`，首次使用时加载。
    fn with_compositor<R>(&self, f: impl FnOnce(&GlCompositor) -> R) -> Option<R> {
        COMPOSITOR.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                let resolver = self.resolver.as_ref()?;
                match GlCompositor::load(resolver) {
                    Ok(compositor) => *slot = Some(compositor),
                    Err(err) => {
                        tracing::warn!(%err, "compositor GL bindings unavailable");
                        return None;
                    }
                }
            }
            slot.as_ref().map(f)
        })
    }
}

/// ### English
/// Opaque texture handle owned by the host between `register_texture` and
/// `kit_video_bridge_texture_release`.
///
/// ### 中文
/// 不透明纹理句柄，在 `register_texture` 与 `kit_video_bridge_texture_release` 之间归宿主所有。
pub struct KitVideoTexture {
    texture: Arc<VideoTexture>,
    host: Arc<TextureHost>,
}

impl KitVideoTexture {
    pub(crate) fn into_raw(texture: Arc<VideoTexture>, host: Arc<TextureHost>) -> *mut Self {
        Box::into_raw(Box::new(Self { texture, host }))
    }

    /// # Safety
    /// `raw` must come from [`KitVideoTexture::into_raw`] and not be used afterwards.
    pub(crate) unsafe fn free(raw: *mut Self) {
        drop(unsafe { Box::from_raw(raw) });
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
/// ### English
/// GL texture the compositor should sample this frame.
///
/// ### 中文
/// 合成器本帧应采样的 GL 纹理。
pub struct KitVideoGlTexture {
    pub target: u32,
    pub name: u32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
/// ### English
/// CPU pixel buffer (4 bytes per pixel, tightly packed rows) the compositor should upload.
///
/// ### 中文
/// 合成器应上传的 CPU 像素缓冲（每像素 4 字节，行紧密排列）。
pub struct KitVideoPixelBuffer {
    /// ### English
    /// Valid until the next `kit_video_bridge_copy_pixels` or release call on the same texture.
    ///
    /// ### 中文
    /// 在同一纹理的下一次 `kit_video_bridge_copy_pixels` 或 release 调用之前有效。
    pub pixels: *const u8,
    pub width: u32,
    pub height: u32,
}

#[unsafe(no_mangle)]
/// ### English
/// Returns the GL texture to draw for a `TextureKind::Gl` texture. Never blocks on the render
/// thread; before the first frame a 1×1 placeholder is returned.
///
/// Must be called on the compositor thread with the compositor GL context current.
///
/// ### 中文
/// 返回 `TextureKind::Gl` 纹理本帧应绘制的 GL 纹理。不会阻塞等待渲染线程；
/// 首帧之前返回 1×1 占位纹理。
///
/// 必须在合成器线程上、且合成器 GL 上下文为 current 时调用。
pub unsafe extern "C" fn kit_video_bridge_populate_gl(
    texture: *const KitVideoTexture,
    out: *mut KitVideoGlTexture,
) -> bool {
    if texture.is_null() || out.is_null() {
        return false;
    }
    let texture = unsafe { &*texture };
    if texture.texture.kind() != TextureKind::Gl {
        return false;
    }
    let populated = texture
        .host
        .with_compositor(|compositor| texture.texture.populate(compositor));
    let Some(populated) = populated else {
        return false;
    };
    unsafe {
        *out = KitVideoGlTexture {
            target: populated.target,
            name: populated.name,
            width: populated.width,
            height: populated.height,
        };
    }
    true
}

#[unsafe(no_mangle)]
/// ### English
/// Returns the latest pixel buffer of a `TextureKind::PixelBuffer` texture. Never blocks on the
/// render thread.
///
/// ### 中文
/// 返回 `TextureKind::PixelBuffer` 纹理的最新像素缓冲。不会阻塞等待渲染线程。
pub unsafe extern "C" fn kit_video_bridge_copy_pixels(
    texture: *const KitVideoTexture,
    out: *mut KitVideoPixelBuffer,
) -> bool {
    if texture.is_null() || out.is_null() {
        return false;
    }
    let texture = unsafe { &*texture };
    if texture.texture.kind() != TextureKind::PixelBuffer {
        return false;
    }
    let view = texture.texture.copy_pixels();
    unsafe {
        *out = KitVideoPixelBuffer {
            pixels: view.pixels,
            width: view.width,
            height: view.height,
        };
    }
    true
}

#[unsafe(no_mangle)]
/// ### English
/// Releases the compositor-side objects of `texture` and frees it. Call it on the compositor
/// thread (GL context current) from the host's unregister path, before signalling completion.
///
/// ### 中文
/// 释放 `texture` 的合成器侧对象并释放句柄本身。应在宿主注销流程中、于合成器线程上
/// （GL 上下文为 current）调用，且须在通知完成之前。
pub unsafe extern "C" fn kit_video_bridge_texture_release(texture: *mut KitVideoTexture) {
    if texture.is_null() {
        return;
    }
    let owned = unsafe { Box::from_raw(texture) };
    if owned.texture.kind() == TextureKind::Gl {
        owned
            .host
            .with_compositor(|compositor| owned.texture.release_compositor_objects(compositor));
    }
}
