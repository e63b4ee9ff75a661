//! ### English
//! C ABI bindings for the bridge lifecycle and the method channel.
//!
//! ### 中文
//! 桥接层生命周期与方法通道相关的 C ABI 绑定。

use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;

use serde_json::{Value, json};

use super::host::{FfiEngine, FfiHost, KitVideoEngineVTable, KitVideoGetProcAddress, KitVideoHostVTable};
use super::texture::TextureHost;
use crate::engine::engine_api::GetProcAddress;
use crate::engine::flags::KIT_VIDEO_FLAG_KNOWN_MASK;
use crate::engine::protocol::{self, MethodResponse};
use crate::engine::rendering::{EglDeviceFactory, GpuDeviceFactory};
use crate::engine::{BridgeConfig, VideoOutputManager};

/// Method call succeeded; the output holds the JSON result.
pub const KIT_VIDEO_METHOD_SUCCESS: i32 = 0;
/// Method name not recognized; the output is NULL.
pub const KIT_VIDEO_METHOD_NOT_IMPLEMENTED: i32 = 1;
/// Method failed; the output holds `{"code": ..., "message": ...}`.
pub const KIT_VIDEO_METHOD_ERROR: i32 = 2;
/// NULL bridge or method name, or non-UTF-8 input.
pub const KIT_VIDEO_METHOD_INVALID: i32 = -1;

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// The compositor's GL environment. With a NULL `get_proc_address` or `display` every session
/// renders in software.
///
/// ### 中文
/// 合成器的 GL 环境。`get_proc_address` 或 `display` 为 NULL 时所有会话都使用软件渲染。
pub struct KitVideoGlConfig {
    pub get_proc_address: Option<KitVideoGetProcAddress>,
    pub get_proc_address_ctx: *mut c_void,
    /// `EGLDisplay` shared with the compositor.
    pub display: *mut c_void,
    /// ### English
    /// Compositor `EGLContext` to share objects with, or NULL (`EGL_NO_CONTEXT`).
    ///
    /// ### 中文
    /// 用于共享对象的合成器 `EGLContext`，或 NULL（`EGL_NO_CONTEXT`）。
    pub share_context: *mut c_void,
}

/// ### English
/// Opaque bridge handle owning every video output session.
///
/// ### 中文
/// 不透明桥接句柄，持有所有视频输出会话。
pub struct KitVideoBridge {
    manager: VideoOutputManager,
}

fn resolver_from(gl: &KitVideoGlConfig) -> Option<GetProcAddress> {
    let resolve = gl.get_proc_address?;
    let ctx = gl.get_proc_address_ctx as usize;
    Some(Arc::new(move |name: &CStr| unsafe { resolve(ctx as *mut c_void, name.as_ptr()) }))
}

#[unsafe(no_mangle)]
/// ### English
/// Creates a bridge. `engine` and `host` are copied; `gl` may be NULL (software only).
/// `flags` is a `KIT_VIDEO_FLAG_*` bitmask. Returns NULL when a required table is NULL.
///
/// ### 中文
/// 创建桥接实例。`engine` 与 `host` 会被拷贝；`gl` 可为 NULL（仅软件渲染）。
/// `flags` 为 `KIT_VIDEO_FLAG_*` 位掩码。必需的函数表为 NULL 时返回 NULL。
pub unsafe extern "C" fn kit_video_bridge_create(
    engine: *const KitVideoEngineVTable,
    host: *const KitVideoHostVTable,
    gl: *const KitVideoGlConfig,
    flags: u32,
) -> *mut KitVideoBridge {
    if engine.is_null() || host.is_null() {
        return std::ptr::null_mut();
    }
    let engine = unsafe { *engine };
    let host = unsafe { *host };
    let gl = unsafe { gl.as_ref() }.copied();

    if flags & !KIT_VIDEO_FLAG_KNOWN_MASK != 0 {
        tracing::debug!(flags, "ignoring unknown flag bits");
    }

    let resolver = gl.as_ref().and_then(resolver_from);
    let gpu = match (gl, &resolver) {
        (Some(gl), Some(resolver)) if !gl.display.is_null() => {
            let factory: Arc<dyn GpuDeviceFactory> = Arc::new(EglDeviceFactory {
                resolver: Arc::clone(resolver),
                display: gl.display as usize,
                share_context: gl.share_context as usize,
            });
            Some(factory)
        }
        _ => None,
    };

    let host = Arc::new(FfiHost::new(host, Arc::new(TextureHost::new(resolver))));
    let config = BridgeConfig::new(Arc::new(FfiEngine::new(engine)), host.clone(), host, gpu)
        .with_flags(flags & KIT_VIDEO_FLAG_KNOWN_MASK);
    tracing::info!(hardware = config.gpu.is_some() && config.hardware_enabled, "video bridge created");

    Box::into_raw(Box::new(KitVideoBridge {
        manager: VideoOutputManager::new(config),
    }))
}

#[unsafe(no_mangle)]
/// ### English
/// Destroys a bridge created by `kit_video_bridge_create`, tearing down every live session
/// without waiting for unregister confirmations.
///
/// ### 中文
/// 销毁由 `kit_video_bridge_create` 创建的桥接实例，拆除所有存活会话，且不等待注销确认。
pub unsafe extern "C" fn kit_video_bridge_destroy(bridge: *mut KitVideoBridge) {
    if bridge.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(bridge));
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Handles one `VideoOutputManager.*` method call.
///
/// `args_json` is a JSON object (NULL is treated as `null`). On `KIT_VIDEO_METHOD_SUCCESS` and
/// `KIT_VIDEO_METHOD_ERROR`, `*out_json` receives a string to free with
/// `kit_video_bridge_string_free`; otherwise it is set to NULL.
///
/// ### 中文
/// 处理一次 `VideoOutputManager.*` 方法调用。
///
/// `args_json` 为 JSON 对象（NULL 视为 `null`）。返回 `KIT_VIDEO_METHOD_SUCCESS` 或
/// `KIT_VIDEO_METHOD_ERROR` 时，`*out_json` 会得到一个需用 `kit_video_bridge_string_free`
/// 释放的字符串；其他情况下置为 NULL。
pub unsafe extern "C" fn kit_video_bridge_handle_method_call(
    bridge: *const KitVideoBridge,
    method: *const c_char,
    args_json: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    if !out_json.is_null() {
        unsafe { *out_json = std::ptr::null_mut() };
    }
    if bridge.is_null() {
        return KIT_VIDEO_METHOD_INVALID;
    }
    let Some(method) = (unsafe { super::cstr_to_str(method) }) else {
        return KIT_VIDEO_METHOD_INVALID;
    };
    let args = if args_json.is_null() {
        Value::Null
    } else {
        let Some(text) = (unsafe { super::cstr_to_str(args_json) }) else {
            return KIT_VIDEO_METHOD_INVALID;
        };
        match serde_json::from_str(text) {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(method, %err, "method arguments are not valid JSON");
                return write_output(
                    out_json,
                    KIT_VIDEO_METHOD_ERROR,
                    json!({"code": "INVALID_ARGUMENTS", "message": err.to_string()}),
                );
            }
        }
    };

    let manager = unsafe { &(*bridge).manager };
    match protocol::handle_method_call(manager, method, &args) {
        MethodResponse::Success(result) => write_output(out_json, KIT_VIDEO_METHOD_SUCCESS, result),
        MethodResponse::NotImplemented => KIT_VIDEO_METHOD_NOT_IMPLEMENTED,
        MethodResponse::Error { code, message } => write_output(
            out_json,
            KIT_VIDEO_METHOD_ERROR,
            json!({"code": code, "message": message}),
        ),
    }
}

fn write_output(out_json: *mut *mut c_char, status: i32, value: Value) -> i32 {
    if out_json.is_null() {
        return status;
    }
    // serde_json never emits interior NULs (they are escaped).
    if let Ok(text) = CString::new(value.to_string()) {
        unsafe { *out_json = text.into_raw() };
    }
    status
}

#[unsafe(no_mangle)]
/// ### English
/// Frees a string returned by the bridge. NULL is ignored.
///
/// ### 中文
/// 释放桥接层返回的字符串。传入 NULL 时忽略。
pub unsafe extern "C" fn kit_video_bridge_string_free(text: *mut c_char) {
    if text.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(text));
    }
}
