//! ### English
//! C ABI surface for `kit_video_bridge`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`.
//! Strings crossing the boundary are NUL-terminated UTF-8. Strings returned by the bridge must be
//! freed with `kit_video_bridge_string_free`.
//!
//! ### 中文
//! `kit_video_bridge` 的 C ABI 接口层。
//!
//! 所有导出符号均为 `extern "C"` 函数；结构体使用 `#[repr(C)]`。
//! 跨边界的字符串均为 NUL 结尾的 UTF-8；桥接层返回的字符串必须用
//! `kit_video_bridge_string_free` 释放。
mod abi;
mod bridge;
mod host;
mod logging;
mod texture;

use std::ffi::{CStr, c_char};

/// ### English
/// C ABI version for `kit_video_bridge`.
///
/// ### 中文
/// `kit_video_bridge` 的 C ABI 版本号。
const KIT_VIDEO_BRIDGE_ABI_VERSION: u32 = 1;

/// ### English
/// Borrows a NUL-terminated UTF-8 C string. Returns `None` for NULL or invalid UTF-8.
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated string valid for `'a`.
///
/// ### 中文
/// 借用以 NUL 结尾的 UTF-8 C 字符串。NULL 或 UTF-8 非法时返回 `None`。
///
/// # Safety
/// `ptr` 必须为 NULL，或指向在 `'a` 期间有效、以 NUL 结尾的字符串。
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}
