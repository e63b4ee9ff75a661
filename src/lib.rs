/// ### English
/// `kit_video_bridge` crate root.
/// Exposes the C ABI via `ffi`; the frame hand-off core lives under `engine`.
///
/// ### 中文
/// `kit_video_bridge` 的 crate 根。
/// 通过 `ffi` 导出 C ABI；帧交接核心实现位于 `engine` 模块。
pub mod engine;
mod ffi;
