//! ### English
//! Bitflags controlling bridge-wide behaviors.
//!
//! These are passed through the C ABI as a `u32` bitmask to `kit_video_bridge_create`.
//!
//! ### 中文
//! 控制桥接全局行为的位标志（bitflags）。
//!
//! 通过 C ABI 以 `u32` 位掩码传给 `kit_video_bridge_create`。

/// ### English
/// Never try a hardware GPU context; every session renders into CPU pixel buffers.
///
/// ### 中文
/// 从不尝试硬件 GPU 上下文；所有会话都渲染到 CPU 像素缓冲。
pub const KIT_VIDEO_FLAG_DISABLE_HARDWARE: u32 = 1 << 0;

/// ### English
/// Keep render threads at normal scheduling priority instead of requesting `SCHED_FIFO`.
///
/// ### 中文
/// 渲染线程保持普通调度优先级，不请求 `SCHED_FIFO`。
pub const KIT_VIDEO_FLAG_NO_REALTIME_PRIORITY: u32 = 1 << 1;

/// ### English
/// Mask of all known flag bits; unknown bits are ignored.
///
/// ### 中文
/// 所有已知标志位的掩码；未知位会被忽略。
pub const KIT_VIDEO_FLAG_KNOWN_MASK: u32 = KIT_VIDEO_FLAG_DISABLE_HARDWARE | KIT_VIDEO_FLAG_NO_REALTIME_PRIORITY;
