//! ### English
//! Cache-line padding used to keep the mailbox word and the consumer acknowledgement counter
//! on separate lines (producer and compositor threads hammer them independently).
//!
//! ### 中文
//! cache line 填充工具：把邮箱字与消费者确认计数放在不同的 cache line 上
//! （生产者线程与合成器线程会分别频繁访问它们）。

/// ### English
/// Target cache line size in bytes.
///
/// ### 中文
/// 目标 cache line 大小（字节）。
pub(crate) const CACHE_LINE_BYTES: usize = 64;

/// ### English
/// Bytes of padding that follow a single `T` so the next field starts on a fresh cache line.
/// Pair with `#[repr(C, align(64))]`.
///
/// ### 中文
/// 单个 `T` 字段之后所需的填充字节数，使下一个字段从新的 cache line 开始。
/// 需配合 `#[repr(C, align(64))]` 使用。
#[inline]
pub(crate) const fn pad_after<T>() -> usize {
    let used = std::mem::size_of::<T>() % CACHE_LINE_BYTES;
    if used == 0 { 0 } else { CACHE_LINE_BYTES - used }
}
