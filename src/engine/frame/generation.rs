//! ### English
//! One generation of buffers: the three buffers allocated together for one output size.
//!
//! Everything here except the fences is fixed when the generation is created. A resize creates a
//! new generation instead of mutating this one, so a consumer that still holds an older buffer
//! keeps reading consistent metadata.
//!
//! ### 中文
//! 一代缓冲：为同一输出尺寸一起分配的三个缓冲。
//!
//! 除 fence 外，这里的所有字段在创建时即固定。尺寸变化会创建新一代而不是修改旧的，
//! 因此仍持有旧缓冲的消费者读到的元数据始终一致。

use std::sync::atomic::{AtomicU64, Ordering};

use dpi::PhysicalSize;
use parking_lot::{Mutex, MutexGuard};

use super::TRIPLE_BUFFER_COUNT;

/// ### English
/// Consumer-visible description of one buffer.
///
/// ### 中文
/// 单个缓冲对消费者可见的描述。
#[derive(Debug, Default)]
pub struct SlotShared {
    /// ### English
    /// Cross-context share handle (`EGLImage` as `u64`), 0 for software buffers.
    ///
    /// ### 中文
    /// 跨上下文共享句柄（`EGLImage` 转为 `u64`），软件缓冲为 0。
    share_handle: u64,
    /// Producer-side texture name (diagnostics only).
    texture: u32,
    /// ### English
    /// Producer fence (`GLsync` as `u64`) stamped after the last render, 0 if none.
    ///
    /// ### 中文
    /// 最后一次渲染后打上的生产者 fence（`GLsync` 转为 `u64`），无则为 0。
    fence: AtomicU64,
    /// ### English
    /// Pixel storage for software buffers; empty for GPU buffers.
    ///
    /// Only the role owner (back: producer, front: consumer) locks it, so the lock never
    /// contends.
    ///
    /// ### 中文
    /// 软件缓冲的像素存储；GPU 缓冲为空。
    ///
    /// 只有该角色的持有者（后缓冲：生产者，前缓冲：消费者）会加锁，因此锁从不争用。
    pixels: Mutex<Vec<u8>>,
}

impl SlotShared {
    pub fn gpu(share_handle: u64, texture: u32) -> Self {
        Self {
            share_handle,
            texture,
            fence: AtomicU64::new(0),
            pixels: Mutex::new(Vec::new()),
        }
    }

    pub fn software(pixels: Vec<u8>) -> Self {
        Self {
            share_handle: 0,
            texture: 0,
            fence: AtomicU64::new(0),
            pixels: Mutex::new(pixels),
        }
    }

    #[inline]
    pub fn share_handle(&self) -> u64 {
        self.share_handle
    }

    #[inline]
    pub fn texture(&self) -> u32 {
        self.texture
    }

    /// ### English
    /// Stores the producer fence. Release-paired with the consumer's acquire of the mailbox word.
    ///
    /// ### 中文
    /// 写入生产者 fence。与消费者对邮箱字的 acquire 配对（Release）。
    #[inline]
    pub fn store_fence(&self, fence: u64) {
        self.fence.store(fence, Ordering::Release);
    }

    #[inline]
    pub fn fence(&self) -> u64 {
        self.fence.load(Ordering::Acquire)
    }

    /// Takes the fence out, leaving 0 behind.
    #[inline]
    pub fn take_fence(&self) -> u64 {
        self.fence.swap(0, Ordering::AcqRel)
    }

    pub fn lock_pixels(&self) -> MutexGuard<'_, Vec<u8>> {
        self.pixels.lock()
    }
}

/// ### English
/// Immutable description of one buffer generation plus its per-slot fences.
///
/// ### 中文
/// 一代缓冲的不可变描述，以及每个槽位的 fence。
#[derive(Debug)]
pub struct GenerationShared {
    generation: u64,
    size: PhysicalSize<u32>,
    /// Bytes per row for software buffers, 0 for GPU buffers.
    stride: usize,
    slots: [SlotShared; TRIPLE_BUFFER_COUNT],
}

impl GenerationShared {
    pub fn new(
        generation: u64,
        size: PhysicalSize<u32>,
        stride: usize,
        slots: [SlotShared; TRIPLE_BUFFER_COUNT],
    ) -> Self {
        Self {
            generation,
            size,
            stride,
            slots,
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn slot(&self, slot: usize) -> &SlotShared {
        &self.slots[slot]
    }
}
