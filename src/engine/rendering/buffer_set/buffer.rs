//! ### English
//! Storage behind one frame buffer and its teardown order.
//!
//! ### 中文
//! 单个帧缓冲背后的存储及其销毁顺序。

use dpi::PhysicalSize;

use crate::engine::error::{BridgeError, Result};
use crate::engine::frame::SlotShared;
use crate::engine::rendering::backend::RenderBackend;
use crate::engine::rendering::device::{GpuBufferObjects, GpuDevice};

/// Bytes per software pixel (`rgb0`).
pub(crate) const SOFTWARE_BYTES_PER_PIXEL: usize = 4;

/// ### English
/// Producer-owned half of one buffer. The consumer-visible half is a [`SlotShared`].
///
/// ### 中文
/// 单个缓冲中由生产者持有的部分。对消费者可见的部分是 [`SlotShared`]。
#[derive(Debug)]
pub(crate) enum FrameBuffer {
    Gpu(GpuBufferObjects),
    /// Pixels live in the shared slot.
    Cpu,
}

impl FrameBuffer {
    /// ### English
    /// Allocates one GPU buffer and its consumer-visible description.
    ///
    /// ### 中文
    /// 分配一个 GPU 缓冲及其对消费者可见的描述。
    pub(crate) fn allocate_gpu(
        device: &mut dyn GpuDevice,
        size: PhysicalSize<u32>,
    ) -> Result<(Self, SlotShared)> {
        let objects = device.create_buffer(size)?;
        let shared = SlotShared::gpu(objects.share_handle, objects.texture);
        Ok((Self::Gpu(objects), shared))
    }

    /// ### English
    /// Allocates one zeroed software pixel buffer of `stride * height` bytes.
    ///
    /// ### 中文
    /// 分配一个 `stride * height` 字节、内容为 0 的软件像素缓冲。
    pub(crate) fn allocate_cpu(size: PhysicalSize<u32>, stride: usize) -> Result<(Self, SlotShared)> {
        let len = stride
            .checked_mul(size.height as usize)
            .ok_or_else(|| BridgeError::ResourceExhausted("pixel buffer size overflows".to_string()))?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|err| BridgeError::ResourceExhausted(format!("{len} byte pixel buffer: {err}")))?;
        pixels.resize(len, 0);
        Ok((Self::Cpu, SlotShared::software(pixels)))
    }

    /// ### English
    /// Frees the buffer. GPU order is fixed: producer fence, then share handle, then the texture
    /// and framebuffer, so no consumer-visible handle ever outlives the texture it names.
    ///
    /// The GPU context must be current.
    ///
    /// ### 中文
    /// 释放缓冲。GPU 释放顺序固定：先生产者 fence，再共享句柄，最后纹理与 framebuffer，
    /// 保证对消费者可见的句柄不会比其指向的纹理活得更久。
    ///
    /// 调用时 GPU 上下文必须是 current。
    pub(crate) fn release(self, backend: &mut RenderBackend, slot: &SlotShared) {
        match self {
            Self::Gpu(objects) => {
                let Some(device) = backend.device_mut() else {
                    tracing::error!(texture = objects.texture, "GPU buffer outlived its device");
                    return;
                };
                device.wait_and_delete_fence(slot.take_fence());
                device.destroy_share_handle(objects.share_handle);
                device.delete_buffer_objects(&objects);
            }
            Self::Cpu => {
                *slot.lock_pixels() = Vec::new();
            }
        }
    }
}
