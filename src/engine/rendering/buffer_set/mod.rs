//! ### English
//! Producer side of the frame hand-off: owns every buffer generation of one session.
//!
//! A resize never touches buffers the consumer may still sample. It allocates a complete new
//! generation and retires the old one; retired generations are destroyed once the consumer has
//! acknowledged a newer generation, or at dispose.
//!
//! ### 中文
//! 帧交接的生产者侧：持有单个会话的全部缓冲代。
//!
//! 尺寸变化从不触碰消费者可能仍在采样的缓冲：它会分配一整代新缓冲并让旧代退役；
//! 退役的代在消费者确认了更新的代之后（或在销毁时）才会被释放。

mod buffer;

use std::sync::Arc;

use dpi::PhysicalSize;

use crate::engine::engine_api::{RenderContext, RenderTarget};
use crate::engine::error::{BridgeError, Result};
use crate::engine::frame::{
    GenerationShared, INITIAL_BACK_SLOT, INITIAL_FRONT_SLOT, INITIAL_MAILBOX_SLOT, SharedFrameState,
    TRIPLE_BUFFER_COUNT,
};

use super::backend::RenderBackend;

pub(crate) use buffer::{FrameBuffer, SOFTWARE_BYTES_PER_PIXEL};

/// ### English
/// One generation: the shared description plus the producer-owned storage.
///
/// ### 中文
/// 一代缓冲：共享描述加上生产者持有的存储。
struct Generation {
    shared: Arc<GenerationShared>,
    buffers: [Option<FrameBuffer>; TRIPLE_BUFFER_COUNT],
}

impl Generation {
    fn number(&self) -> u64 {
        self.shared.generation()
    }

    fn release(mut self, backend: &mut RenderBackend) {
        for (index, buffer) in self.buffers.iter_mut().enumerate() {
            if let Some(buffer) = buffer.take() {
                buffer.release(backend, self.shared.slot(index));
            }
        }
    }
}

/// ### English
/// Frame buffer set (triple buffer with generations). Lives on the render thread.
///
/// ### 中文
/// 帧缓冲集合（带代号的三缓冲）。存活于渲染线程。
pub struct FrameBufferSet {
    frame: Arc<SharedFrameState>,
    current: Option<Generation>,
    retired: Vec<Generation>,
    next_generation: u64,
    /// Slot of the current generation the producer renders into next.
    back: usize,
    /// ### English
    /// Never-published slots of the current generation. Publishing can hand back at most two
    /// tokens of older generations (the mailbox word and the consumer's front at the time of the
    /// resize), and each one is replaced by a slot from here.
    ///
    /// ### 中文
    /// 当前代中从未发布过的槽位。发布最多会换回两个旧代令牌（resize 时邮箱中的字与消费者的前缓冲），
    /// 每个旧代令牌都由这里的一个槽位替代。
    spare: Vec<usize>,
    rendered: bool,
}

impl FrameBufferSet {
    pub fn new(frame: Arc<SharedFrameState>) -> Self {
        Self {
            frame,
            current: None,
            retired: Vec::new(),
            next_generation: 1,
            back: INITIAL_BACK_SLOT,
            spare: Vec::new(),
            rendered: false,
        }
    }

    /// Size of the current generation, `None` before the first allocation.
    pub fn size(&self) -> Option<PhysicalSize<u32>> {
        self.current.as_ref().map(|current| current.shared.size())
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.current.as_ref().map(Generation::number)
    }

    pub fn retired_generations(&self) -> usize {
        self.retired.len()
    }

    /// ### English
    /// Makes sure buffers of `size` exist.
    ///
    /// Returns `Ok(false)` when the current generation already has that size (no GPU work),
    /// `Ok(true)` when a new generation was allocated. On allocation failure the previous
    /// generation stays current so the last frame remains displayable.
    ///
    /// The GPU context must be current.
    ///
    /// ### 中文
    /// 确保存在 `size` 尺寸的缓冲。
    ///
    /// 当前代已是该尺寸时返回 `Ok(false)`（不做任何 GPU 操作）；分配了新一代时返回 `Ok(true)`。
    /// 分配失败时旧代保持为当前代，最后一帧仍可显示。
    ///
    /// 调用时 GPU 上下文必须是 current。
    pub fn check_and_resize(&mut self, backend: &mut RenderBackend, size: PhysicalSize<u32>) -> Result<bool> {
        if self.size() == Some(size) {
            return Ok(false);
        }
        if size.width == 0 || size.height == 0 {
            return Err(BridgeError::ResourceExhausted(format!(
                "cannot allocate {}x{} buffers",
                size.width, size.height
            )));
        }

        let number = self.next_generation;
        let generation = allocate_generation(backend, number, size)?;
        self.next_generation += 1;
        self.frame.install_generation(Arc::clone(&generation.shared));
        if let Some(previous) = self.current.replace(generation) {
            self.retired.push(previous);
        }
        self.back = INITIAL_BACK_SLOT;
        self.spare = vec![INITIAL_FRONT_SLOT, INITIAL_MAILBOX_SLOT];
        self.rendered = false;
        tracing::debug!(generation = number, width = size.width, height = size.height, "allocated buffer generation");

        self.collect_retired(backend);
        Ok(true)
    }

    /// ### English
    /// Renders the next frame into the back buffer and stamps its fence.
    ///
    /// Returns `Ok(false)` when no buffers exist yet.
    ///
    /// ### 中文
    /// 把下一帧渲染到后缓冲并打上 fence。
    ///
    /// 尚无缓冲时返回 `Ok(false)`。
    pub fn render(&mut self, backend: &mut RenderBackend, context: &mut dyn RenderContext) -> Result<bool> {
        let Some(current) = self.current.as_ref() else {
            return Ok(false);
        };
        let slot = current.shared.slot(self.back);
        let size = current.shared.size();

        match (&current.buffers[self.back], backend) {
            (Some(FrameBuffer::Gpu(objects)), RenderBackend::Hardware(device)) => {
                // Fence left over from the previous time this buffer was rendered.
                device.wait_and_delete_fence(slot.take_fence());
                device.bind_buffer(objects);
                context.render(RenderTarget::Framebuffer {
                    fbo: objects.framebuffer,
                    size,
                    flip_y: false,
                })?;
                slot.store_fence(device.insert_fence());
            }
            (Some(FrameBuffer::Cpu), _) => {
                let mut pixels = slot.lock_pixels();
                context.render(RenderTarget::Software {
                    size,
                    stride: current.shared.stride(),
                    pixels: pixels.as_mut_slice(),
                })?;
            }
            _ => {
                return Err(BridgeError::Engine(
                    "buffer storage does not match the render backend".to_string(),
                ));
            }
        }
        self.rendered = true;
        Ok(true)
    }

    /// ### English
    /// Publishes the freshly rendered back buffer and takes the displaced buffer as the new back
    /// buffer. Never blocks.
    ///
    /// ### 中文
    /// 发布刚渲染好的后缓冲，并把被换出的缓冲作为新的后缓冲。从不阻塞。
    pub fn publish(&mut self) {
        let Some(current) = self.current.as_ref() else {
            return;
        };
        if !std::mem::take(&mut self.rendered) {
            return;
        }
        let generation = current.number();
        let displaced = self.frame.publish(generation, self.back);
        self.back = if displaced.generation == generation {
            displaced.slot
        } else {
            match self.spare.pop() {
                Some(slot) => slot,
                None => {
                    tracing::error!(generation, ?displaced, "no spare buffer for a stale mailbox token");
                    displaced.slot
                }
            }
        };
    }

    /// ### English
    /// Destroys retired generations older than the consumer's acknowledged generation.
    ///
    /// ### 中文
    /// 销毁比消费者已确认代更旧的退役代。
    pub fn collect_retired(&mut self, backend: &mut RenderBackend) {
        if self.retired.is_empty() {
            return;
        }
        let acknowledged = self.frame.acknowledged_generation();
        let (release, keep): (Vec<_>, Vec<_>) = self
            .retired
            .drain(..)
            .partition(|generation| generation.number() < acknowledged);
        self.retired = keep;
        for generation in release {
            let number = generation.number();
            generation.release(backend);
            self.frame.remove_generation(number);
            tracing::debug!(generation = number, "released retired buffer generation");
        }
    }

    /// ### English
    /// Releases every generation, current and retired. Only valid once the consumer can no
    /// longer reach the buffers (texture unregistered). The GPU context must be current.
    ///
    /// ### 中文
    /// 释放所有代（当前代与退役代）。仅当消费者已无法访问这些缓冲（纹理已注销）时才可调用。
    /// 调用时 GPU 上下文必须是 current。
    pub fn dispose(&mut self, backend: &mut RenderBackend) {
        for generation in self.retired.drain(..).chain(self.current.take()) {
            generation.release(backend);
        }
        self.frame.clear_generations();
        self.spare.clear();
        self.rendered = false;
    }
}

fn allocate_generation(
    backend: &mut RenderBackend,
    number: u64,
    size: PhysicalSize<u32>,
) -> Result<Generation> {
    let stride = match backend {
        RenderBackend::Hardware(_) => 0,
        RenderBackend::Software => size.width as usize * SOFTWARE_BYTES_PER_PIXEL,
    };

    let mut buffers: Vec<FrameBuffer> = Vec::with_capacity(TRIPLE_BUFFER_COUNT);
    let mut slots = Vec::with_capacity(TRIPLE_BUFFER_COUNT);
    for _ in 0..TRIPLE_BUFFER_COUNT {
        let allocated = match backend {
            RenderBackend::Hardware(device) => FrameBuffer::allocate_gpu(device.as_mut(), size),
            RenderBackend::Software => FrameBuffer::allocate_cpu(size, stride),
        };
        match allocated {
            Ok((buffer, slot)) => {
                buffers.push(buffer);
                slots.push(slot);
            }
            Err(err) => {
                for (buffer, slot) in buffers.into_iter().zip(slots.iter()) {
                    buffer.release(backend, slot);
                }
                return Err(err);
            }
        }
    }

    let slots: [_; TRIPLE_BUFFER_COUNT] = slots
        .try_into()
        .map_err(|_| BridgeError::ResourceExhausted("short buffer generation".to_string()))?;
    let mut buffers = buffers.into_iter();
    Ok(Generation {
        shared: Arc::new(GenerationShared::new(number, size, stride, slots)),
        buffers: std::array::from_fn(|_| buffers.next()),
    })
}

#[cfg(test)]
mod tests;
