//! ### English
//! Texture adapter registered with the host compositor.
//!
//! `populate` / `copy_pixels` run on the compositor thread and never block on the render
//! thread: before the first frame they return a placeholder, afterwards the most recent frame.
//!
//! ### 中文
//! 注册到宿主合成器的纹理适配器。
//!
//! `populate` / `copy_pixels` 运行在合成器线程上，从不阻塞等待渲染线程：
//! 首帧之前返回占位纹理，之后返回最新的一帧。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::engine::engine_api::TextureKind;
use crate::engine::error::Result;
use crate::engine::frame::{
    GenerationShared, INITIAL_FRONT_SLOT, MailboxWord, SharedFrameState, TRIPLE_BUFFER_COUNT,
};

use super::compositor::{CompositorGpu, GL_TEXTURE_2D};

/// `rgb0` pixel shown by software textures before the first frame.
static PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 0xff];

/// ### English
/// Result of a GL populate call.
///
/// ### 中文
/// GL populate 调用的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopulatedTexture {
    pub target: u32,
    pub name: u32,
    pub width: u32,
    pub height: u32,
}

impl PopulatedTexture {
    fn placeholder(name: u32) -> Self {
        Self {
            target: GL_TEXTURE_2D,
            name,
            width: 1,
            height: 1,
        }
    }
}

/// ### English
/// Result of a software copy-pixels call.
///
/// `pixels` stays valid until the next `copy_pixels` call on the same texture or until the
/// texture is unregistered, whichever comes first.
///
/// ### 中文
/// 软件 copy-pixels 调用的结果。
///
/// `pixels` 在同一纹理的下一次 `copy_pixels` 调用或纹理注销之前（以先发生者为准）保持有效。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBufferView {
    pub pixels: *const u8,
    pub width: u32,
    pub height: u32,
}

impl PixelBufferView {
    fn placeholder() -> Self {
        Self {
            pixels: PLACEHOLDER_PIXEL.as_ptr(),
            width: 1,
            height: 1,
        }
    }
}

struct ConsumerState {
    /// Buffer the consumer currently owns.
    front: MailboxWord,
    /// Generation of `front` once it is displayable.
    generation: Option<Arc<GenerationShared>>,
    /// Compositor textures imported from `generation`, per slot.
    imported: [Option<u32>; TRIPLE_BUFFER_COUNT],
    placeholder: Option<u32>,
    shown: Option<PopulatedTexture>,
    shown_slot: Option<usize>,
    /// A generation switch failed and is retried on the next populate.
    switch_pending: bool,
    released: bool,
}

/// ### English
/// Consumer endpoint of one session's frame hand-off.
///
/// ### 中文
/// 单个会话帧交接的消费者端点。
pub struct VideoTexture {
    frame: Arc<SharedFrameState>,
    kind: TextureKind,
    init_requested: AtomicBool,
    /// ### English
    /// Asks the render thread to allocate buffers. Must only post, never wait.
    ///
    /// ### 中文
    /// 请求渲染线程分配缓冲。只能投递，不能等待。
    request_init: Box<dyn Fn() + Send + Sync>,
    consumer: Mutex<ConsumerState>,
}

impl VideoTexture {
    pub fn new(
        frame: Arc<SharedFrameState>,
        kind: TextureKind,
        request_init: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            frame,
            kind,
            init_requested: AtomicBool::new(false),
            request_init: Box::new(request_init),
            consumer: Mutex::new(ConsumerState {
                front: MailboxWord::clean(0, INITIAL_FRONT_SLOT),
                generation: None,
                imported: [None; TRIPLE_BUFFER_COUNT],
                placeholder: None,
                shown: None,
                shown_slot: None,
                switch_pending: false,
                released: false,
            }),
        }
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    fn request_first_allocation(&self) {
        if !self.init_requested.swap(true, Ordering::AcqRel) {
            (self.request_init)();
        }
    }

    /// ### English
    /// Returns the texture the compositor should draw now.
    ///
    /// When a new frame was published it is taken and its producer fence is waited on in the
    /// compositor context. Switching to a new buffer generation imports all of its buffers at
    /// once, deletes the old imports and only then acknowledges the generation so the producer
    /// can free the old buffers. If the import fails the consumer stays on the old generation,
    /// which the producer never writes again, and retries on the next call.
    ///
    /// #### Parameters
    /// - `gpu`: Compositor context operations (context must be current).
    ///
    /// ### 中文
    /// 返回合成器当前应绘制的纹理。
    ///
    /// 若有新发布的帧则取出它，并在合成器上下文中等待其生产者 fence。切换到新的缓冲代时一次性导入
    /// 该代的全部缓冲，删除旧的导入纹理，然后才确认该代，使生产者可以释放旧缓冲。
    /// 若导入失败，消费者停留在旧代（生产者不会再写入旧代），并在下一次调用时重试。
    ///
    /// #### 参数
    /// - `gpu`：合成器上下文操作（上下文必须为 current）。
    pub fn populate(&self, gpu: &dyn CompositorGpu) -> PopulatedTexture {
        self.request_first_allocation();
        let mut guard = self.consumer.lock();
        let state = &mut *guard;
        if state.released {
            return PopulatedTexture::placeholder(0);
        }

        let fresh = match self.frame.take_latest(state.front) {
            Some(word) => {
                state.front = word;
                true
            }
            None => false,
        };
        if fresh || state.switch_pending {
            self.show_gl_frame(state, gpu);
        }

        if let Some(shown) = state.shown {
            return shown;
        }
        let name = match state.placeholder {
            Some(name) => name,
            None => match gpu.create_placeholder() {
                Ok(name) => {
                    state.placeholder = Some(name);
                    name
                }
                Err(err) => {
                    tracing::warn!(%err, "placeholder texture unavailable");
                    0
                }
            },
        };
        PopulatedTexture::placeholder(name)
    }

    fn show_gl_frame(&self, state: &mut ConsumerState, gpu: &dyn CompositorGpu) {
        let word = state.front;
        let on_generation = matches!(&state.generation, Some(shown) if shown.generation() == word.generation);
        if !on_generation && !self.switch_generation(state, gpu, word) {
            return;
        }
        let Some(generation) = state.generation.as_ref() else {
            return;
        };
        // Every slot of the shown generation was imported by `switch_generation`.
        let Some(name) = state.imported[word.slot] else {
            return;
        };

        gpu.wait_fence(generation.slot(word.slot).fence());
        let size = generation.size();
        state.shown = Some(PopulatedTexture {
            target: GL_TEXTURE_2D,
            name,
            width: size.width,
            height: size.height,
        });
    }

    /// ### English
    /// Moves the consumer onto the generation of `word`. Returns `false` (and changes nothing
    /// that is displayed) when the generation is gone or cannot be imported.
    ///
    /// ### 中文
    /// 把消费者切换到 `word` 所属的代。若该代已不存在或无法导入则返回 `false`，已显示的内容不变。
    fn switch_generation(&self, state: &mut ConsumerState, gpu: &dyn CompositorGpu, word: MailboxWord) -> bool {
        let Some(generation) = self.frame.generation(word.generation) else {
            tracing::warn!(generation = word.generation, "published buffer generation is gone");
            state.switch_pending = false;
            return false;
        };
        let names = match import_generation(gpu, &generation) {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(%err, generation = word.generation, "keeping previous frame");
                state.switch_pending = true;
                return false;
            }
        };

        for previous in state.imported.iter_mut().filter_map(Option::take) {
            gpu.delete_texture(previous);
        }
        if let Some(placeholder) = state.placeholder.take() {
            gpu.delete_texture(placeholder);
        }
        state.imported = names.map(Some);
        self.frame.acknowledge_generation(generation.generation());
        state.generation = Some(generation);
        state.switch_pending = false;
        true
    }

    /// ### English
    /// Software variant of [`VideoTexture::populate`]: returns the pixels of the newest frame.
    ///
    /// ### 中文
    /// [`VideoTexture::populate`] 的软件版本：返回最新一帧的像素。
    pub fn copy_pixels(&self) -> PixelBufferView {
        self.request_first_allocation();
        let mut guard = self.consumer.lock();
        let state = &mut *guard;

        if !state.released {
            if let Some(word) = self.frame.take_latest(state.front) {
                state.front = word;
                if let Some(generation) = self.generation_for(state, word) {
                    if !matches!(&state.generation, Some(shown) if Arc::ptr_eq(shown, &generation)) {
                        self.frame.acknowledge_generation(generation.generation());
                        state.generation = Some(generation);
                    }
                    state.shown_slot = Some(word.slot);
                }
            }
        }

        match (&state.generation, state.shown_slot) {
            (Some(generation), Some(slot)) if !state.released => {
                let size = generation.size();
                let pixels = generation.slot(slot).lock_pixels();
                // Emptied once the render thread released the generation.
                if pixels.len() < generation.stride() * size.height as usize {
                    return PixelBufferView::placeholder();
                }
                PixelBufferView {
                    pixels: pixels.as_ptr(),
                    width: size.width,
                    height: size.height,
                }
            }
            _ => PixelBufferView::placeholder(),
        }
    }

    fn generation_for(&self, state: &ConsumerState, word: MailboxWord) -> Option<Arc<GenerationShared>> {
        if let Some(shown) = &state.generation {
            if shown.generation() == word.generation {
                return Some(Arc::clone(shown));
            }
        }
        let found = self.frame.generation(word.generation);
        if found.is_none() {
            tracing::warn!(generation = word.generation, "published buffer generation is gone");
        }
        found
    }

    /// ### English
    /// Deletes every compositor-side object. Called on the compositor thread while the texture
    /// is being unregistered; later populate calls return an empty texture.
    ///
    /// ### 中文
    /// 删除所有合成器侧对象。在纹理注销期间于合成器线程上调用；之后的 populate 调用返回空纹理。
    pub fn release_compositor_objects(&self, gpu: &dyn CompositorGpu) {
        let mut guard = self.consumer.lock();
        let state = &mut *guard;
        for name in state
            .imported
            .iter_mut()
            .filter_map(Option::take)
            .chain(state.placeholder.take())
        {
            gpu.delete_texture(name);
        }
        state.generation = None;
        state.shown = None;
        state.shown_slot = None;
        state.switch_pending = false;
        state.released = true;
    }
}

/// ### English
/// Imports every buffer of `generation` into the compositor context. On failure the textures
/// imported so far are deleted again.
///
/// ### 中文
/// 把 `generation` 的全部缓冲导入合成器上下文。失败时删除已导入的纹理。
fn import_generation(
    gpu: &dyn CompositorGpu,
    generation: &GenerationShared,
) -> Result<[u32; TRIPLE_BUFFER_COUNT]> {
    let mut names = [0; TRIPLE_BUFFER_COUNT];
    for index in 0..TRIPLE_BUFFER_COUNT {
        match gpu.import_share_handle(generation.slot(index).share_handle()) {
            Ok(name) => names[index] = name,
            Err(err) => {
                for &imported in &names[..index] {
                    gpu.delete_texture(imported);
                }
                return Err(err);
            }
        }
    }
    Ok(names)
}
