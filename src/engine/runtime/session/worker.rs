//! ### English
//! Render-thread side of a session. Owns the engine render context, the render backend and the
//! frame buffer set; only ever touched from the session's render task queue.
//!
//! ### 中文
//! 会话在渲染线程一侧的状态。持有引擎渲染上下文、渲染后端与帧缓冲集合；
//! 只会在会话的渲染任务队列中被访问。

use std::sync::Arc;
use std::sync::atomic::Ordering;

use dpi::PhysicalSize;

use crate::engine::dimensions::{BackendKind, resolve_output_size};
use crate::engine::engine_api::{PlaybackEngine, RenderApi, RenderContext, UpdateCallback};
use crate::engine::protocol::{NOTIFY_RESIZE, resize_notification};
use crate::engine::rendering::{FrameBufferSet, GpuDeviceFactory, RenderBackend};
use crate::engine::runtime::render_queue::TaskPoster;

use super::SessionShared;

pub(crate) struct SessionWorker {
    shared: Arc<SessionShared>,
    backend: RenderBackend,
    buffers: FrameBufferSet,
    context: Option<Box<dyn RenderContext>>,
    torn_down: bool,
}

impl SessionWorker {
    /// ### English
    /// Picks the backend and creates the engine render context for it. A hardware context the
    /// engine refuses is dropped in favor of software; a session without any render context stays
    /// alive but never renders.
    ///
    /// ### 中文
    /// 选择渲染后端并为其创建引擎渲染上下文。引擎拒绝硬件上下文时退回软件渲染；
    /// 完全没有渲染上下文的会话仍然存活，只是不会渲染。
    pub(crate) fn initialize(
        shared: Arc<SessionShared>,
        engine: &dyn PlaybackEngine,
        gpu: Option<&dyn GpuDeviceFactory>,
        hardware_enabled: bool,
    ) -> Self {
        let handle = shared.handle;
        let mut backend = RenderBackend::select(hardware_enabled, gpu);
        if let Err(err) = backend.make_current() {
            tracing::warn!(handle, %err, "GPU context unusable, falling back to software");
            backend.fall_back_to_software();
        }

        let context = match engine.create_render_context(handle, backend.render_api()) {
            Ok(context) => Some(context),
            Err(err) if backend.kind() == BackendKind::Hardware => {
                tracing::warn!(handle, %err, "engine rejected the GL render API, falling back to software");
                backend.fall_back_to_software();
                engine
                    .create_render_context(handle, RenderApi::Software)
                    .inspect_err(|err| tracing::error!(handle, %err, "failed to create render context"))
                    .ok()
            }
            Err(err) => {
                tracing::error!(handle, %err, "failed to create render context");
                None
            }
        };
        tracing::debug!(handle, backend = ?backend.kind(), "render thread ready");

        let buffers = FrameBufferSet::new(Arc::clone(&shared.frame));
        Self {
            shared,
            backend,
            buffers,
            context,
            torn_down: false,
        }
    }

    pub(crate) fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// ### English
    /// Hooks the engine's frame callback up to this session's queue and requests a first render.
    ///
    /// ### 中文
    /// 把引擎的新帧回调接到本会话的队列上，并请求一次首帧渲染。
    pub(crate) fn attach_update_callback(&mut self, poster: TaskPoster<SessionWorker>) {
        let Some(context) = self.context.as_mut() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let callback_poster = poster.clone();
        let callback: UpdateCallback = Arc::new(move || request_render(&shared, &callback_poster));
        context.set_update_callback(Some(callback));
        request_render(&self.shared, &poster);
    }

    /// ### English
    /// Allocates buffers for the current size without rendering (first populate).
    ///
    /// ### 中文
    /// 按当前尺寸分配缓冲但不渲染（首次 populate 时）。
    pub(crate) fn ensure_buffers(&mut self) {
        self.prepare();
    }

    /// ### English
    /// Renders one frame: resize if needed, render into the back buffer, publish, then tell the
    /// host a frame is available.
    ///
    /// ### 中文
    /// 渲染一帧：按需调整尺寸，渲染到后缓冲，发布，然后通知宿主有新帧。
    pub(crate) fn render_frame(&mut self) {
        self.shared.render_pending.store(false, Ordering::Release);
        if !self.prepare() {
            return;
        }
        let Some(context) = self.context.as_mut() else {
            return;
        };
        match self.buffers.render(&mut self.backend, context.as_mut()) {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                tracing::warn!(handle = self.shared.handle, %err, "frame render failed");
                return;
            }
        }
        self.buffers.publish();
        context.report_swap();

        let texture_id = self.shared.texture_id.load(Ordering::Acquire);
        if texture_id != 0 {
            self.shared.registrar.mark_frame_available(texture_id);
        }
    }

    /// ### English
    /// Binds the context, frees retired generations and makes sure buffers of the resolved size
    /// exist. Returns whether there are buffers to render into.
    ///
    /// ### 中文
    /// 绑定上下文、释放退役代，并确保存在目标尺寸的缓冲。返回是否有可渲染的缓冲。
    fn prepare(&mut self) -> bool {
        if self.torn_down || self.shared.destroyed.load(Ordering::Acquire) {
            return false;
        }
        let Some(context) = self.context.as_ref() else {
            return false;
        };
        let params = context.video_params();
        if let Err(err) = self.backend.make_current() {
            tracing::warn!(handle = self.shared.handle, %err, "cannot bind GPU context");
            return false;
        }
        self.buffers.collect_retired(&mut self.backend);

        let requested = *self.shared.size.lock();
        let Some(size) = resolve_output_size(requested, params, self.backend.kind()) else {
            return false;
        };
        match self.buffers.check_and_resize(&mut self.backend, size) {
            Ok(true) => notify_resize(&self.shared, size),
            Ok(false) => {}
            Err(err) => {
                // Keep rendering at the previous size when there is one.
                tracing::warn!(handle = self.shared.handle, %err, width = size.width, height = size.height, "buffer allocation failed");
            }
        }
        self.buffers.size().is_some()
    }

    /// ### English
    /// Releases everything the render thread owns, in order: engine render context (while the GPU
    /// context is alive), frame buffers, then the GPU context. Idempotent.
    ///
    /// ### 中文
    /// 依次释放渲染线程持有的一切：引擎渲染上下文（GPU 上下文仍存活时）、帧缓冲、
    /// 最后是 GPU 上下文。可重复调用。
    pub(crate) fn teardown(&mut self) {
        if std::mem::replace(&mut self.torn_down, true) {
            return;
        }
        let handle = self.shared.handle;
        let bound = self.backend.make_current();
        if let Some(mut context) = self.context.take() {
            context.set_update_callback(None);
            drop(context);
        }
        match bound {
            Ok(()) => self.buffers.dispose(&mut self.backend),
            Err(err) => {
                tracing::error!(handle, %err, "GPU context lost, leaking frame buffers");
                self.shared.frame.clear_generations();
            }
        }
        self.backend.destroy();
        tracing::debug!(handle, "render thread resources released");
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// ### English
/// Queues one render unless one is already pending. Safe from any thread.
///
/// ### 中文
/// 若尚无待处理的渲染则投递一次。可在任意线程调用。
pub(crate) fn request_render(shared: &SessionShared, poster: &TaskPoster<SessionWorker>) {
    if shared.destroyed.load(Ordering::Acquire) {
        return;
    }
    if !shared.render_pending.swap(true, Ordering::AcqRel) && !poster.post(SessionWorker::render_frame) {
        shared.render_pending.store(false, Ordering::Release);
    }
}

fn notify_resize(shared: &SessionShared, size: PhysicalSize<u32>) {
    let texture_id = shared.texture_id.load(Ordering::Acquire);
    tracing::debug!(handle = shared.handle, texture_id, width = size.width, height = size.height, "video output resized");
    shared
        .notifier
        .invoke(NOTIFY_RESIZE, resize_notification(shared.handle, texture_id, size));
}
