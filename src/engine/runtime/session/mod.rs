//! ### English
//! One video output session: the render thread, its worker state and the registered texture.
//!
//! ### 中文
//! 单个视频输出会话：渲染线程、其工作状态以及已注册的纹理。

mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;

use crate::engine::dimensions::{BackendKind, OutputSize};
use crate::engine::engine_api::{MethodSink, TextureKind, TextureRegistrar};
use crate::engine::error::{BridgeError, Result};
use crate::engine::frame::SharedFrameState;
use crate::engine::rendering::texture::VideoTexture;

use super::config::{BridgeConfig, SessionConfig};
use super::render_queue::{QueueOptions, RenderTaskQueue};

pub(crate) use worker::SessionWorker;
use worker::request_render;

/// ### English
/// State reachable from the render thread, the engine callback and the manager at once.
///
/// ### 中文
/// 渲染线程、引擎回调与管理器都能访问的共享状态。
pub(crate) struct SessionShared {
    pub(crate) handle: i64,
    /// ### English
    /// Set first thing on dispose; every render task checks it before touching the GPU.
    ///
    /// ### 中文
    /// 释放流程的第一步置位；每个渲染任务在访问 GPU 前都会检查它。
    pub(crate) destroyed: AtomicBool,
    /// Coalesces engine callbacks into at most one queued render.
    pub(crate) render_pending: AtomicBool,
    pub(crate) size: Mutex<OutputSize>,
    /// 0 until the host registered the texture.
    pub(crate) texture_id: AtomicI64,
    pub(crate) frame: Arc<SharedFrameState>,
    pub(crate) registrar: Arc<dyn TextureRegistrar>,
    pub(crate) notifier: Arc<dyn MethodSink>,
}

/// ### English
/// A live video output. Dropping it without [`VideoOutput::dispose`] still stops the render
/// thread and frees its resources, but leaves the texture registered.
///
/// ### 中文
/// 一个存活的视频输出。未调用 [`VideoOutput::dispose`] 直接 drop 时仍会停止渲染线程并释放资源，
/// 但纹理会保持注册状态。
pub struct VideoOutput {
    shared: Arc<SessionShared>,
    queue: RenderTaskQueue<SessionWorker>,
    texture: Arc<VideoTexture>,
    backend: BackendKind,
}

impl VideoOutput {
    /// ### English
    /// Spawns the render thread, sets up the backend, registers the texture and hooks the engine
    /// callback.
    ///
    /// #### Parameters
    /// - `handle`: Player handle the session renders.
    /// - `config`: Size and hardware preference from the create call.
    /// - `bridge`: Shared collaborators.
    ///
    /// ### 中文
    /// 启动渲染线程、准备渲染后端、注册纹理并挂接引擎回调。
    ///
    /// #### 参数
    /// - `handle`：会话渲染的播放器句柄。
    /// - `config`：创建调用给出的尺寸与硬件偏好。
    /// - `bridge`：共享的协作对象。
    pub(crate) fn create(handle: i64, config: SessionConfig, bridge: &BridgeConfig) -> Result<Self> {
        let frame = Arc::new(SharedFrameState::new());
        let shared = Arc::new(SessionShared {
            handle,
            destroyed: AtomicBool::new(false),
            render_pending: AtomicBool::new(false),
            size: Mutex::new(config.size),
            texture_id: AtomicI64::new(0),
            frame: Arc::clone(&frame),
            registrar: Arc::clone(&bridge.registrar),
            notifier: Arc::clone(&bridge.notifier),
        });

        let worker_shared = Arc::clone(&shared);
        let engine = Arc::clone(&bridge.engine);
        let gpu = bridge.gpu.clone();
        let hardware = bridge.hardware_enabled && config.enable_hardware_acceleration;
        let mut queue = RenderTaskQueue::spawn(
            QueueOptions {
                name: format!("kit-video-{handle}"),
                realtime_priority: bridge.realtime_priority,
            },
            move |_| SessionWorker::initialize(worker_shared, engine.as_ref(), gpu.as_deref(), hardware),
        )?;
        let backend = queue
            .post_and_wait(|worker| worker.backend_kind())
            .ok_or(BridgeError::QueueClosed)?;

        let kind = match backend {
            BackendKind::Hardware => TextureKind::Gl,
            BackendKind::Software => TextureKind::PixelBuffer,
        };
        let init_shared = Arc::clone(&shared);
        let init_poster = queue.poster().clone();
        let texture = Arc::new(VideoTexture::new(frame, kind, move || {
            if !init_shared.destroyed.load(Ordering::Acquire) {
                init_poster.post(SessionWorker::ensure_buffers);
            }
        }));

        let texture_id = match bridge.registrar.register_texture(kind, Arc::clone(&texture)) {
            Ok(id) => id,
            Err(err) => {
                shared.destroyed.store(true, Ordering::Release);
                queue.post_and_wait(SessionWorker::teardown);
                queue.shutdown();
                return Err(err);
            }
        };
        shared.texture_id.store(texture_id, Ordering::Release);

        let poster = queue.poster().clone();
        queue.post(move |worker| worker.attach_update_callback(poster));

        tracing::info!(handle, texture_id, ?backend, "video output created");
        Ok(Self {
            shared,
            queue,
            texture,
            backend,
        })
    }

    pub fn handle(&self) -> i64 {
        self.shared.handle
    }

    pub fn texture_id(&self) -> i64 {
        self.shared.texture_id.load(Ordering::Acquire)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    pub fn texture(&self) -> &Arc<VideoTexture> {
        &self.texture
    }

    /// ### English
    /// Replaces the requested output size and schedules a render so buffers follow it.
    ///
    /// ### 中文
    /// 替换请求的输出尺寸，并调度一次渲染使缓冲随之调整。
    pub(crate) fn set_size(&self, size: OutputSize) {
        *self.shared.size.lock() = size;
        request_render(&self.shared, self.queue.poster());
    }

    /// ### English
    /// Tears the session down.
    ///
    /// Order: mark destroyed, unregister the texture (waiting up to `unregister_wait` for the
    /// host to confirm, not at all when `None`), release render-thread resources on the render
    /// thread, then join it.
    ///
    /// ### 中文
    /// 销毁会话。
    ///
    /// 顺序：标记已销毁，注销纹理（最多等待 `unregister_wait` 让宿主确认；为 `None` 时不等待），
    /// 在渲染线程上释放其资源，最后 join 渲染线程。
    pub(crate) fn dispose(self, unregister_wait: Option<Duration>) {
        let Self {
            shared,
            mut queue,
            texture,
            ..
        } = self;
        let handle = shared.handle;
        shared.destroyed.store(true, Ordering::Release);
        drop(texture);

        let texture_id = shared.texture_id.load(Ordering::Acquire);
        if texture_id != 0 {
            let (done_tx, done_rx) = crossbeam_channel::bounded(1);
            shared.registrar.unregister_texture(
                texture_id,
                Box::new(move || {
                    let _ = done_tx.send(());
                }),
            );
            if let Some(timeout) = unregister_wait {
                match done_rx.recv_timeout(timeout) {
                    Ok(()) => {}
                    Err(RecvTimeoutError::Timeout) => {
                        tracing::warn!(handle, texture_id, ?timeout, "texture unregistration not confirmed in time");
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::warn!(handle, texture_id, "texture unregistration dropped without confirmation");
                    }
                }
            }
        }

        if queue.post_and_wait(SessionWorker::teardown).is_none() {
            tracing::warn!(handle, "render thread gone before teardown");
        }
        queue.shutdown();
        tracing::info!(handle, texture_id, "video output disposed");
    }
}
