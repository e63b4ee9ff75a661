//! ### English
//! Render task queue: one dedicated worker thread that owns a piece of state and runs posted
//! tasks against it in FIFO order.
//!
//! All GPU work of a session goes through one of these, so the GPU context is only ever touched
//! by a single thread.
//!
//! ### 中文
//! 渲染任务队列：一个独立工作线程持有一份状态，并按 FIFO 顺序对其执行投递的任务。
//!
//! 会话的所有 GPU 工作都经由它执行，因此 GPU 上下文只会被单一线程访问。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::engine::error::{BridgeError, Result};

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Run(Task<S>),
    Shutdown,
}

struct QueueShared {
    name: String,
    /// ### English
    /// Set once shutdown starts. Posts are rejected and queued tasks are dropped unrun.
    ///
    /// ### 中文
    /// 开始关闭时置位。此后投递会被拒绝，已排队的任务不执行直接丢弃。
    closed: AtomicBool,
    worker: OnceLock<ThreadId>,
}

/// ### English
/// Worker thread options.
///
/// ### 中文
/// 工作线程选项。
#[derive(Clone, Debug)]
pub struct QueueOptions {
    pub name: String,
    /// ### English
    /// Ask for `SCHED_FIFO` at maximum priority (unix). Failure is logged and ignored.
    ///
    /// ### 中文
    /// 请求以最高优先级使用 `SCHED_FIFO`（unix）。失败时仅记录日志并忽略。
    pub realtime_priority: bool,
}

/// ### English
/// Cloneable, thread-safe handle for posting tasks to a [`RenderTaskQueue`].
///
/// ### 中文
/// 可克隆、线程安全的句柄，用于向 [`RenderTaskQueue`] 投递任务。
pub struct TaskPoster<S> {
    sender: Sender<Message<S>>,
    shared: Arc<QueueShared>,
}

impl<S> Clone for TaskPoster<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: 'static> TaskPoster<S> {
    /// ### English
    /// Queues `task` and returns immediately. Returns `false` when the queue is closed (the task
    /// is dropped).
    ///
    /// ### 中文
    /// 将 `task` 入队并立即返回。队列已关闭时返回 `false`（任务被丢弃）。
    pub fn post(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(Message::Run(Box::new(task))).is_ok()
    }

    /// ### English
    /// Queues `task` and blocks until it has run, returning its result.
    ///
    /// Returns `None` when the task never runs: the queue is closed (or closes before reaching
    /// it), or the caller is the worker thread itself, which would otherwise deadlock.
    ///
    /// ### 中文
    /// 将 `task` 入队并阻塞直到其执行完毕，返回其结果。
    ///
    /// 当任务不会被执行时返回 `None`：队列已关闭（或在轮到它之前关闭），
    /// 或调用者就是工作线程本身（否则会死锁）。
    pub fn post_and_wait<R: Send + 'static>(
        &self,
        task: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Option<R> {
        if self.is_current_thread() {
            tracing::warn!(queue = %self.shared.name, "post_and_wait called on the worker thread");
            return None;
        }
        let (reply, result) = crossbeam_channel::bounded(1);
        let posted = self.post(move |state| {
            let _ = reply.send(task(state));
        });
        if !posted {
            return None;
        }
        // A dropped task drops `reply`, which ends the wait with an error.
        result.recv().ok()
    }

    /// Whether the caller is running on this queue's worker thread.
    pub fn is_current_thread(&self) -> bool {
        self.shared.worker.get() == Some(&thread::current().id())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// ### English
/// Owner of the worker thread. Dropping it shuts the worker down and joins it.
///
/// ### 中文
/// 工作线程的所有者。drop 时关闭工作线程并 join。
pub struct RenderTaskQueue<S> {
    poster: TaskPoster<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: 'static> RenderTaskQueue<S> {
    /// ### English
    /// Spawns the worker. `init` runs on the worker thread and builds the state every task
    /// receives; it gets a poster so the state can queue follow-up work for itself.
    ///
    /// #### Parameters
    /// - `options`: Thread name and priority.
    /// - `init`: Builds the worker-owned state (runs before any task).
    ///
    /// ### 中文
    /// 启动工作线程。`init` 在工作线程上运行，构造每个任务都会收到的状态；
    /// 它会拿到一个 poster，使状态可以为自己投递后续工作。
    ///
    /// #### 参数
    /// - `options`：线程名与优先级。
    /// - `init`：构造工作线程持有的状态（在任何任务之前运行）。
    pub fn spawn(
        options: QueueOptions,
        init: impl FnOnce(TaskPoster<S>) -> S + Send + 'static,
    ) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(QueueShared {
            name: options.name.clone(),
            closed: AtomicBool::new(false),
            worker: OnceLock::new(),
        });
        let poster = TaskPoster {
            sender,
            shared: Arc::clone(&shared),
        };
        let worker_poster = poster.clone();

        let thread = thread::Builder::new()
            .name(options.name.clone())
            .spawn(move || run_worker(receiver, worker_poster, init, options.realtime_priority))
            .map_err(|err| {
                BridgeError::ResourceExhausted(format!("failed to spawn {}: {err}", options.name))
            })?;
        let _ = shared.worker.set(thread.thread().id());

        Ok(Self {
            poster,
            thread: Some(thread),
        })
    }

    pub fn poster(&self) -> &TaskPoster<S> {
        &self.poster
    }

    pub fn post(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        self.poster.post(task)
    }

    pub fn post_and_wait<R: Send + 'static>(
        &self,
        task: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Option<R> {
        self.poster.post_and_wait(task)
    }

    pub fn is_current_thread(&self) -> bool {
        self.poster.is_current_thread()
    }
}

impl<S> RenderTaskQueue<S> {
    /// ### English
    /// Closes the queue, drops every task still queued (after the one running, if any), and joins
    /// the worker. The worker-owned state is dropped on the worker thread. Idempotent.
    ///
    /// ### 中文
    /// 关闭队列，丢弃仍在排队的所有任务（正在执行的任务除外），并 join 工作线程。
    /// 工作线程持有的状态在工作线程上 drop。可重复调用。
    pub fn shutdown(&mut self) {
        self.poster.shared.closed.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.poster.sender.send(Message::Shutdown);
        if thread.thread().id() == thread::current().id() {
            // Dropped from one of its own tasks: it exits once that task returns.
            return;
        }
        if thread.join().is_err() {
            tracing::error!(queue = %self.poster.shared.name, "render thread panicked");
        }
    }
}

impl<S> Drop for RenderTaskQueue<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<S>(
    receiver: Receiver<Message<S>>,
    poster: TaskPoster<S>,
    init: impl FnOnce(TaskPoster<S>) -> S,
    realtime_priority: bool,
) {
    let shared = Arc::clone(&poster.shared);
    let _ = shared.worker.set(thread::current().id());
    if realtime_priority {
        promote_current_thread(&shared.name);
    }

    let mut state = init(poster);
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) if !shared.closed.load(Ordering::Acquire) => task(&mut state),
            Message::Run(_) => {}
            Message::Shutdown => break,
        }
    }
    let dropped = receiver.try_iter().count();
    if dropped > 0 {
        tracing::debug!(queue = %shared.name, dropped, "dropped queued tasks on shutdown");
    }
    drop(state);
}

#[cfg(unix)]
fn promote_current_thread(name: &str) {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            tracing::debug!(queue = name, rc, "realtime priority unavailable");
        }
    }
}

#[cfg(not(unix))]
fn promote_current_thread(_name: &str) {}
