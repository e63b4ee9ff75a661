//! ### English
//! Session registry: maps player handles to live video outputs.
//!
//! ### 中文
//! 会话注册表：把播放器句柄映射到存活的视频输出。

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};

use crate::engine::dimensions::{BackendKind, OutputSize};
use crate::engine::error::{BridgeError, Result};

use super::config::{BridgeConfig, SessionConfig};
use super::session::VideoOutput;

/// ### English
/// Registry slot of one handle.
///
/// A session is built outside the registry lock, so requests that arrive while it is being
/// created are recorded on its reservation and applied once it exists.
///
/// ### 中文
/// 单个句柄在注册表中的槽位。
///
/// 会话在注册表锁之外构建，构建期间到达的请求会记录在预留项上，待会话创建完成后再应用。
enum Entry {
    Creating {
        size: Option<OutputSize>,
        disposed: bool,
    },
    Ready(VideoOutput),
}

/// ### English
/// Owns every session of one bridge instance. Dropping it shuts all of them down.
///
/// ### 中文
/// 持有一个桥接实例的全部会话。drop 时会关闭所有会话。
pub struct VideoOutputManager {
    config: BridgeConfig,
    sessions: Mutex<HashMap<i64, Entry>>,
    /// Signalled whenever a reservation is resolved.
    created: Condvar,
}

impl VideoOutputManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            created: Condvar::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// ### English
    /// Creates the session for `handle` and returns its texture id. Creating an existing handle
    /// returns the existing texture id and changes nothing; a create racing another create of the
    /// same handle waits for it.
    ///
    /// The registry lock is not held while the render thread initializes or while the host
    /// registers the texture, so other handles are never blocked and the host may call back into
    /// the manager. A dispose that arrives meanwhile wins: the new session is torn down again and
    /// [`BridgeError::StaleSession`] is returned.
    ///
    /// ### 中文
    /// 为 `handle` 创建会话并返回其纹理 id。对已存在的句柄再次创建时返回现有纹理 id，不做任何改变；
    /// 与同一句柄的另一个创建调用竞争时会等待其完成。
    ///
    /// 渲染线程初始化以及宿主注册纹理期间不持有注册表锁，因此不会阻塞其他句柄，宿主也可以回调管理器。
    /// 若期间收到 dispose，则以 dispose 为准：新会话会被再次销毁并返回 [`BridgeError::StaleSession`]。
    pub fn create(&self, handle: i64, config: SessionConfig) -> Result<i64> {
        let mut sessions = self.sessions.lock();
        loop {
            let existing = match sessions.get(&handle) {
                Some(Entry::Ready(existing)) => Some(existing.texture_id()),
                Some(Entry::Creating { .. }) => None,
                None => break,
            };
            match existing {
                Some(texture_id) => {
                    tracing::debug!(handle, "video output already exists");
                    return Ok(texture_id);
                }
                None => self.created.wait(&mut sessions),
            }
        }
        sessions.insert(
            handle,
            Entry::Creating {
                size: None,
                disposed: false,
            },
        );
        drop(sessions);

        let created = VideoOutput::create(handle, config, &self.config);

        let mut sessions = self.sessions.lock();
        let (size, disposed) = match sessions.remove(&handle) {
            Some(Entry::Creating { size, disposed }) => (size, disposed),
            other => {
                tracing::error!(handle, "video output reservation replaced while creating");
                if let Some(other) = other {
                    sessions.insert(handle, other);
                }
                (None, true)
            }
        };
        self.created.notify_all();
        let output = created?;

        if disposed {
            drop(sessions);
            tracing::debug!(handle, "video output disposed while being created");
            output.dispose(Some(self.config.unregister_timeout));
            return Err(BridgeError::StaleSession);
        }
        if let Some(size) = size {
            output.set_size(size);
        }
        let texture_id = output.texture_id();
        sessions.insert(handle, Entry::Ready(output));
        Ok(texture_id)
    }

    /// ### English
    /// Updates the requested size. [`BridgeError::StaleSession`] for unknown handles.
    ///
    /// ### 中文
    /// 更新请求的尺寸。句柄未知时返回 [`BridgeError::StaleSession`]。
    pub fn set_size(&self, handle: i64, size: OutputSize) -> Result<()> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&handle) {
            Some(Entry::Ready(output)) => output.set_size(size),
            Some(Entry::Creating { size: pending, .. }) => *pending = Some(size),
            None => return Err(BridgeError::StaleSession),
        }
        Ok(())
    }

    /// ### English
    /// Disposes the session of `handle`, waiting a bounded time for the host to confirm the
    /// texture unregistration. [`BridgeError::StaleSession`] for unknown handles.
    ///
    /// ### 中文
    /// 释放 `handle` 的会话，并在有限时间内等待宿主确认纹理注销。
    /// 句柄未知时返回 [`BridgeError::StaleSession`]。
    pub fn dispose(&self, handle: i64) -> Result<()> {
        let output = {
            let mut sessions = self.sessions.lock();
            if let Some(Entry::Creating { disposed, .. }) = sessions.get_mut(&handle) {
                *disposed = true;
                return Ok(());
            }
            match sessions.remove(&handle) {
                Some(Entry::Ready(output)) => output,
                _ => return Err(BridgeError::StaleSession),
            }
        };
        output.dispose(Some(self.config.unregister_timeout));
        Ok(())
    }

    /// ### English
    /// Disposes every session without waiting for unregister confirmations. Used at bridge
    /// teardown, when the compositor may already be gone. Sessions still being created are
    /// disposed by their creator.
    ///
    /// ### 中文
    /// 释放所有会话，不等待注销确认。用于桥接层销毁时（合成器可能已不存在）。
    /// 仍在创建中的会话由其创建者负责释放。
    pub fn shutdown(&self) {
        let outputs: Vec<VideoOutput> = {
            let mut sessions = self.sessions.lock();
            let mut outputs = Vec::with_capacity(sessions.len());
            for (handle, entry) in std::mem::take(&mut *sessions) {
                match entry {
                    Entry::Ready(output) => outputs.push(output),
                    Entry::Creating { size, .. } => {
                        sessions.insert(handle, Entry::Creating { size, disposed: true });
                    }
                }
            }
            outputs
        };
        if outputs.is_empty() {
            return;
        }
        tracing::info!(count = outputs.len(), "shutting down video outputs");
        for output in outputs {
            output.dispose(None);
        }
    }

    fn with_ready<R>(&self, handle: i64, read: impl FnOnce(&VideoOutput) -> R) -> Option<R> {
        match self.sessions.lock().get(&handle) {
            Some(Entry::Ready(output)) => Some(read(output)),
            _ => None,
        }
    }

    pub fn texture_id(&self, handle: i64) -> Option<i64> {
        self.with_ready(handle, VideoOutput::texture_id)
    }

    pub fn backend_kind(&self, handle: i64) -> Option<BackendKind> {
        self.with_ready(handle, VideoOutput::backend_kind)
    }

    /// Number of live sessions, not counting ones still being created.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|entry| matches!(entry, Entry::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for VideoOutputManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests;
