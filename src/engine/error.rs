//! ### English
//! Crate error type.
//!
//! Errors never cross the engine update callback or the compositor populate call; they stop at
//! the task boundary where they are logged.
//!
//! ### 中文
//! crate 错误类型。
//!
//! 错误不会穿过引擎的更新回调或合成器的 populate 调用；它们在任务边界处被记录并终止传播。

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// ### English
    /// Every GPU context tier failed; the session falls back to software rendering.
    ///
    /// ### 中文
    /// 所有 GPU 上下文层级均失败；会话回退为软件渲染。
    #[error("hardware acceleration unavailable: {0}")]
    HardwareUnavailable(String),

    /// ### English
    /// A texture, framebuffer, share handle or pixel buffer could not be allocated.
    ///
    /// ### 中文
    /// 纹理、帧缓冲、共享句柄或像素缓冲分配失败。
    #[error("GPU resource allocation failed: {0}")]
    ResourceExhausted(String),

    #[error("session was already destroyed")]
    StaleSession,

    #[error("failed to bind GPU context (error 0x{code:x})")]
    ContextBind { code: i32 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("playback engine error: {0}")]
    Engine(String),

    #[error("render queue is closed")]
    QueueClosed,
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
