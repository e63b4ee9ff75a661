/// ### English
/// Engine internal modules (render threads, GPU contexts, triple-buffer frame state, sessions).
///
/// ### 中文
/// 引擎内部模块（渲染线程、GPU 上下文、三缓冲帧状态、会话管理等）。
pub(crate) mod cache;
pub mod dimensions;
pub mod engine_api;
pub mod error;
pub mod flags;
pub mod frame;
pub mod protocol;
pub mod rendering;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BridgeError, Result};
pub use runtime::{BridgeConfig, SessionConfig, VideoOutputManager};
