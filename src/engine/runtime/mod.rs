//! ### English
//! Session runtime: per-session render threads, the session registry and their configuration.
//!
//! ### 中文
//! 会话运行时：每个会话的渲染线程、会话注册表及其配置。

mod config;
mod manager;
pub mod render_queue;
mod session;

pub use config::{BridgeConfig, DEFAULT_UNREGISTER_TIMEOUT, SessionConfig};
pub use manager::VideoOutputManager;
pub use render_queue::{QueueOptions, RenderTaskQueue, TaskPoster};
pub use session::VideoOutput;
