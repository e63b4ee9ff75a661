//! ### English
//! Log output for hosts that do not install their own `tracing` subscriber.
//!
//! ### 中文
//! 为未自行安装 `tracing` subscriber 的宿主提供日志输出。

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "KIT_VIDEO_LOG";

#[unsafe(no_mangle)]
/// ### English
/// Installs a stderr `tracing` subscriber filtered by `KIT_VIDEO_LOG` (default `info`).
///
/// Safe to call more than once; only the first call (or a subscriber installed by someone else)
/// wins. Returns `true` when this call installed the subscriber.
///
/// ### 中文
/// 安装一个输出到 stderr 的 `tracing` subscriber，过滤规则取自 `KIT_VIDEO_LOG`（默认 `info`）。
///
/// 可重复调用；仅第一次调用（或他人已安装的 subscriber）生效。本次调用完成安装时返回 `true`。
pub extern "C" fn kit_video_bridge_init_logging() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
