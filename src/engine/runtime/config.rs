//! ### English
//! Bridge-wide and per-session configuration.
//!
//! ### 中文
//! 桥接层全局配置与单会话配置。

use std::sync::Arc;
use std::time::Duration;

use crate::engine::dimensions::OutputSize;
use crate::engine::engine_api::{MethodSink, PlaybackEngine, TextureRegistrar};
use crate::engine::flags::{KIT_VIDEO_FLAG_DISABLE_HARDWARE, KIT_VIDEO_FLAG_NO_REALTIME_PRIORITY};
use crate::engine::rendering::GpuDeviceFactory;

/// ### English
/// How long dispose waits for the host to confirm a texture unregistration.
///
/// ### 中文
/// 释放时等待宿主确认纹理注销的最长时间。
pub const DEFAULT_UNREGISTER_TIMEOUT: Duration = Duration::from_secs(2);

/// ### English
/// Collaborators and policy shared by every session of one bridge instance.
///
/// ### 中文
/// 同一桥接实例下所有会话共享的协作对象与策略。
#[derive(Clone)]
pub struct BridgeConfig {
    pub engine: Arc<dyn PlaybackEngine>,
    pub registrar: Arc<dyn TextureRegistrar>,
    pub notifier: Arc<dyn MethodSink>,
    /// ### English
    /// Producer GPU device source. `None` means hardware rendering is unavailable.
    ///
    /// ### 中文
    /// 生产者 GPU 设备来源。为 `None` 表示硬件渲染不可用。
    pub gpu: Option<Arc<dyn GpuDeviceFactory>>,
    pub hardware_enabled: bool,
    pub realtime_priority: bool,
    pub unregister_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        registrar: Arc<dyn TextureRegistrar>,
        notifier: Arc<dyn MethodSink>,
        gpu: Option<Arc<dyn GpuDeviceFactory>>,
    ) -> Self {
        Self {
            engine,
            registrar,
            notifier,
            gpu,
            hardware_enabled: true,
            realtime_priority: true,
            unregister_timeout: DEFAULT_UNREGISTER_TIMEOUT,
        }
    }

    /// ### English
    /// Applies the `KIT_VIDEO_FLAG_*` bits passed over the C ABI.
    ///
    /// ### 中文
    /// 应用经由 C ABI 传入的 `KIT_VIDEO_FLAG_*` 位。
    pub fn with_flags(mut self, flags: u32) -> Self {
        if flags & KIT_VIDEO_FLAG_DISABLE_HARDWARE != 0 {
            self.hardware_enabled = false;
        }
        if flags & KIT_VIDEO_FLAG_NO_REALTIME_PRIORITY != 0 {
            self.realtime_priority = false;
        }
        self
    }
}

/// ### English
/// Options of one `VideoOutputManager.Create` call.
///
/// ### 中文
/// 单次 `VideoOutputManager.Create` 调用的选项。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub size: OutputSize,
    pub enable_hardware_acceleration: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            size: OutputSize::dynamic(),
            enable_hardware_acceleration: true,
        }
    }
}
