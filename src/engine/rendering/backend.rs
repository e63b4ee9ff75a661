//! ### English
//! Renderer selection for one session: a hardware GPU device or CPU pixel buffers.
//!
//! ### 中文
//! 单个会话的渲染器选择：硬件 GPU 设备或 CPU 像素缓冲。

use crate::engine::dimensions::BackendKind;
use crate::engine::engine_api::RenderApi;
use crate::engine::error::Result;

use super::device::{GpuDevice, GpuDeviceFactory};

/// ### English
/// Chosen once on the render thread when the session is created.
///
/// ### 中文
/// 在会话创建时于渲染线程上选定一次。
pub enum RenderBackend {
    Hardware(Box<dyn GpuDevice>),
    Software,
}

impl RenderBackend {
    /// ### English
    /// Picks hardware when enabled and a device can be created; otherwise software.
    /// A failing device factory is logged, never fatal.
    ///
    /// ### 中文
    /// 若允许硬件且能创建设备则选择硬件，否则选择软件。设备工厂失败只记录日志，不会致命。
    pub fn select(hardware_enabled: bool, factory: Option<&dyn GpuDeviceFactory>) -> Self {
        let Some(factory) = factory.filter(|_| hardware_enabled) else {
            return Self::Software;
        };
        match factory.create_device() {
            Ok(device) => Self::Hardware(device),
            Err(err) => {
                tracing::warn!(%err, "falling back to software rendering");
                Self::Software
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Hardware(_) => BackendKind::Hardware,
            Self::Software => BackendKind::Software,
        }
    }

    /// Binds the GPU context on the calling thread; no-op for software.
    pub fn make_current(&mut self) -> Result<()> {
        match self {
            Self::Hardware(device) => device.make_current(true),
            Self::Software => Ok(()),
        }
    }

    pub fn render_api(&self) -> RenderApi {
        match self {
            Self::Hardware(device) => RenderApi::OpenGl {
                get_proc_address: device.get_proc_address(),
            },
            Self::Software => RenderApi::Software,
        }
    }

    pub fn device_mut(&mut self) -> Option<&mut dyn GpuDevice> {
        match self {
            Self::Hardware(device) => Some(device.as_mut()),
            Self::Software => None,
        }
    }

    /// ### English
    /// Destroys the GPU device (if any) and switches to software.
    ///
    /// ### 中文
    /// 销毁 GPU 设备（如有）并切换为软件渲染。
    pub fn fall_back_to_software(&mut self) {
        self.destroy();
        *self = Self::Software;
    }

    pub fn destroy(&mut self) {
        if let Self::Hardware(device) = self {
            device.destroy();
        }
    }
}
