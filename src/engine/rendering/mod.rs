/// ### English
/// GPU-side building blocks: GPU contexts, the producer buffer set and the compositor texture.
///
/// ### 中文
/// GPU 相关组件：GPU 上下文、生产者缓冲集合以及合成器纹理。
pub mod backend;
pub mod buffer_set;
pub mod device;
pub(crate) mod egl;
pub mod gpu_context;
pub mod texture;

pub use backend::RenderBackend;
pub use buffer_set::FrameBufferSet;
pub use device::{GpuBufferObjects, GpuDevice, GpuDeviceFactory};
pub use gpu_context::{ContextTier, EglDeviceFactory, EglGpuContext};
