/// ### English
/// Consumer side of the frame hand-off: what the host compositor calls to get the current frame.
///
/// ### 中文
/// 帧交接的消费者侧：宿主合成器获取当前帧时调用的接口。
mod adapter;
mod compositor;

pub use adapter::{PixelBufferView, PopulatedTexture, VideoTexture};
pub use compositor::{CompositorGpu, GL_TEXTURE_2D, GlCompositor};
