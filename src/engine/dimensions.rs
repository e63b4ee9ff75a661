//! ### English
//! Output dimension policy.
//!
//! A configured fixed size wins over the video's native size. Without one, the size follows the
//! engine's display parameters (`dw`/`dh`, rotation-aware). Software output is bounded so a 4K
//! stream does not turn into a 4K CPU copy per frame.
//!
//! ### 中文
//! 输出尺寸策略。
//!
//! 配置的固定尺寸优先于视频原生尺寸。未配置时跟随引擎的显示参数（`dw`/`dh`，考虑旋转）。
//! 软件输出受上限约束，避免 4K 视频变成每帧 4K 的 CPU 拷贝。

use dpi::PhysicalSize;
use serde::{Deserialize, Serialize};

/// ### English
/// Largest software-rendered output (matches the common 1080p upper bound).
///
/// ### 中文
/// 软件渲染输出的最大尺寸（与常见的 1080p 上限一致）。
pub const SW_RENDERING_MAX_SIZE: PhysicalSize<u32> = PhysicalSize::new(1920, 1080);

/// ### English
/// Which renderer a session ended up with; picked once at session creation.
///
/// ### 中文
/// 会话最终使用的渲染器；在会话创建时选定一次。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Hardware,
    Software,
}

/// ### English
/// Requested output size. Fixed only when both axes were given.
///
/// ### 中文
/// 请求的输出尺寸。仅当两个维度都给出时才是固定尺寸。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl OutputSize {
    pub const fn fixed(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    pub const fn dynamic() -> Self {
        Self {
            width: None,
            height: None,
        }
    }

    /// ### English
    /// Builds a size from loosely-typed request values. Only a pair of two values is honored;
    /// negatives clamp to zero ("unknown").
    ///
    /// ### 中文
    /// 由宽松类型的请求值构造尺寸。只有同时给出两个值时才生效；负数被钳制为 0（“未知”）。
    pub fn from_request(width: Option<i64>, height: Option<i64>) -> Self {
        match (width, height) {
            (Some(w), Some(h)) => Self::fixed(clamp_axis(w, u32::MAX), clamp_axis(h, u32::MAX)),
            _ => Self::dynamic(),
        }
    }

    pub fn as_fixed(&self) -> Option<PhysicalSize<u32>> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(PhysicalSize::new(width, height)),
            _ => None,
        }
    }
}

/// ### English
/// Video output parameters reported by the playback engine.
///
/// ### 中文
/// 播放引擎上报的视频输出参数。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoParams {
    /// Display width after aspect correction.
    pub dw: i64,
    /// Display height after aspect correction.
    pub dh: i64,
    /// Clockwise rotation in degrees.
    pub rotate: i64,
}

impl VideoParams {
    /// ### English
    /// Display size with 90/270 degree rotation applied, or `None` while unknown.
    ///
    /// ### 中文
    /// 应用 90/270 度旋转后的显示尺寸；未知时返回 `None`。
    pub fn display_size(&self) -> Option<PhysicalSize<u32>> {
        let (w, h) = if self.rotate.rem_euclid(180) == 90 {
            (self.dh, self.dw)
        } else {
            (self.dw, self.dh)
        };
        let size = PhysicalSize::new(clamp_axis(w, u32::MAX), clamp_axis(h, u32::MAX));
        (size.width > 0 && size.height > 0).then_some(size)
    }
}

/// ### English
/// Resolves the size buffers should be allocated at, or `None` when nothing should be allocated
/// yet (no fixed size and no video parameters, or a zero axis).
///
/// ### 中文
/// 计算缓冲应分配的尺寸；若暂不应分配（没有固定尺寸也没有视频参数，或某一维为 0）则返回 `None`。
pub fn resolve_output_size(
    requested: OutputSize,
    params: Option<VideoParams>,
    backend: BackendKind,
) -> Option<PhysicalSize<u32>> {
    let size = match requested.as_fixed() {
        Some(fixed) => match backend {
            BackendKind::Hardware => fixed,
            BackendKind::Software => PhysicalSize::new(
                fixed.width.min(SW_RENDERING_MAX_SIZE.width),
                fixed.height.min(SW_RENDERING_MAX_SIZE.height),
            ),
        },
        None => {
            let native = params?.display_size()?;
            match backend {
                BackendKind::Hardware => native,
                BackendKind::Software => fit_within(native, SW_RENDERING_MAX_SIZE),
            }
        }
    };
    (size.width > 0 && size.height > 0).then_some(size)
}

/// ### English
/// Scales `size` down (never up) to fit inside `max`, preserving aspect ratio.
///
/// ### 中文
/// 在保持宽高比的前提下把 `size` 缩小（不放大）到 `max` 以内。
pub fn fit_within(size: PhysicalSize<u32>, max: PhysicalSize<u32>) -> PhysicalSize<u32> {
    if size.width <= max.width && size.height <= max.height {
        return size;
    }
    let (w, h) = (u64::from(size.width), u64::from(size.height));
    let (mw, mh) = (u64::from(max.width), u64::from(max.height));
    // Compare w/h against mw/mh without floats.
    if w * mh >= h * mw {
        PhysicalSize::new(max.width, ((h * mw) / w).max(1) as u32)
    } else {
        PhysicalSize::new(((w * mh) / h).max(1) as u32, max.height)
    }
}

fn clamp_axis(value: i64, max: u32) -> u32 {
    value.clamp(0, i64::from(max)) as u32
}
