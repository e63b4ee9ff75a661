//! ### English
//! Method-channel surface: parses `VideoOutputManager.*` calls and builds the
//! `VideoOutput.Resize` notification.
//!
//! Integer arguments arrive either as JSON numbers or as decimal strings; `null` (or the string
//! `"null"`) means absent.
//!
//! ### 中文
//! 方法通道接口：解析 `VideoOutputManager.*` 调用，并构造 `VideoOutput.Resize` 通知。
//!
//! 整数参数可能是 JSON 数字，也可能是十进制字符串；`null`（或字符串 `"null"`）表示缺省。

use dpi::PhysicalSize;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use super::dimensions::OutputSize;
use super::error::{BridgeError, Result};
use super::runtime::{SessionConfig, VideoOutputManager};

pub const METHOD_CREATE: &str = "VideoOutputManager.Create";
pub const METHOD_SET_SIZE: &str = "VideoOutputManager.SetSize";
pub const METHOD_DISPOSE: &str = "VideoOutputManager.Dispose";
pub const NOTIFY_RESIZE: &str = "VideoOutput.Resize";

/// ### English
/// Result of one method call, mirrored onto the C ABI as a status code plus JSON payload.
///
/// ### 中文
/// 单次方法调用的结果，在 C ABI 上表示为状态码加 JSON 负载。
#[derive(Clone, Debug, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    NotImplemented,
    Error { code: String, message: String },
}

impl MethodResponse {
    fn error(code: &str, err: &BridgeError) -> Self {
        Self::Error {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateArgs {
    #[serde(deserialize_with = "required_i64")]
    handle: i64,
    #[serde(default, deserialize_with = "optional_i64")]
    width: Option<i64>,
    #[serde(default, deserialize_with = "optional_i64")]
    height: Option<i64>,
    #[serde(default = "enabled", deserialize_with = "flag")]
    enable_hardware_acceleration: bool,
}

#[derive(Debug, Deserialize)]
struct SetSizeArgs {
    #[serde(deserialize_with = "required_i64")]
    handle: i64,
    #[serde(default, deserialize_with = "optional_i64")]
    width: Option<i64>,
    #[serde(default, deserialize_with = "optional_i64")]
    height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DisposeArgs {
    #[serde(deserialize_with = "required_i64")]
    handle: i64,
}

fn enabled() -> bool {
    true
}

fn loose_i64(value: &Value) -> std::result::Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| format!("not an integer: {number}")),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() || text == "null" {
                Ok(None)
            } else {
                text.parse()
                    .map(Some)
                    .map_err(|_| format!("not an integer: {text:?}"))
            }
        }
        other => Err(format!("expected an integer, got {other}")),
    }
}

fn optional_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<i64>, D::Error> {
    loose_i64(&Value::deserialize(deserializer)?).map_err(D::Error::custom)
}

fn required_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    optional_i64(deserializer)?.ok_or_else(|| D::Error::custom("value is null"))
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(true),
        Value::Bool(value) => Ok(value),
        Value::String(text) => match text.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            "" | "null" => Ok(true),
            other => Err(D::Error::custom(format!("not a boolean: {other:?}"))),
        },
        Value::Number(number) => Ok(number.as_f64().is_some_and(|n| n != 0.0)),
        other => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T> {
    Ok(T::deserialize(args)?)
}

/// ### English
/// Dispatches one method call to `manager`.
///
/// Calls on unknown handles (already disposed, never created) succeed without effect.
///
/// #### Parameters
/// - `manager`: Session registry the call acts on.
/// - `method`: Method name, e.g. [`METHOD_CREATE`].
/// - `args`: JSON argument map.
///
/// ### 中文
/// 把一次方法调用分派给 `manager`。
///
/// 针对未知句柄（已释放或从未创建）的调用直接成功且不产生任何效果。
///
/// #### 参数
/// - `manager`：调用作用的会话注册表。
/// - `method`：方法名，例如 [`METHOD_CREATE`]。
/// - `args`：JSON 参数表。
pub fn handle_method_call(manager: &VideoOutputManager, method: &str, args: &Value) -> MethodResponse {
    let outcome = match method {
        METHOD_CREATE => parse::<CreateArgs>(args).and_then(|args| {
            let config = SessionConfig {
                size: OutputSize::from_request(args.width, args.height),
                enable_hardware_acceleration: args.enable_hardware_acceleration,
            };
            manager.create(args.handle, config).map(|_| ())
        }),
        METHOD_SET_SIZE => parse::<SetSizeArgs>(args).and_then(|args| {
            manager.set_size(args.handle, OutputSize::from_request(args.width, args.height))
        }),
        METHOD_DISPOSE => parse::<DisposeArgs>(args).and_then(|args| manager.dispose(args.handle)),
        _ => return MethodResponse::NotImplemented,
    };

    match outcome {
        Ok(()) => MethodResponse::Success(Value::Null),
        Err(BridgeError::StaleSession) => {
            tracing::debug!(method, "call for an unknown video output ignored");
            MethodResponse::Success(Value::Null)
        }
        Err(err @ BridgeError::Protocol(_)) => {
            tracing::warn!(method, %err, "malformed method call");
            MethodResponse::error("INVALID_ARGUMENTS", &err)
        }
        Err(err) => {
            tracing::error!(method, %err, "method call failed");
            MethodResponse::error("VIDEO_OUTPUT_ERROR", &err)
        }
    }
}

/// ### English
/// Payload of the `VideoOutput.Resize` notification.
///
/// ### 中文
/// `VideoOutput.Resize` 通知的负载。
pub fn resize_notification(handle: i64, texture_id: i64, size: PhysicalSize<u32>) -> Value {
    json!({
        "handle": handle,
        "id": texture_id,
        "rect": {
            "left": 0,
            "top": 0,
            "width": size.width,
            "height": size.height,
        },
    })
}
