//! 错误类型 (Error types)
//!
//! 流水线内部没有致命错误: 单个检测、单次证据写入失败都只影响自身。

use std::path::PathBuf;
use thiserror::Error;

/// 流水线通用结果类型
pub type SentinelResult<T> = Result<T, SentinelError>;

/// 单个检测的输入错误 (按检测拒绝,不中断整帧)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("too few keypoints: found {found}, need at least {required}")]
    TooFewKeypoints { found: usize, required: usize },

    #[error("confidence {value} out of range [0, 1] ({field})")]
    ConfidenceOutOfRange { field: &'static str, value: f32 },

    #[error("non-finite coordinate in {0}")]
    NonFiniteCoordinate(&'static str),

    #[error("invalid bounding box: ({x1}, {y1}) -> ({x2}, {y2})")]
    InvalidBox { x1: f32, y1: f32, x2: f32, y2: f32 },
}

/// 配置加载/校验错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// 证据写入错误 (只记录日志,从不终止流水线)
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("evidence encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("evidence queue full, dropped {0}")]
    QueueFull(PathBuf),

    #[error("evidence writer closed")]
    Closed,
}

/// 顶层错误
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error("pipeline worker stopped")]
    WorkerStopped,
}
