// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! HawkEye 交互风险监控
//!
//! 逐帧消费姿态检测,判断多人之间是否存在不安全/侵入性的肢体接触,
//! 输出连续的场景风险与离散告警。
pub mod config; // 监控参数配置
pub mod detection; // 检测数据结构与身份跟踪
pub mod error; // 错误类型
pub mod events; // 告警与证据
pub mod pipeline; // 逐帧流水线与工作线程
pub mod risk; // 接触分类与风险累积

pub use crate::config::{AlertConfig, DirectionPolicy, RiskConfig, SentinelConfig, TrackerConfig};
pub use crate::detection::{BBox, CentroidTracker, Detection, PoseKeypoints, Tracker};
pub use crate::error::{SentinelError, SentinelResult};
pub use crate::events::{AlertEvent, AlertManager, EvidenceSink, EvidenceWriter};
pub use crate::pipeline::{FrameInput, FrameOutput, Pipeline, PipelineWorker};
pub use crate::risk::{ContactKind, PairKey, RiskEngine};
