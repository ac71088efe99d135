/// 检测系统 (Detection System)
///
/// 外部姿态模型输出的数据结构 + 身份跟踪
/// - Types:   检测框、关键点、COCO-17 索引
/// - Tracker: 质心跟踪 (速度预测)
pub mod tracker;
pub mod types;

pub use tracker::{CentroidTracker, TrackedIdentity, Tracker};
pub use types::{keypoints, BBox, Detection, PoseKeypoints, SKELETON};
