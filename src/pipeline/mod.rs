/// 交互风险流水线 (Interaction-risk Pipeline)
///
/// 每帧严格顺序执行,各阶段只消费上一阶段的输出:
/// - Tracker:      检测 → 带身份的检测
/// - RiskEngine:   带身份的检测 → 场景风险
/// - AlertManager: 场景风险 (+ 当前画面) → 可选告警
pub mod worker;

pub use worker::{FrameSender, PipelineWorker};

use std::time::Instant;

use chrono::{DateTime, Local};
use image::RgbImage;
use tracing::{debug, warn};

use crate::config::SentinelConfig;
use crate::detection::{CentroidTracker, Detection, Tracker};
use crate::events::{AlertEvent, AlertManager, EvidenceSink, EvidenceWriter};
use crate::risk::{PairContact, RiskEngine};

// ========== 消息类型定义 ==========

/// 输入帧 (姿态模型 → 流水线)
#[derive(Clone, Debug)]
pub struct FrameInput {
    pub frame_id: u64,
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    /// 采集时间 (单调时钟,用于 dt)
    pub captured_at: Instant,
    /// 采集时间 (本地时间,用于证据文件名)
    pub wall_time: DateTime<Local>,
}

impl FrameInput {
    /// 以当前时间构造
    pub fn new(frame_id: u64, image: RgbImage, detections: Vec<Detection>) -> Self {
        Self {
            frame_id,
            image,
            detections,
            captured_at: Instant::now(),
            wall_time: Local::now(),
        }
    }

    pub fn at(mut self, captured_at: Instant, wall_time: DateTime<Local>) -> Self {
        self.captured_at = captured_at;
        self.wall_time = wall_time;
        self
    }
}

/// 处理结果 (流水线 → 显示/告警)
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub frame_id: u64,
    /// 带身份的有效检测
    pub detections: Vec<Detection>,
    pub scene_risk: f32,
    /// 本帧被动/侵入接触的身份对
    pub contacts: Vec<PairContact>,
    pub alert: Option<AlertEvent>,
    /// 校验失败被丢弃的检测数
    pub rejected: usize,
    pub process_ms: f64,
}

// ========== 流水线 ==========

pub struct Pipeline {
    tracker: CentroidTracker,
    risk: RiskEngine,
    alerts: AlertManager,
    frames: u64,
}

impl Pipeline {
    pub fn new(config: &SentinelConfig, sink: Box<dyn EvidenceSink>) -> Self {
        Self {
            tracker: CentroidTracker::new(&config.tracker),
            risk: RiskEngine::new(config.risk.clone()),
            alerts: AlertManager::new(&config.alert, sink),
            frames: 0,
        }
    }

    /// 使用后台证据写入线程
    pub fn with_evidence_writer(config: &SentinelConfig) -> Self {
        let writer = EvidenceWriter::spawn(config.alert.evidence_queue);
        Self::new(config, Box::new(writer))
    }

    pub fn process(&mut self, input: FrameInput) -> FrameOutput {
        let start = Instant::now();
        let FrameInput {
            frame_id,
            image,
            detections,
            captured_at,
            wall_time,
        } = input;

        let (mut detections, rejected) = Self::validate(frame_id, detections);

        self.tracker.update(&mut detections, captured_at);
        let scene_risk = self.risk.update_at(&detections, captured_at);
        let alert = self
            .alerts
            .update_at(&image, &detections, scene_risk, captured_at, wall_time);

        self.frames += 1;
        let process_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            frame_id,
            people = detections.len(),
            tracks = self.tracker.track_count(),
            scene_risk,
            process_ms,
            "frame processed"
        );

        FrameOutput {
            frame_id,
            detections,
            scene_risk,
            contacts: self.risk.last_contacts().to_vec(),
            alert,
            rejected,
            process_ms,
        }
    }

    /// 丢弃无效检测,清除外部传入的身份
    fn validate(frame_id: u64, detections: Vec<Detection>) -> (Vec<Detection>, usize) {
        let mut rejected = 0;
        let valid = detections
            .into_iter()
            .filter_map(|mut det| match det.validate() {
                Ok(()) => {
                    det.identity = None;
                    Some(det)
                }
                Err(e) => {
                    warn!(frame_id, "⚠️ 丢弃无效检测: {}", e);
                    rejected += 1;
                    None
                }
            })
            .collect();
        (valid, rejected)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn tracker(&self) -> &CentroidTracker {
        &self.tracker
    }

    pub fn risk_engine(&self) -> &RiskEngine {
        &self.risk
    }

    pub fn alert_manager(&self) -> &AlertManager {
        &self.alerts
    }
}
