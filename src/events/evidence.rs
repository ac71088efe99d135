//! 证据保存 (Evidence persistence)
//!
//! 告警时的画面交给独立写入线程: 绘制标注 → JPEG编码 → 落盘。
//! 写入慢或失败都不会阻塞风险评估路径。

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender, TrySendError};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::{error, info, warn};

use crate::detection::tracker::id_to_color;
use crate::detection::types::{Detection, SKELETON};
use crate::error::EvidenceError;

/// 绘制骨架时的关键点置信度下限
const DRAW_KEYPOINT_CONF: f32 = 0.5;

/// 证据文件名: alert_YYYYMMDD_HHMMSS_<风险百分比>.jpg
pub fn evidence_file_name(at: &DateTime<Local>, risk: f32) -> String {
    format!("alert_{}_{}.jpg", at.format("%Y%m%d_%H%M%S"), risk_percent(risk))
}

/// 整数风险百分比 (截断)
pub fn risk_percent(risk: f32) -> u32 {
    (risk.clamp(0.0, 1.0) * 100.0) as u32
}

/// 一次证据写入任务
#[derive(Clone, Debug)]
pub struct EvidenceJob {
    pub path: PathBuf,
    pub image: RgbImage,
    pub detections: Vec<Detection>,
}

/// 证据接收端 Trait
pub trait EvidenceSink: Send {
    /// 提交写入任务,不得阻塞
    fn submit(&self, job: EvidenceJob) -> Result<(), EvidenceError>;
}

/// 在画面上绘制检测框与骨架
pub fn annotate(image: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
        let (r, g, b) = det.identity.map(id_to_color).unwrap_or((200, 200, 200));
        let color = Rgb([r, g, b]);

        let width = det.bbox.width().max(1.0) as u32;
        let height = det.bbox.height().max(1.0) as u32;
        let rect = Rect::at(det.bbox.x1 as i32, det.bbox.y1 as i32).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);

        for &(i, j) in &SKELETON {
            let (Some(p1), Some(p2)) = (
                det.keypoints.confident(i, DRAW_KEYPOINT_CONF),
                det.keypoints.confident(j, DRAW_KEYPOINT_CONF),
            ) else {
                continue;
            };
            draw_line_segment_mut(image, p1, p2, color);
        }
        for &(x, y, c) in &det.keypoints.points {
            if c >= DRAW_KEYPOINT_CONF {
                draw_filled_circle_mut(image, (x as i32, y as i32), 3, color);
            }
        }
    }
}

/// 同步写入 (写入线程内调用)
pub fn write_evidence(job: &EvidenceJob) -> Result<(), EvidenceError> {
    if let Some(dir) = job.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(dir)?;
    }
    let mut image = job.image.clone();
    annotate(&mut image, &job.detections);
    image.save_with_format(&job.path, ImageFormat::Jpeg)?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<(), EvidenceError> {
    fs::create_dir_all(dir).map_err(|source| EvidenceError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// 后台证据写入线程
pub struct EvidenceWriter {
    tx: Option<Sender<EvidenceJob>>,
    handle: Option<JoinHandle<()>>,
}

impl EvidenceWriter {
    /// 启动写入线程,`capacity` 为排队任务上限
    pub fn spawn(capacity: usize) -> Self {
        Self::spawn_with(capacity, write_evidence)
    }

    /// 使用自定义写入函数启动写入线程
    pub fn spawn_with<F>(capacity: usize, mut write: F) -> Self
    where
        F: FnMut(&EvidenceJob) -> Result<(), EvidenceError> + Send + 'static,
    {
        let (tx, rx) = bounded::<EvidenceJob>(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("evidence-writer".into())
            .spawn(move || {
                for job in rx.iter() {
                    match write(&job) {
                        Ok(()) => info!("💾 证据已保存: {}", job.path.display()),
                        Err(e) => error!("❌ 证据保存失败 {}: {}", job.path.display(), e),
                    }
                }
            });

        match handle {
            Ok(handle) => Self {
                tx: Some(tx),
                handle: Some(handle),
            },
            Err(e) => {
                error!("❌ 证据写入线程启动失败: {}", e);
                Self {
                    tx: None,
                    handle: None,
                }
            }
        }
    }

    /// 等待队列中的任务写完
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("❌ 证据写入线程异常退出");
            }
        }
    }
}

impl EvidenceSink for EvidenceWriter {
    fn submit(&self, job: EvidenceJob) -> Result<(), EvidenceError> {
        let Some(tx) = &self.tx else {
            return Err(EvidenceError::Closed);
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!("⚠️ 证据队列已满,丢弃 {}", job.path.display());
                Err(EvidenceError::QueueFull(job.path))
            }
            Err(TrySendError::Disconnected(_)) => Err(EvidenceError::Closed),
        }
    }
}

impl Drop for EvidenceWriter {
    fn drop(&mut self) {
        self.close();
    }
}
