//! 告警管理 (Alert manager)
//!
//! 状态机: IDLE → ESCALATING → (触发) → IDLE
//! - 风险 ≥ 阈值: 记录升级开始时间
//! - 持续 ≥ sustain 且距上次告警 ≥ cooldown: 触发告警,保存证据
//! - 持续期间风险回落: 直接回到 IDLE

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::evidence::{evidence_file_name, risk_percent, EvidenceJob, EvidenceSink};
use crate::config::{secs_to_duration, AlertConfig};
use crate::detection::types::Detection;

/// 告警状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertPhase {
    Idle,
    Escalating { since: Instant },
}

/// 告警事件
#[derive(Clone, Debug, Serialize)]
pub struct AlertEvent {
    pub fired_at: DateTime<Local>,
    pub risk: f32,
    pub risk_percent: u32,
    pub evidence_path: PathBuf,
    /// 证据是否成功进入写入队列
    pub evidence_queued: bool,
}

pub struct AlertManager {
    risk_threshold: f32,
    sustain: Duration,
    cooldown: Duration,
    evidence_dir: PathBuf,

    phase: AlertPhase,
    last_alert: Option<Instant>,
    alerts_fired: u64,

    sink: Box<dyn EvidenceSink>,
}

impl AlertManager {
    pub fn new(config: &AlertConfig, sink: Box<dyn EvidenceSink>) -> Self {
        Self {
            risk_threshold: config.risk_threshold,
            sustain: secs_to_duration(config.sustain_secs),
            cooldown: secs_to_duration(config.cooldown_secs),
            evidence_dir: config.evidence_dir.clone(),
            phase: AlertPhase::Idle,
            last_alert: None,
            alerts_fired: 0,
            sink,
        }
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    pub fn alerts_fired(&self) -> u64 {
        self.alerts_fired
    }

    /// 以当前时间更新
    pub fn update(
        &mut self,
        frame: &RgbImage,
        detections: &[Detection],
        risk: f32,
    ) -> Option<AlertEvent> {
        self.update_at(frame, detections, risk, Instant::now(), Local::now())
    }

    /// 以指定时间更新
    ///
    /// `now` 驱动状态机,`wall` 只用于证据文件名。
    pub fn update_at(
        &mut self,
        frame: &RgbImage,
        detections: &[Detection],
        risk: f32,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Option<AlertEvent> {
        if !(risk >= self.risk_threshold) {
            if let AlertPhase::Escalating { since } = self.phase {
                debug!(
                    held = now.saturating_duration_since(since).as_secs_f32(),
                    "risk dropped before sustain, reset"
                );
            }
            self.phase = AlertPhase::Idle;
            return None;
        }

        let since = match self.phase {
            AlertPhase::Idle => {
                debug!(risk, "high risk, escalating");
                self.phase = AlertPhase::Escalating { since: now };
                return None;
            }
            AlertPhase::Escalating { since } => since,
        };

        let sustained = now.saturating_duration_since(since) >= self.sustain;
        let cooled = self
            .last_alert
            .map_or(true, |last| now.saturating_duration_since(last) >= self.cooldown);
        if !(sustained && cooled) {
            return None;
        }

        Some(self.fire(frame, detections, risk, now, wall))
    }

    fn fire(
        &mut self,
        frame: &RgbImage,
        detections: &[Detection],
        risk: f32,
        now: Instant,
        wall: DateTime<Local>,
    ) -> AlertEvent {
        let evidence_path = self.evidence_dir.join(evidence_file_name(&wall, risk));
        let job = EvidenceJob {
            path: evidence_path.clone(),
            image: frame.clone(),
            detections: detections.to_vec(),
        };
        // 证据失败不影响状态推进
        let evidence_queued = match self.sink.submit(job) {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ 证据提交失败: {}", e);
                false
            }
        };

        self.last_alert = Some(now);
        self.phase = AlertPhase::Idle;
        self.alerts_fired += 1;

        let percent = risk_percent(risk);
        info!(
            "🚨 告警触发 | 风险={}% | 证据 {}",
            percent,
            evidence_path.display()
        );

        AlertEvent {
            fired_at: wall,
            risk,
            risk_percent: percent,
            evidence_path,
            evidence_queued,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvidenceError;
    use crate::events::evidence::EvidenceWriter;
    use crossbeam_channel::{bounded, unbounded};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        jobs: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl EvidenceSink for RecordingSink {
        fn submit(&self, job: EvidenceJob) -> Result<(), EvidenceError> {
            self.jobs.lock().unwrap().push(job.path);
            Ok(())
        }
    }

    struct FailingSink;

    impl EvidenceSink for FailingSink {
        fn submit(&self, _job: EvidenceJob) -> Result<(), EvidenceError> {
            Err(EvidenceError::Closed)
        }
    }

    fn manager(sink: Box<dyn EvidenceSink>) -> AlertManager {
        AlertManager::new(&AlertConfig::default(), sink)
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_sustained_risk_fires_once_per_cooldown() {
        let sink = RecordingSink::default();
        let mut alerts = manager(Box::new(sink.clone()));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();

        let mut fired_at = Vec::new();
        for step in 0..=150u64 {
            let now = ms(t0, step * 100);
            if alerts.update_at(&frame, &[], 0.9, now, wall).is_some() {
                fired_at.push(step * 100);
            }
        }
        // 第一次在 2.0s; 之后升级从 2.1s 重新开始,冷却到 12.0s 结束
        assert_eq!(fired_at, vec![2000, 12000]);
        assert_eq!(sink.jobs.lock().unwrap().len(), 2);
        assert_eq!(alerts.alerts_fired(), 2);
    }

    #[test]
    fn test_short_spike_never_fires() {
        let mut alerts = manager(Box::new(RecordingSink::default()));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();

        for cycle in 0..10u64 {
            let base = cycle * 3000;
            for step in 0..19u64 {
                let now = ms(t0, base + step * 100);
                assert!(alerts.update_at(&frame, &[], 0.95, now, wall).is_none());
            }
            // 1.9s 后回落
            assert!(alerts
                .update_at(&frame, &[], 0.2, ms(t0, base + 1900), wall)
                .is_none());
            assert_eq!(alerts.phase(), AlertPhase::Idle);
        }
        assert_eq!(alerts.alerts_fired(), 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut alerts = manager(Box::new(RecordingSink::default()));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();
        assert!(alerts.update_at(&frame, &[], 0.75, t0, wall).is_none());
        assert_eq!(alerts.phase(), AlertPhase::Escalating { since: t0 });
        let event = alerts
            .update_at(&frame, &[], 0.75, ms(t0, 2000), wall)
            .unwrap();
        assert_eq!(event.risk_percent, 75);
        assert_eq!(alerts.last_alert(), Some(ms(t0, 2000)));
    }

    #[test]
    fn test_evidence_path_uses_timestamp_and_percent() {
        let sink = RecordingSink::default();
        let mut alerts = manager(Box::new(sink.clone()));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();
        alerts.update_at(&frame, &[], 0.9, t0, wall);
        let event = alerts.update_at(&frame, &[], 0.9, ms(t0, 2500), wall).unwrap();

        let expected = PathBuf::from("evidence").join(evidence_file_name(&wall, 0.9));
        assert_eq!(event.evidence_path, expected);
        assert!(event.evidence_queued);
        assert_eq!(sink.jobs.lock().unwrap()[0], expected);
    }

    #[test]
    fn test_failed_evidence_still_starts_cooldown() {
        let mut alerts = manager(Box::new(FailingSink));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();

        let mut events = Vec::new();
        for step in 0..=100u64 {
            if let Some(e) = alerts.update_at(&frame, &[], 1.0, ms(t0, step * 100), wall) {
                events.push(e);
            }
        }
        assert_eq!(events.len(), 1);
        assert!(!events[0].evidence_queued);
        assert_eq!(alerts.last_alert(), Some(ms(t0, 2000)));
    }

    #[test]
    fn test_nan_risk_resets() {
        let mut alerts = manager(Box::new(RecordingSink::default()));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();
        alerts.update_at(&frame, &[], 0.9, t0, wall);
        alerts.update_at(&frame, &[], f32::NAN, ms(t0, 100), wall);
        assert_eq!(alerts.phase(), AlertPhase::Idle);
    }

    #[test]
    fn test_full_evidence_queue_still_fires() {
        let (started_tx, started) = unbounded::<PathBuf>();
        let (release, gate) = bounded::<()>(0);
        let writer = EvidenceWriter::spawn_with(1, move |job| {
            let _ = started_tx.send(job.path.clone());
            let _ = gate.recv();
            Ok(())
        });
        let config = AlertConfig {
            sustain_secs: 0.0,
            cooldown_secs: 0.0,
            ..AlertConfig::default()
        };
        let mut alerts = AlertManager::new(&config, Box::new(writer));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();

        // 每两次更新触发一次: Idle → Escalating → 触发
        let fire = |alerts: &mut AlertManager, step: u64| {
            assert!(alerts.update_at(&frame, &[], 0.9, ms(t0, step * 10), wall).is_none());
            alerts
                .update_at(&frame, &[], 0.9, ms(t0, step * 10 + 5), wall)
                .unwrap()
        };

        assert!(fire(&mut alerts, 0).evidence_queued);
        started.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fire(&mut alerts, 1).evidence_queued);

        let dropped = fire(&mut alerts, 2);
        assert!(!dropped.evidence_queued);
        assert_eq!(alerts.alerts_fired(), 3);
        assert_eq!(alerts.last_alert(), Some(ms(t0, 25)));
        assert_eq!(alerts.phase(), AlertPhase::Idle);

        drop(release);
    }

    #[test]
    fn test_huge_cooldown_does_not_panic() {
        let config = AlertConfig {
            sustain_secs: 1e20,
            cooldown_secs: f32::INFINITY,
            ..AlertConfig::default()
        };
        let mut alerts = AlertManager::new(&config, Box::new(RecordingSink::default()));
        let frame = RgbImage::new(4, 4);
        let t0 = Instant::now();
        let wall = Local::now();
        alerts.update_at(&frame, &[], 0.9, t0, wall);
        assert!(alerts
            .update_at(&frame, &[], 0.9, ms(t0, 60_000), wall)
            .is_none());
        assert_eq!(alerts.alerts_fired(), 0);
    }
}
