//! 风险引擎 (Risk engine)
//!
//! 每帧:
//! 1. 对所有带身份的检测两两分类接触
//! 2. 侵入接触快速累积 (dt × 倍率,并设最低值),被动接触线性累积
//! 3. 本帧未刷新的身份对按因子衰减,低于 epsilon 即移除
//! 4. 场景风险 = min(最大计时 / 满风险时间, 1)

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, trace};

use super::contact::{ContactClassifier, ContactKind, HandMotion, PairContact};
use super::pair::PairKey;
use crate::config::RiskConfig;
use crate::detection::types::Detection;

pub struct RiskEngine {
    config: RiskConfig,
    classifier: ContactClassifier,
    motion: HandMotion,

    /// 身份对 → 累积严重度(秒)
    pair_timers: HashMap<PairKey, f32>,

    /// 上一帧的非零接触
    last_contacts: Vec<PairContact>,

    /// 首次更新前为空,首帧 dt = 0
    last_update: Option<Instant>,
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            classifier: ContactClassifier::new(&config),
            config,
            motion: HandMotion::new(),
            pair_timers: HashMap::new(),
            last_contacts: Vec::new(),
            last_update: None,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// 以当前时间更新
    pub fn update(&mut self, detections: &[Detection]) -> f32 {
        self.update_at(detections, Instant::now())
    }

    /// 以指定时间更新 (dt 取自上次更新,首次为 0)
    pub fn update_at(&mut self, detections: &[Detection], now: Instant) -> f32 {
        let dt = self
            .last_update
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32());
        self.last_update = Some(now);
        self.update_with_dt(detections, dt)
    }

    /// 以指定时间差更新,返回场景风险
    pub fn update_with_dt(&mut self, detections: &[Detection], dt: f32) -> f32 {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let tracked: Vec<&Detection> = detections.iter().filter(|d| d.identity.is_some()).collect();

        self.motion.update(
            tracked.iter().copied(),
            dt,
            self.config.keypoint_confidence,
            self.config.min_hand_speed,
        );

        let floor = self.config.time_threshold * self.config.min_intrusive_risk;
        let mut refreshed: HashSet<PairKey> = HashSet::new();
        self.last_contacts.clear();

        for (i, a) in tracked.iter().enumerate() {
            for b in &tracked[i + 1..] {
                let Some(contact) = self.classifier.classify(a, b, &self.motion) else {
                    continue;
                };
                // 同一身份对在一帧内只计一次
                if contact.kind == ContactKind::None || refreshed.contains(&contact.pair) {
                    continue;
                }

                let timer = self.pair_timers.entry(contact.pair).or_insert(0.0);
                match contact.kind {
                    ContactKind::Intrusive => {
                        *timer += dt * self.config.severity_multiplier;
                        *timer = timer.max(floor);
                    }
                    ContactKind::Passive => *timer += dt,
                    ContactKind::None => {}
                }
                trace!(pair = %contact.pair, kind = ?contact.kind, timer = *timer, "pair contact");

                refreshed.insert(contact.pair);
                self.last_contacts.push(contact);
            }
        }

        // 衰减未刷新的身份对
        let decay = self.config.decay_factor;
        let epsilon = self.config.removal_epsilon;
        self.pair_timers.retain(|pair, timer| {
            if refreshed.contains(pair) {
                return true;
            }
            *timer *= decay;
            let keep = *timer >= epsilon;
            if !keep {
                debug!(pair = %pair, "pair timer decayed away");
            }
            keep
        });

        let risk = self.compute_risk();
        debug!(dt, pairs = self.pair_timers.len(), risk, "risk update");
        risk
    }

    /// 场景风险 = 最大身份对计时 / 满风险时间,截断到 [0, 1]
    pub fn compute_risk(&self) -> f32 {
        let max_time = self.pair_timers.values().fold(0.0_f32, |acc, &t| acc.max(t));
        (max_time / self.config.time_threshold).min(1.0)
    }

    pub fn pair_timer(&self, a: u32, b: u32) -> Option<f32> {
        if a == b {
            return None;
        }
        self.pair_timers.get(&PairKey::new(a, b)).copied()
    }

    pub fn pair_timers(&self) -> impl Iterator<Item = (PairKey, f32)> + '_ {
        self.pair_timers.iter().map(|(k, v)| (*k, *v))
    }

    pub fn pair_count(&self) -> usize {
        self.pair_timers.len()
    }

    /// 上一次更新中分类为被动/侵入的身份对
    pub fn last_contacts(&self) -> &[PairContact] {
        &self.last_contacts
    }

    pub fn reset(&mut self) {
        self.pair_timers.clear();
        self.last_contacts.clear();
        self.motion.clear();
        self.last_update = None;
    }
}
