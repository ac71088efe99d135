//! 接触分类 (Contact classification)
//!
//! 基于关键点的几何启发式:
//! - 侵入: 手 → 对方脸/胸,或"移动中的"手 → 对方髋
//! - 被动: 无手部接触,但双方躯干(肩/髋)靠近
//! - 无:   其他情况

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::pair::PairKey;
use crate::config::{DirectionPolicy, RiskConfig};
use crate::detection::tracker::distance;
use crate::detection::types::{keypoints, Detection};

/// 除以 dt 时的下限 (秒)
pub const DT_EPSILON: f32 = 1e-6;

/// 接触等级 (按严重程度排序)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    None,
    Passive,
    Intrusive,
}

/// 一对身份在本帧的接触结果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairContact {
    pub pair: PairKey,
    pub kind: ContactKind,
    /// 单向侵入时伸手的一方
    pub aggressor: Option<u32>,
}

// ========== 手部运动 ==========

/// 手部运动历史 (身份, 手索引) → 上一帧位置
///
/// 每帧每只手只评估一次,与参与多少对无关。
#[derive(Debug, Default)]
pub struct HandMotion {
    prev: HashMap<(u32, usize), (f32, f32)>,
    moving: HashSet<(u32, usize)>,
}

impl HandMotion {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新本帧所有已跟踪人员的手部速度
    pub fn update<'a>(
        &mut self,
        detections: impl IntoIterator<Item = &'a Detection>,
        dt: f32,
        min_conf: f32,
        min_speed: f32,
    ) {
        self.moving.clear();
        let dt = dt.max(DT_EPSILON);
        let mut present = HashSet::new();

        for det in detections {
            let Some(id) = det.identity else { continue };
            present.insert(id);

            for hand in keypoints::HANDS {
                let Some(pos) = det.keypoints.confident(hand, min_conf) else {
                    continue;
                };
                if let Some(prev) = self.prev.insert((id, hand), pos) {
                    let speed = distance(pos, prev) / dt;
                    if speed > min_speed {
                        self.moving.insert((id, hand));
                    }
                }
            }
        }

        // 身份消失后历史失效
        self.prev.retain(|(id, _), _| present.contains(id));
    }

    pub fn is_moving(&self, id: u32, hand: usize) -> bool {
        self.moving.contains(&(id, hand))
    }

    pub fn clear(&mut self) {
        self.prev.clear();
        self.moving.clear();
    }
}

// ========== 接触分类器 ==========

/// 成对接触分类器
#[derive(Clone, Debug)]
pub struct ContactClassifier {
    hand_contact_distance: f32,
    torso_contact_distance: f32,
    min_conf: f32,
    policy: DirectionPolicy,
}

impl ContactClassifier {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            hand_contact_distance: config.hand_contact_distance,
            torso_contact_distance: config.torso_contact_distance,
            min_conf: config.keypoint_confidence,
            policy: config.direction_policy,
        }
    }

    pub fn policy(&self) -> DirectionPolicy {
        self.policy
    }

    /// 单向侵入判定 (src 的手 → tgt 的身体)
    pub fn hand_to_body(&self, src: &Detection, tgt: &Detection, motion: &HandMotion) -> bool {
        let Some(src_id) = src.identity else {
            return false;
        };
        let near = |hand: (f32, f32), group: &[usize]| {
            tgt.keypoints
                .confident_group(group, self.min_conf)
                .any(|p| distance(hand, p) < self.hand_contact_distance)
        };

        keypoints::HANDS.iter().any(|&h| {
            let Some(hand) = src.keypoints.confident(h, self.min_conf) else {
                return false;
            };
            // 脸/胸: 无需运动
            if near(hand, &keypoints::FACE[..]) || near(hand, &keypoints::CHEST[..]) {
                return true;
            }
            // 髋: 仅在手移动时计入
            motion.is_moving(src_id, h) && near(hand, &keypoints::HIPS[..])
        })
    }

    /// 躯干接近 (任一肩/髋点对小于阈值)
    pub fn torso_proximity(&self, a: &Detection, b: &Detection) -> bool {
        a.keypoints
            .confident_group(&keypoints::TORSO, self.min_conf)
            .any(|pa| {
                b.keypoints
                    .confident_group(&keypoints::TORSO, self.min_conf)
                    .any(|pb| distance(pa, pb) < self.torso_contact_distance)
            })
    }

    /// 双向分类,返回 `None` 表示任一方缺少身份
    pub fn classify(
        &self,
        a: &Detection,
        b: &Detection,
        motion: &HandMotion,
    ) -> Option<PairContact> {
        let (id_a, id_b) = (a.identity?, b.identity?);
        if id_a == id_b {
            return None;
        }

        let a_to_b = self.hand_to_body(a, b, motion);
        let b_to_a = self.hand_to_body(b, a, motion);

        let (kind, aggressor) = match (a_to_b, b_to_a, self.policy) {
            (true, true, DirectionPolicy::RejectSymmetric) => (ContactKind::Passive, None),
            (true, true, DirectionPolicy::MaxOfBoth) => (ContactKind::Intrusive, None),
            (true, false, _) => (ContactKind::Intrusive, Some(id_a)),
            (false, true, _) => (ContactKind::Intrusive, Some(id_b)),
            (false, false, _) if self.torso_proximity(a, b) => (ContactKind::Passive, None),
            (false, false, _) => (ContactKind::None, None),
        };

        Some(PairContact {
            pair: PairKey::new(id_a, id_b),
            kind,
            aggressor,
        })
    }
}
