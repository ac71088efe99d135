//! 质心跟踪器 (Centroid tracker)
//!
//! 最近邻质心匹配 + 速度预测:
//! 1. 按输入顺序,每个检测在本帧未被认领的身份中寻找预测位置最近者
//! 2. 距离小于门限才接受,否则分配新的单调递增ID
//! 3. 未匹配的身份保留 `max_lost` 秒后移除

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use super::types::Detection;
use crate::config::{secs_to_duration, TrackerConfig};

// ========== 公共数据结构 ==========

/// 跟踪身份 (Tracked identity)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedIdentity {
    /// 唯一跟踪ID (永不复用)
    pub id: u32,

    /// 最近一次观测的中心点
    pub center: (f32, f32),

    /// 每次更新的位移 (Δx, Δy)
    pub velocity: (f32, f32),

    /// 最近一次匹配时间
    pub last_seen: Instant,

    /// 总共被匹配的帧数 (age)
    pub total_frames: u32,
}

impl TrackedIdentity {
    fn new(id: u32, center: (f32, f32), now: Instant) -> Self {
        Self {
            id,
            center,
            velocity: (0.0, 0.0),
            last_seen: now,
            total_frames: 1,
        }
    }

    /// 预测位置 = 上次中心 + 上次速度
    pub fn predicted(&self) -> (f32, f32) {
        (
            self.center.0 + self.velocity.0,
            self.center.1 + self.velocity.1,
        )
    }

    fn observe(&mut self, center: (f32, f32), now: Instant) {
        self.velocity = (center.0 - self.center.0, center.1 - self.center.1);
        self.center = center;
        self.last_seen = now;
        self.total_frames += 1;
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 更新跟踪器,为每个检测写入 `identity`
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测 (原地标注)
    /// - `now`: 当前帧时间
    fn update(&mut self, detections: &mut [Detection], now: Instant);

    /// 重置跟踪器 (清除所有跟踪,ID计数不回退)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

/// 最近邻质心跟踪器
#[derive(Debug)]
pub struct CentroidTracker {
    /// 活跃身份 (按ID有序,保证遍历确定性)
    objects: BTreeMap<u32, TrackedIdentity>,

    /// 下一个分配的ID
    next_id: u32,

    /// 匹配门限 (像素)
    max_distance: f32,

    /// 丢失保留时长
    max_lost: Duration,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl CentroidTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            max_distance: config.max_distance,
            max_lost: secs_to_duration(config.max_lost),
        }
    }

    /// 当前所有活跃身份
    pub fn identities(&self) -> impl Iterator<Item = &TrackedIdentity> {
        self.objects.values()
    }

    pub fn identity(&self, id: u32) -> Option<&TrackedIdentity> {
        self.objects.get(&id)
    }

    /// 下一个将被分配的ID
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    fn nearest_unclaimed(&self, center: (f32, f32), claimed: &HashSet<u32>) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (id, obj) in &self.objects {
            if claimed.contains(id) {
                continue;
            }
            let dist = distance(center, obj.predicted());
            let limit = best.map_or(self.max_distance, |(_, d)| d);
            if dist < limit {
                best = Some((*id, dist));
            }
        }
        best.map(|(id, _)| id)
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, detections: &mut [Detection], now: Instant) {
        let mut claimed: HashSet<u32> = HashSet::with_capacity(detections.len());

        for det in detections.iter_mut() {
            let id = match self.nearest_unclaimed(det.center, &claimed) {
                Some(id) => {
                    if let Some(obj) = self.objects.get_mut(&id) {
                        obj.observe(det.center, now);
                    }
                    id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.objects
                        .insert(id, TrackedIdentity::new(id, det.center, now));
                    debug!(id, cx = det.center.0, cy = det.center.1, "new identity");
                    id
                }
            };
            claimed.insert(id);
            det.identity = Some(id);
        }

        // 清理超时的丢失身份
        let max_lost = self.max_lost;
        self.objects.retain(|id, obj| {
            let keep =
                claimed.contains(id) || now.saturating_duration_since(obj.last_seen) <= max_lost;
            if !keep {
                debug!(id = *id, "identity expired");
            }
            keep
        });
    }

    fn reset(&mut self) {
        self.objects.clear();
    }

    fn track_count(&self) -> usize {
        self.objects.len()
    }
}

// ========== 工具函数 ==========

/// 欧氏距离
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
