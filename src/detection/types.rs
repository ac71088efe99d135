/// 姿态检测数据结构定义
/// Data structures for pose detections
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

// ========== 公共常量 ==========

/// COCO-17 关键点索引 (Keypoint schema)
pub mod keypoints {
    pub const NOSE: usize = 0;
    pub const LEFT_EYE: usize = 1;
    pub const RIGHT_EYE: usize = 2;
    pub const LEFT_SHOULDER: usize = 5;
    pub const RIGHT_SHOULDER: usize = 6;
    pub const LEFT_WRIST: usize = 9;
    pub const RIGHT_WRIST: usize = 10;
    pub const LEFT_HIP: usize = 11;
    pub const RIGHT_HIP: usize = 12;

    /// 脸部 (鼻子, 双眼)
    pub const FACE: [usize; 3] = [NOSE, LEFT_EYE, RIGHT_EYE];
    /// 胸部 (以双肩近似)
    pub const CHEST: [usize; 2] = [LEFT_SHOULDER, RIGHT_SHOULDER];
    /// 髋部
    pub const HIPS: [usize; 2] = [LEFT_HIP, RIGHT_HIP];
    /// 手 (手腕)
    pub const HANDS: [usize; 2] = [LEFT_WRIST, RIGHT_WRIST];
    /// 躯干 (双肩 + 双髋)
    pub const TORSO: [usize; 4] = [LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_HIP, RIGHT_HIP];

    /// 标准 COCO 关键点数量
    pub const COUNT: usize = 17;
    /// 风险引擎至少需要索引 0..=12
    pub const REQUIRED: usize = RIGHT_HIP + 1;
}

/// 骨架连线 (COCO-17)
pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// 姿态关键点 (Pose keypoints)
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseKeypoints {
    pub points: Vec<(f32, f32, f32)>, // (x, y, confidence)
}

impl PoseKeypoints {
    pub fn new(points: Vec<(f32, f32, f32)>) -> Self {
        Self { points }
    }

    /// 全部置信度为0的17点骨架 (便于逐个设置关键点)
    pub fn empty() -> Self {
        Self {
            points: vec![(0.0, 0.0, 0.0); keypoints::COUNT],
        }
    }

    /// 设置单个关键点,超出长度时自动补齐
    pub fn with(mut self, idx: usize, x: f32, y: f32, confidence: f32) -> Self {
        if idx >= self.points.len() {
            self.points.resize(idx + 1, (0.0, 0.0, 0.0));
        }
        self.points[idx] = (x, y, confidence);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 置信度不低于 `min_conf` 的关键点位置
    pub fn confident(&self, idx: usize, min_conf: f32) -> Option<(f32, f32)> {
        match self.points.get(idx) {
            Some(&(x, y, c)) if c >= min_conf => Some((x, y)),
            _ => None,
        }
    }

    /// 一组索引中所有可信关键点
    pub fn confident_group<'a>(
        &'a self,
        group: &'a [usize],
        min_conf: f32,
    ) -> impl Iterator<Item = (f32, f32)> + 'a {
        group.iter().filter_map(move |&idx| self.confident(idx, min_conf))
    }
}

/// 单人单帧检测 (外部姿态模型输出 + 跟踪器填入的身份)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub center: (f32, f32),
    pub keypoints: PoseKeypoints,
    pub score: f32,

    /// 跟踪ID (仅由跟踪器写入)
    #[serde(default)]
    pub identity: Option<u32>,
}

impl Detection {
    /// 由检测框推导中心点
    pub fn new(bbox: BBox, keypoints: PoseKeypoints, score: f32) -> Self {
        let center = bbox.center();
        Self {
            bbox,
            center,
            keypoints,
            score,
            identity: None,
        }
    }

    /// 输入校验: 关键点数量、置信度范围、坐标有限性
    pub fn validate(&self) -> Result<(), DetectionError> {
        let b = &self.bbox;
        if ![b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()) {
            return Err(DetectionError::NonFiniteCoordinate("bbox"));
        }
        if b.x2 < b.x1 || b.y2 < b.y1 {
            return Err(DetectionError::InvalidBox {
                x1: b.x1,
                y1: b.y1,
                x2: b.x2,
                y2: b.y2,
            });
        }
        if !self.center.0.is_finite() || !self.center.1.is_finite() {
            return Err(DetectionError::NonFiniteCoordinate("center"));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(DetectionError::ConfidenceOutOfRange {
                field: "score",
                value: self.score,
            });
        }
        if self.keypoints.len() < keypoints::REQUIRED {
            return Err(DetectionError::TooFewKeypoints {
                found: self.keypoints.len(),
                required: keypoints::REQUIRED,
            });
        }
        for &(x, y, c) in &self.keypoints.points {
            if !(0.0..=1.0).contains(&c) {
                return Err(DetectionError::ConfidenceOutOfRange {
                    field: "keypoint",
                    value: c,
                });
            }
            if !x.is_finite() || !y.is_finite() {
                return Err(DetectionError::NonFiniteCoordinate("keypoint"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Detection {
        Detection::new(
            BBox::new(0.0, 0.0, 100.0, 200.0),
            PoseKeypoints::empty().with(keypoints::NOSE, 50.0, 20.0, 0.9),
            0.8,
        )
    }

    #[test]
    fn test_center_from_bbox() {
        let det = person();
        assert_eq!(det.center, (50.0, 100.0));
        assert_eq!(det.identity, None);
    }

    #[test]
    fn test_validate_accepts_coco_detection() {
        assert!(person().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_keypoints() {
        let mut det = person();
        det.keypoints.points.truncate(5);
        assert_eq!(
            det.validate(),
            Err(DetectionError::TooFewKeypoints {
                found: 5,
                required: keypoints::REQUIRED
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_confidence() {
        let mut det = person();
        det.keypoints.points[3].2 = 1.5;
        assert!(matches!(
            det.validate(),
            Err(DetectionError::ConfidenceOutOfRange { field: "keypoint", .. })
        ));

        let mut det = person();
        det.score = -0.1;
        assert!(matches!(
            det.validate(),
            Err(DetectionError::ConfidenceOutOfRange { field: "score", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nan_and_inverted_box() {
        let mut det = person();
        det.keypoints.points[0].0 = f32::NAN;
        assert_eq!(
            det.validate(),
            Err(DetectionError::NonFiniteCoordinate("keypoint"))
        );

        let mut det = person();
        det.bbox = BBox::new(10.0, 10.0, 5.0, 20.0);
        assert!(matches!(det.validate(), Err(DetectionError::InvalidBox { .. })));
    }

    #[test]
    fn test_confident_filters_low_confidence() {
        let kpts = PoseKeypoints::empty()
            .with(keypoints::LEFT_WRIST, 1.0, 2.0, 0.4)
            .with(keypoints::RIGHT_WRIST, 3.0, 4.0, 0.6);
        assert_eq!(kpts.confident(keypoints::LEFT_WRIST, 0.5), None);
        assert_eq!(kpts.confident(keypoints::RIGHT_WRIST, 0.5), Some((3.0, 4.0)));
        assert_eq!(kpts.confident(40, 0.5), None);
        assert_eq!(kpts.confident_group(&keypoints::HANDS, 0.5).count(), 1);
    }

    #[test]
    fn test_deserialize_keypoint_triples() {
        let json = r#"{
            "bbox": {"x1": 0, "y1": 0, "x2": 10, "y2": 10},
            "center": [5, 5],
            "keypoints": [[1, 2, 0.5], [3, 4, 0.9]],
            "score": 0.7
        }"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.keypoints.points[1], (3.0, 4.0, 0.9));
        assert_eq!(det.identity, None);
    }
}
