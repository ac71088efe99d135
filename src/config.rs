//! 监控参数配置 - 通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ConfigError;

/// 时长参数上限 (秒)
pub const MAX_DURATION_SECS: f32 = 86_400.0;

/// 秒数 → Duration,负值/NaN 视为 0,溢出时取上限
pub fn secs_to_duration(secs: f32) -> Duration {
    let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, MAX_DURATION_SECS) };
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::from_secs(MAX_DURATION_SECS as u64))
}

fn valid_duration(secs: f32) -> bool {
    (0.0..=MAX_DURATION_SECS).contains(&secs)
}

/// 跟踪器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_distance: f32, // 匹配门限(像素)
    pub max_lost: f32,     // 丢失身份保留时长(秒)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 150.0,
            max_lost: 2.0,
        }
    }
}

/// 双向接触判定策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// 双方同时"侵入"视为相互靠近 (被动接触)
    #[default]
    RejectSymmetric,
    /// 取两个方向中更严重者
    MaxOfBoth,
}

/// 风险引擎参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub hand_contact_distance: f32,  // 手 → 脸/胸/髋 接触距离(像素)
    pub torso_contact_distance: f32, // 躯干 ↔ 躯干 接近距离(像素)
    pub time_threshold: f32,         // 风险达到100%所需时间(秒)
    pub severity_multiplier: f32,    // 侵入接触升级倍率
    pub min_intrusive_risk: f32,     // 侵入接触最低风险
    pub min_hand_speed: f32,         // 手"移动中"的速度阈值(像素/秒)
    pub keypoint_confidence: f32,    // 关键点最低置信度
    pub decay_factor: f32,           // 未接触时每次更新的衰减因子
    pub removal_epsilon: f32,        // 衰减至该值以下即移除
    pub direction_policy: DirectionPolicy,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            hand_contact_distance: 35.0,
            torso_contact_distance: 60.0,
            time_threshold: 1.8,
            severity_multiplier: 4.0,
            min_intrusive_risk: 0.4,
            min_hand_speed: 30.0,
            keypoint_confidence: 0.5,
            decay_factor: 0.9,
            removal_epsilon: 0.1,
            direction_policy: DirectionPolicy::default(),
        }
    }
}

/// 告警参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub risk_threshold: f32,   // 告警风险阈值
    pub sustain_secs: f32,     // 持续高风险时长(秒)
    pub cooldown_secs: f32,    // 两次告警最小间隔(秒)
    pub evidence_dir: PathBuf, // 证据图片目录
    pub evidence_queue: usize, // 证据写入队列长度
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.75,
            sustain_secs: 2.0,
            cooldown_secs: 10.0,
            evidence_dir: PathBuf::from("evidence"),
            evidence_queue: 4,
        }
    }
}

/// 全部参数
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub tracker: TrackerConfig,
    pub risk: RiskConfig,
    pub alert: AlertConfig,
}

impl SentinelConfig {
    /// 从JSON文件加载配置 (文件不存在时写入默认配置)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("📝 配置文件不存在,创建默认配置: {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 加载失败时使用默认值
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("⚠️  配置文件加载失败: {}, 使用默认值", e);
                Self::default()
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 参数范围检查
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracker;
        if !(t.max_distance > 0.0) {
            return Err(ConfigError::invalid("tracker.max_distance must be > 0"));
        }
        if !valid_duration(t.max_lost) {
            return Err(ConfigError::invalid(format!(
                "tracker.max_lost must be in [0, {}]",
                MAX_DURATION_SECS
            )));
        }

        let r = &self.risk;
        if !(r.hand_contact_distance > 0.0 && r.torso_contact_distance > 0.0) {
            return Err(ConfigError::invalid("risk contact distances must be > 0"));
        }
        if !(r.time_threshold > 0.0) {
            return Err(ConfigError::invalid("risk.time_threshold must be > 0"));
        }
        if !(r.severity_multiplier >= 1.0) {
            return Err(ConfigError::invalid("risk.severity_multiplier must be >= 1"));
        }
        if !(0.0..=1.0).contains(&r.min_intrusive_risk) {
            return Err(ConfigError::invalid("risk.min_intrusive_risk must be in [0, 1]"));
        }
        if !(r.min_hand_speed >= 0.0) {
            return Err(ConfigError::invalid("risk.min_hand_speed must be >= 0"));
        }
        if !(0.0..=1.0).contains(&r.keypoint_confidence) {
            return Err(ConfigError::invalid("risk.keypoint_confidence must be in [0, 1]"));
        }
        if !(r.decay_factor > 0.0 && r.decay_factor < 1.0) {
            return Err(ConfigError::invalid("risk.decay_factor must be in (0, 1)"));
        }
        if !(r.removal_epsilon > 0.0) {
            return Err(ConfigError::invalid("risk.removal_epsilon must be > 0"));
        }

        let a = &self.alert;
        if !(0.0..=1.0).contains(&a.risk_threshold) {
            return Err(ConfigError::invalid("alert.risk_threshold must be in [0, 1]"));
        }
        if !(valid_duration(a.sustain_secs) && valid_duration(a.cooldown_secs)) {
            return Err(ConfigError::invalid(format!(
                "alert durations must be in [0, {}]",
                MAX_DURATION_SECS
            )));
        }
        if a.evidence_queue == 0 {
            return Err(ConfigError::invalid("alert.evidence_queue must be >= 1"));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前监控配置:");
        info!(
            "  跟踪门限: {:.0}px, 丢失保留: {:.1}s",
            self.tracker.max_distance, self.tracker.max_lost
        );
        info!(
            "  接触距离: 手 {:.0}px / 躯干 {:.0}px",
            self.risk.hand_contact_distance, self.risk.torso_contact_distance
        );
        info!(
            "  满风险时间: {:.2}s, 升级倍率: {:.1}, 策略: {:?}",
            self.risk.time_threshold, self.risk.severity_multiplier, self.risk.direction_policy
        );
        info!(
            "  告警阈值: {:.0}%, 持续: {:.1}s, 冷却: {:.1}s",
            self.alert.risk_threshold * 100.0,
            self.alert.sustain_secs,
            self.alert.cooldown_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SentinelConfig::default();
        assert_eq!(config.tracker.max_distance, 150.0);
        assert_eq!(config.risk.severity_multiplier, 4.0);
        assert_eq!(config.risk.direction_policy, DirectionPolicy::RejectSymmetric);
        assert_eq!(config.alert.cooldown_secs, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sentinel.json");
        let config = SentinelConfig::load(&path).unwrap();
        assert_eq!(config, SentinelConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        fs::write(
            &path,
            r#"{"risk": {"time_threshold": 3.0, "direction_policy": "max_of_both"}}"#,
        )
        .unwrap();
        let config = SentinelConfig::load(&path).unwrap();
        assert_eq!(config.risk.time_threshold, 3.0);
        assert_eq!(config.risk.direction_policy, DirectionPolicy::MaxOfBoth);
        assert_eq!(config.risk.hand_contact_distance, 35.0);
        assert_eq!(config.alert, AlertConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SentinelConfig::default();
        config.risk.decay_factor = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SentinelConfig::default();
        config.tracker.max_distance = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_durations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        fs::write(&path, r#"{"alert": {"cooldown_secs": 1e20}}"#).unwrap();
        assert!(matches!(SentinelConfig::load(&path), Err(ConfigError::Invalid(_))));

        // 1e39 溢出 f32 → inf
        fs::write(&path, r#"{"tracker": {"max_lost": 1e39}}"#).unwrap();
        assert!(SentinelConfig::load(&path).is_err());
    }

    #[test]
    fn test_secs_to_duration_never_panics() {
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f32::NAN), Duration::ZERO);
        let cap = Duration::from_secs(MAX_DURATION_SECS as u64);
        assert_eq!(secs_to_duration(1e20), cap);
        assert_eq!(secs_to_duration(f32::INFINITY), cap);
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(SentinelConfig::load(&path), Err(ConfigError::Json(_))));
        assert_eq!(SentinelConfig::load_or_default(&path), SentinelConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        let mut config = SentinelConfig::default();
        config.alert.sustain_secs = 1.0;
        config.save(&path).unwrap();
        assert_eq!(SentinelConfig::load(&path).unwrap(), config);
    }
}
