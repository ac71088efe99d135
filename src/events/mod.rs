/// 告警系统 (Event System)
///
/// - AlertManager: 持续 + 冷却滞回,触发离散告警
/// - Evidence:     证据画面标注与后台落盘
pub mod alert;
pub mod evidence;

pub use alert::{AlertEvent, AlertManager, AlertPhase};
pub use evidence::{annotate, EvidenceJob, EvidenceSink, EvidenceWriter};
