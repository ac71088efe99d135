/// 风险评估系统 (Risk System)
///
/// 消费带身份的检测,输出 [0,1] 场景风险
/// - Contact: 成对接触分类 (无 / 被动 / 侵入)
/// - Engine:  身份对计时器的累积与衰减
pub mod contact;
pub mod engine;
pub mod pair;

pub use contact::{ContactClassifier, ContactKind, HandMotion, PairContact, DT_EPSILON};
pub use engine::RiskEngine;
pub use pair::PairKey;
