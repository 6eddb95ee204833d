// ==========================================
// 主生产计划引擎 - 引擎层
// ==========================================
// 职责: 围栏判定、计划行台账、余额计算、生命周期, 不拼 SQL
// 红线: 引擎只接收调用方给出的参考日期, 不读取系统时间
// ==========================================

pub mod aggregate;
pub mod balance;
pub mod error;
pub mod fence;
pub mod ledger;
pub mod lifecycle;
pub mod period;

// 重导出核心引擎
pub use aggregate::{MutationOutcome, NewSchedule, ScheduleAggregate};
pub use balance::{BalanceCalculator, PeriodBalance, SafetyStockWarning};
pub use error::{ScheduleError, ScheduleResult};
pub use fence::{classify, FenceClassifier};
pub use ledger::{BalanceChange, LinePosition, ScheduleLedger};
pub use lifecycle::Transition;
pub use period::PeriodGrid;
