// ==========================================
// 主生产计划引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use action_log::ActionLog;
pub use schedule::{
    LineFilter, LineInput, LineUpdate, MasterSchedule, PlanningFences, ProductSummary,
    ScheduleLine,
};
pub use types::{FenceState, ParseEnumError, PeriodType, ScheduleAction, ScheduleStatus};
