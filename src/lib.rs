// ==========================================
// 主生产计划引擎 - 核心库
// ==========================================
// 系统定位: 主生产计划 (MPS) 的计划围栏、预计可用量 (PAB)、可承诺量 (ATP)
// ==========================================

// 依赖方向: domain ← engine / repository ← api ← app
pub mod domain;
pub mod engine;
pub mod repository;
pub mod importer;
pub mod config;
pub mod db;
pub mod logging;
pub mod api;
pub mod app;

pub use domain::types::{FenceState, PeriodType, ScheduleAction, ScheduleStatus};
pub use domain::{
    ActionLog, LineFilter, LineInput, LineUpdate, MasterSchedule, PlanningFences, ProductSummary,
    ScheduleLine,
};
pub use engine::{
    BalanceCalculator, FenceClassifier, MutationOutcome, ScheduleAggregate, ScheduleError,
    ScheduleLedger,
};
pub use api::{ApiError, ConfigApi, ScheduleApi};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "主生产计划引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
