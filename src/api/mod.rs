// ==========================================
// 主生产计划引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供 CLI / 上层应用调用
// ==========================================

pub mod config_api;
pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use config_api::ConfigApi;
pub use error::{ApiError, ApiResult};
pub use schedule_api::{
    CommandResponse, CreateScheduleRequest, ImportForecastResponse, ScheduleApi, ScheduleView,
};
