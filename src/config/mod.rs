// ==========================================
// 主生产计划引擎 - 配置层
// ==========================================
// 职责: 系统配置管理 (新建计划的默认周期类型、围栏、编号前缀)
// 存储: config_kv 表
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, PlanningDefaults};
