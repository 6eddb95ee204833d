// ==========================================
// 主生产计划引擎 - 应用层
// ==========================================
// 职责: 从数据库路径装配仓储与 API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
