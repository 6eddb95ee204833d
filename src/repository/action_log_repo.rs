// ==========================================
// 主生产计划引擎 - 操作日志数据仓储
// ==========================================
// 存储: mps_action_log 表
// 红线: 所有提交成功的写入必须记录
// ==========================================

mod core;
mod queries;


pub(crate) use self::core::insert_with;
pub use self::core::ActionLogRepository;
