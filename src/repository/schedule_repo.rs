// ==========================================
// 主生产计划引擎 - 计划数据仓储
// ==========================================
// 存储: mps_schedule (表头) + mps_schedule_line (计划行)
// 并发: 表头 revision 乐观锁, 计划行随表头在同一事务内整体回写
// 红线: Repository 不含业务逻辑
// ==========================================

mod core;
mod queries;


pub use self::core::ScheduleRepository;
