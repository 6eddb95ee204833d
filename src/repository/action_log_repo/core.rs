use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

/// 库内时间戳格式 (秒精度)
pub(super) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 操作日志仓储
///
/// 日志只追加不修改; 计划变更时的日志由 ScheduleRepository 在同一事务内写入,
/// 这里只负责独立写入 (如配置变更) 与查询。
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub(super) fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条日志, 返回 action_id
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        insert_with(&*self.get_conn()?, log)?;
        Ok(log.action_id.clone())
    }
}

/// 在调用方持有的连接或事务上追加日志
pub(crate) fn insert_with(conn: &Connection, log: &ActionLog) -> RepositoryResult<()> {
    let payload = log.payload_json.as_ref().map(|v| v.to_string());
    let impact = log.impact_summary_json.as_ref().map(|v| v.to_string());
    conn.execute(
        "INSERT INTO mps_action_log (action_id, schedule_id, action_type, action_ts, actor, \
         payload_json, impact_summary_json, detail) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            log.action_id,
            log.schedule_id,
            log.action_type,
            log.action_ts.format(TS_FORMAT).to_string(),
            log.actor,
            payload,
            impact,
            log.detail,
        ],
    )?;
    Ok(())
}
