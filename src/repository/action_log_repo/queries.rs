use super::core::{ActionLogRepository, TS_FORMAT};
use crate::domain::action_log::ActionLog;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Row};

impl ActionLogRepository {
    /// 某计划的全部日志, 新的在前
    pub fn find_by_schedule_id(&self, schedule_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        self.select_where("schedule_id", schedule_id, None)
    }

    /// 某类操作最近的 `limit` 条日志
    pub fn find_by_action_type(&self, action_type: &str, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        self.select_where("action_type", action_type, Some(limit))
    }

    // column 只接受本模块内的常量列名
    fn select_where(&self, column: &str, value: &str, limit: Option<usize>) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT action_id, schedule_id, action_type, action_ts, actor, payload_json, \
             impact_summary_json, detail FROM mps_action_log WHERE {} = ?1 \
             ORDER BY action_ts DESC, rowid DESC LIMIT ?2",
            column
        );
        // SQLite 中 LIMIT -1 表示不限
        let limit = limit.map_or(-1, |n| n as i64);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![value, limit], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<ActionLog> {
    let ts: String = row.get(3)?;
    let action_ts = NaiveDateTime::parse_from_str(&ts, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let json_column = |idx: usize| -> rusqlite::Result<Option<serde_json::Value>> {
        let raw: Option<String> = row.get(idx)?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    };

    Ok(ActionLog {
        action_id: row.get(0)?,
        schedule_id: row.get(1)?,
        action_type: row.get(2)?,
        action_ts,
        actor: row.get(4)?,
        payload_json: json_column(5)?,
        impact_summary_json: json_column(6)?,
        detail: row.get(7)?,
    })
}
