use crate::domain::action_log::ActionLog;
use crate::domain::schedule::{MasterSchedule, ScheduleLine};
use crate::repository::action_log_repo;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub(super) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(super) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// ScheduleRepository - 主生产计划仓储
// ==========================================
pub struct ScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRepository {
    /// 创建新的计划仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建计划 (表头 + 审计日志, 同一事务)
    pub fn create(&self, header: &MasterSchedule, log: &ActionLog) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO mps_schedule (
                schedule_id, schedule_number, name, period_start, period_end, period_type,
                frozen_days, slushy_days, free_days, status,
                created_by, created_at, approved_by, approval_date, revision, description
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                header.schedule_id,
                header.schedule_number,
                header.name,
                header.period_start.format(DATE_FORMAT).to_string(),
                header.period_end.format(DATE_FORMAT).to_string(),
                header.period_type.to_db_str(),
                header.fences.frozen_days,
                header.fences.slushy_days,
                header.fences.free_days,
                header.status.to_db_str(),
                header.created_by,
                header.created_at.format(TS_FORMAT).to_string(),
                header.approved_by,
                header.approval_date.map(|t| t.format(TS_FORMAT).to_string()),
                header.revision,
                header.description,
            ],
        )?;
        action_log_repo::insert_with(&tx, log)?;

        tx.commit()?;
        debug!(schedule_id = %header.schedule_id, "计划表头已写入");
        Ok(())
    }

    /// 保存计划 (带乐观锁检查)
    ///
    /// 表头按 revision 条件更新, 计划行整体重写, 审计日志同事务写入.
    ///
    /// # 返回
    /// - `Ok(new_revision)`
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision不匹配 (其他请求已保存)
    /// - `RepositoryError::NotFound`: schedule_id不存在
    pub fn save<'a, I>(&self, header: &MasterSchedule, lines: I, log: &ActionLog) -> RepositoryResult<i32>
    where
        I: IntoIterator<Item = &'a ScheduleLine>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            r#"UPDATE mps_schedule
               SET name = ?, description = ?, period_end = ?, frozen_days = ?, slushy_days = ?, free_days = ?,
                   status = ?, approved_by = ?, approval_date = ?, revision = revision + 1
               WHERE schedule_id = ? AND revision = ?"#,
            params![
                header.name,
                header.description,
                header.period_end.format(DATE_FORMAT).to_string(),
                header.fences.frozen_days,
                header.fences.slushy_days,
                header.fences.free_days,
                header.status.to_db_str(),
                header.approved_by,
                header.approval_date.map(|t| t.format(TS_FORMAT).to_string()),
                header.schedule_id,
                header.revision,
            ],
        )?;

        if rows_affected == 0 {
            return Err(revision_conflict(&tx, &header.schedule_id, header.revision));
        }

        tx.execute(
            "DELETE FROM mps_schedule_line WHERE schedule_id = ?",
            params![header.schedule_id],
        )?;
        let mut written = 0usize;
        for line in lines {
            insert_line(&tx, line)?;
            written += 1;
        }
        action_log_repo::insert_with(&tx, log)?;

        tx.commit()?;
        debug!(
            schedule_id = %header.schedule_id,
            revision = header.revision + 1,
            lines = written,
            "计划已保存"
        );
        Ok(header.revision + 1)
    }

    /// 删除计划 (计划行级联删除, 审计日志保留)
    pub fn delete(&self, schedule_id: &str, expected_revision: i32, log: &ActionLog) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            "DELETE FROM mps_schedule WHERE schedule_id = ? AND revision = ?",
            params![schedule_id, expected_revision],
        )?;
        if rows_affected == 0 {
            return Err(revision_conflict(&tx, schedule_id, expected_revision));
        }
        action_log_repo::insert_with(&tx, log)?;

        tx.commit()?;
        Ok(())
    }
}

/// 条件更新未命中时, 区分记录不存在与 revision 冲突
fn revision_conflict(tx: &Transaction, schedule_id: &str, expected: i32) -> RepositoryError {
    let actual: Result<Option<i32>, _> = tx
        .query_row(
            "SELECT revision FROM mps_schedule WHERE schedule_id = ?",
            params![schedule_id],
            |row| row.get(0),
        )
        .optional();

    match actual {
        Ok(Some(actual)) => RepositoryError::OptimisticLockFailure {
            schedule_id: schedule_id.to_string(),
            expected,
            actual,
        },
        Ok(None) => RepositoryError::NotFound {
            entity: "MasterSchedule".to_string(),
            id: schedule_id.to_string(),
        },
        Err(e) => e.into(),
    }
}

fn insert_line(tx: &Transaction, line: &ScheduleLine) -> RepositoryResult<()> {
    tx.execute(
        r#"INSERT INTO mps_schedule_line (
            line_id, schedule_id, product_id, period_date, period_number,
            forecast_qty, customer_order_qty, dependent_demand,
            planned_production_qty, beginning_inventory, safety_stock,
            projected_available_balance, available_to_promise,
            actual_production_qty, actual_sales_qty, requires_reapproval
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            line.line_id,
            line.schedule_id,
            line.product_id,
            line.period_date.format(DATE_FORMAT).to_string(),
            line.period_number,
            line.forecast_qty,
            line.customer_order_qty,
            line.dependent_demand,
            line.planned_production_qty,
            line.beginning_inventory,
            line.safety_stock,
            line.projected_available_balance,
            line.available_to_promise,
            line.actual_production_qty,
            line.actual_sales_qty,
            line.requires_reapproval,
        ],
    )?;
    Ok(())
}
