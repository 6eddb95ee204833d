use super::core::{ScheduleRepository, DATE_FORMAT, TS_FORMAT};
use crate::domain::schedule::{LineFilter, MasterSchedule, PlanningFences, ScheduleLine};
use crate::domain::types::{PeriodType, ScheduleStatus};
use crate::repository::error::RepositoryResult;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Result as SqliteResult, Row};

const HEADER_COLUMNS: &str = r#"
    SELECT schedule_id, schedule_number, name, period_start, period_end, period_type,
           frozen_days, slushy_days, free_days, status,
           created_by, created_at, approved_by, approval_date, revision, description
    FROM mps_schedule
"#;

const LINE_COLUMNS: &str = r#"
    SELECT line_id, schedule_id, product_id, period_date, period_number,
           forecast_qty, customer_order_qty, dependent_demand,
           planned_production_qty, beginning_inventory, safety_stock,
           projected_available_balance, available_to_promise,
           actual_production_qty, actual_sales_qty, requires_reapproval
    FROM mps_schedule_line
"#;

impl ScheduleRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按ID查询表头
    pub fn find_by_id(&self, schedule_id: &str) -> RepositoryResult<Option<MasterSchedule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE schedule_id = ?", HEADER_COLUMNS))?;

        match stmt.query_row(params![schedule_id], map_header) {
            Ok(header) => Ok(Some(header)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按计划编号查询表头
    pub fn find_by_number(&self, schedule_number: &str) -> RepositoryResult<Option<MasterSchedule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE schedule_number = ?", HEADER_COLUMNS))?;

        match stmt.query_row(params![schedule_number], map_header) {
            Ok(header) => Ok(Some(header)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 计划列表 (可按状态过滤, 按编号排序)
    pub fn list(&self, status: Option<ScheduleStatus>) -> RepositoryResult<Vec<MasterSchedule>> {
        let conn = self.get_conn()?;

        let headers = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE status = ? ORDER BY schedule_number",
                    HEADER_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.to_db_str()], map_header)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{} ORDER BY schedule_number", HEADER_COLUMNS))?;
                let rows = stmt
                    .query_map([], map_header)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };

        Ok(headers)
    }

    /// 按产品 / 周期区间查询计划行 (按产品、周期排序)
    pub fn find_lines(&self, schedule_id: &str, filter: &LineFilter) -> RepositoryResult<Vec<ScheduleLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"{} WHERE schedule_id = ?1
                 AND (?2 IS NULL OR product_id = ?2)
                 AND (?3 IS NULL OR period_date >= ?3)
                 AND (?4 IS NULL OR period_date <= ?4)
               ORDER BY product_id, period_date"#,
            LINE_COLUMNS
        ))?;

        let lines = stmt
            .query_map(
                params![
                    schedule_id,
                    filter.product_id,
                    filter.from.map(|d| d.format(DATE_FORMAT).to_string()),
                    filter.to.map(|d| d.format(DATE_FORMAT).to_string()),
                ],
                map_line,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(lines)
    }

    /// 加载完整计划 (表头 + 计划行)
    pub fn load(&self, schedule_id: &str) -> RepositoryResult<Option<(MasterSchedule, Vec<ScheduleLine>)>> {
        match self.find_by_id(schedule_id)? {
            Some(header) => {
                let lines = self.find_lines(schedule_id, &LineFilter::default())?;
                Ok(Some((header, lines)))
            }
            None => Ok(None),
        }
    }

    /// 分配下一个计划编号: {prefix}-{YYYYMM}-{NNNN}
    pub fn next_schedule_number(&self, prefix: &str, date: NaiveDate) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let stem = format!("{}-{}-", prefix, date.format("%Y%m"));

        let mut stmt =
            conn.prepare("SELECT schedule_number FROM mps_schedule WHERE schedule_number LIKE ?")?;
        let max_seq = stmt
            .query_map(params![format!("{}%", stem)], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?
            .iter()
            .filter_map(|number| number.strip_prefix(&stem))
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        Ok(format!("{}{:04}", stem, max_seq + 1))
    }
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_date(row: &Row, index: usize) -> SqliteResult<NaiveDate> {
    let raw: String = row.get(index)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(index, e))
}

fn parse_ts(raw: &str, index: usize) -> SqliteResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).map_err(|e| conversion_error(index, e))
}

/// 映射数据库行到 MasterSchedule
fn map_header(row: &Row) -> SqliteResult<MasterSchedule> {
    let period_type: PeriodType = row
        .get::<_, String>(5)?
        .parse()
        .map_err(|e| conversion_error(5, e))?;
    let status: ScheduleStatus = row
        .get::<_, String>(9)?
        .parse()
        .map_err(|e| conversion_error(9, e))?;
    let approval_date = match row.get::<_, Option<String>>(13)? {
        Some(raw) => Some(parse_ts(&raw, 13)?),
        None => None,
    };

    Ok(MasterSchedule {
        schedule_id: row.get(0)?,
        schedule_number: row.get(1)?,
        name: row.get(2)?,
        description: row.get(15)?,
        period_start: parse_date(row, 3)?,
        period_end: parse_date(row, 4)?,
        period_type,
        fences: PlanningFences::new(row.get(6)?, row.get(7)?, row.get(8)?),
        status,
        created_by: row.get(10)?,
        created_at: parse_ts(&row.get::<_, String>(11)?, 11)?,
        approved_by: row.get(12)?,
        approval_date,
        revision: row.get(14)?,
    })
}

/// 映射数据库行到 ScheduleLine
fn map_line(row: &Row) -> SqliteResult<ScheduleLine> {
    Ok(ScheduleLine {
        line_id: row.get(0)?,
        schedule_id: row.get(1)?,
        product_id: row.get(2)?,
        period_date: parse_date(row, 3)?,
        period_number: row.get(4)?,
        forecast_qty: row.get(5)?,
        customer_order_qty: row.get(6)?,
        dependent_demand: row.get(7)?,
        planned_production_qty: row.get(8)?,
        beginning_inventory: row.get(9)?,
        safety_stock: row.get(10)?,
        projected_available_balance: row.get(11)?,
        available_to_promise: row.get(12)?,
        actual_production_qty: row.get(13)?,
        actual_sales_qty: row.get(14)?,
        requires_reapproval: row.get(15)?,
    })
}
