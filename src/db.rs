// ==========================================
// 主生产计划引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键、busy_timeout)
// - 提供幂等的建库入口, 测试与 CLI 共用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;
use tracing::{debug, warn};

/// 等锁时长 (毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建表语句 (全部 IF NOT EXISTS, 可重复执行)
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- 目前只有 global 作用域
CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS mps_schedule (
    schedule_id TEXT PRIMARY KEY,
    schedule_number TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    period_type TEXT NOT NULL,
    frozen_days INTEGER NOT NULL DEFAULT 0,
    slushy_days INTEGER NOT NULL DEFAULT 0,
    free_days INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    approved_by TEXT,
    approval_date TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    CHECK (period_start < period_end)
);

CREATE TABLE IF NOT EXISTS mps_schedule_line (
    line_id TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL REFERENCES mps_schedule(schedule_id) ON DELETE CASCADE,
    product_id TEXT NOT NULL,
    period_date TEXT NOT NULL,
    period_number INTEGER NOT NULL,
    forecast_qty REAL NOT NULL DEFAULT 0,
    customer_order_qty REAL NOT NULL DEFAULT 0,
    dependent_demand REAL NOT NULL DEFAULT 0,
    planned_production_qty REAL NOT NULL DEFAULT 0,
    beginning_inventory REAL NOT NULL DEFAULT 0,
    safety_stock REAL NOT NULL DEFAULT 0,
    projected_available_balance REAL NOT NULL DEFAULT 0,
    available_to_promise REAL,
    actual_production_qty REAL NOT NULL DEFAULT 0,
    actual_sales_qty REAL NOT NULL DEFAULT 0,
    requires_reapproval INTEGER NOT NULL DEFAULT 0,
    UNIQUE (schedule_id, product_id, period_date)
);

CREATE INDEX IF NOT EXISTS idx_mps_line_product
    ON mps_schedule_line(schedule_id, product_id, period_date);

CREATE TABLE IF NOT EXISTS mps_action_log (
    action_id TEXT PRIMARY KEY,
    schedule_id TEXT,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    payload_json TEXT,
    impact_summary_json TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_mps_action_schedule
    ON mps_action_log(schedule_id, action_ts);
"#;

/// 外键与 busy_timeout 都是连接级设置, 每个新连接都要调用
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开数据库文件 (不存在则创建)
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建库 (幂等) 并登记 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    match read_schema_version(conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于程序版本"
            );
        }
        v => debug!(schema_version = ?v, "schema 已就绪"),
    }
    Ok(())
}

/// 已登记的最高 schema 版本; 未建库时为 None
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let initialized = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .is_some();
    if !initialized {
        return Ok(None);
    }
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
}
