// ==========================================
// 主生产计划引擎 - 配置管理器
// ==========================================
// 存储: config_kv 表, 当前只使用 global 作用域
// ==========================================

use crate::domain::schedule::PlanningFences;
use crate::domain::types::PeriodType;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// PlanningDefaults - 新建计划的默认参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningDefaults {
    pub period_type: PeriodType,
    pub fences: PlanningFences,
    pub schedule_number_prefix: String,
}

impl Default for PlanningDefaults {
    fn default() -> Self {
        Self {
            period_type: PeriodType::Weekly,
            fences: PlanningFences::default(),
            schedule_number_prefix: "MPS".to_string(),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
// 只读写 scope_id='global' 的键值; 解析失败回落到默认值
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 复用仓储层的共享连接 (PRAGMA 幂等, 再应用一次)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        let manager = Self { conn };
        crate::db::configure_sqlite_connection(&*manager.lock()?)?;
        Ok(manager)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Box<dyn Error>> {
        self.conn
            .lock()
            .map_err(|e| format!("配置连接不可用: {}", e).into())
    }

    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let value = self
            .lock()?
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 覆盖写
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        self.lock()?.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    /// 全部 global 键值, 写入建计划日志以便追溯当时的默认参数
    pub fn get_config_snapshot(&self) -> Result<JsonValue, Box<dyn Error>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, JsonValue::String(row.get(1)?))))?
            .collect::<Result<JsonMap<String, JsonValue>, _>>()?;
        Ok(JsonValue::Object(entries))
    }

    fn parsed_or<T: FromStr>(&self, key: &str, fallback: T) -> Result<T, Box<dyn Error>> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(fallback);
        };
        match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(config_key = key, raw_value = %raw, "配置值无法解析, 使用默认值");
                Ok(fallback)
            }
        }
    }

    /// 新建计划的默认参数
    pub fn get_planning_defaults(&self) -> Result<PlanningDefaults, Box<dyn Error>> {
        let base = PlanningDefaults::default();
        let fences = PlanningFences::new(
            self.parsed_or(config_keys::DEFAULT_FROZEN_DAYS, base.fences.frozen_days)?,
            self.parsed_or(config_keys::DEFAULT_SLUSHY_DAYS, base.fences.slushy_days)?,
            self.parsed_or(config_keys::DEFAULT_FREE_DAYS, base.fences.free_days)?,
        );
        let prefix = self
            .get_global_config_value(config_keys::SCHEDULE_NUMBER_PREFIX)?
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty())
            .unwrap_or(base.schedule_number_prefix);

        Ok(PlanningDefaults {
            period_type: self.parsed_or(config_keys::DEFAULT_PERIOD_TYPE, base.period_type)?,
            fences,
            schedule_number_prefix: prefix,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 新建计划默认值
    pub const DEFAULT_PERIOD_TYPE: &str = "mps.default_period_type";
    pub const DEFAULT_FROZEN_DAYS: &str = "mps.default_frozen_days";
    pub const DEFAULT_SLUSHY_DAYS: &str = "mps.default_slushy_days";
    pub const DEFAULT_FREE_DAYS: &str = "mps.default_free_days";

    // 计划编号
    pub const SCHEDULE_NUMBER_PREFIX: &str = "mps.schedule_number_prefix";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let manager = setup();
        assert_eq!(manager.get_planning_defaults().unwrap(), PlanningDefaults::default());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::DEFAULT_PERIOD_TYPE, "monthly")
            .unwrap();
        manager
            .set_global_config_value(config_keys::DEFAULT_FROZEN_DAYS, "14")
            .unwrap();
        manager
            .set_global_config_value(config_keys::DEFAULT_SLUSHY_DAYS, "abc")
            .unwrap();
        manager
            .set_global_config_value(config_keys::SCHEDULE_NUMBER_PREFIX, " plan ")
            .unwrap();

        let defaults = manager.get_planning_defaults().unwrap();
        assert_eq!(defaults.period_type, PeriodType::Monthly);
        assert_eq!(defaults.fences, PlanningFences::new(14, 0, 0));
        assert_eq!(defaults.schedule_number_prefix, "PLAN");

        // 覆盖写
        manager
            .set_global_config_value(config_keys::DEFAULT_FROZEN_DAYS, "7")
            .unwrap();
        assert_eq!(manager.get_planning_defaults().unwrap().fences.frozen_days, 7);
    }

    #[test]
    fn test_snapshot_contains_all_global_keys() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::DEFAULT_FREE_DAYS, "30")
            .unwrap();
        manager
            .set_global_config_value(config_keys::SCHEDULE_NUMBER_PREFIX, "PLN")
            .unwrap();
        assert_eq!(
            manager.get_config_snapshot().unwrap(),
            serde_json::json!({
                "mps.default_free_days": "30",
                "mps.schedule_number_prefix": "PLN",
            })
        );
    }
}
