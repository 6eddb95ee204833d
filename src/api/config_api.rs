// ==========================================
// 主生产计划引擎 - 配置管理 API
// ==========================================
// 职责: 配置查询、更新 (写入前校验), 配置变更记入操作日志
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager, PlanningDefaults};
use crate::domain::action_log::ActionLog;
use crate::domain::types::{PeriodType, ScheduleAction};
use crate::repository::ActionLogRepository;

/// 配置管理API
pub struct ConfigApi {
    config_manager: Arc<ConfigManager>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl ConfigApi {
    /// 创建新的ConfigApi实例
    pub fn new(config_manager: Arc<ConfigManager>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            config_manager,
            action_log_repo,
        }
    }

    /// 新建计划时使用的默认参数
    pub fn get_planning_defaults(&self) -> ApiResult<PlanningDefaults> {
        self.config_manager
            .get_planning_defaults()
            .map_err(|e| ApiError::InternalError(format!("读取计划默认参数失败: {}", e)))
    }

    /// 全部 global 配置 (JSON 对象)
    pub fn get_config_snapshot(&self) -> ApiResult<JsonValue> {
        self.config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::InternalError(format!("读取配置快照失败: {}", e)))
    }

    /// 更新配置
    ///
    /// # 参数
    /// - key: 配置键 (仅接受 config_keys 中定义的键)
    /// - value: 配置值 (按键类型校验)
    /// - actor: 操作人
    /// - reason: 操作原因
    pub fn update_config(
        &self,
        key: &str,
        value: &str,
        actor: &str,
        reason: &str,
        now: NaiveDateTime,
    ) -> ApiResult<()> {
        if actor.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作原因不能为空".to_string()));
        }
        let value = value.trim();
        validate_config_value(key, value)?;

        let previous = self
            .config_manager
            .get_global_config_value(key)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        self.config_manager
            .set_global_config_value(key, value)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let log = ActionLog::new(None, ScheduleAction::UpdateConfig, actor, now)
            .with_payload(json!({
                "key": key,
                "old_value": previous,
                "new_value": value,
            }))
            .with_detail(reason.to_string());
        self.action_log_repo.insert(&log)?;

        info!(config_key = key, value, actor, "配置已更新");
        Ok(())
    }

    /// 最近的配置变更记录 (新的在前)
    pub fn list_config_changes(&self, limit: usize) -> ApiResult<Vec<ActionLog>> {
        let action_type = ScheduleAction::UpdateConfig.to_db_str();
        Ok(self.action_log_repo.find_by_action_type(action_type, limit)?)
    }
}

fn validate_config_value(key: &str, value: &str) -> ApiResult<()> {
    match key {
        config_keys::DEFAULT_PERIOD_TYPE => value
            .parse::<PeriodType>()
            .map(|_| ())
            .map_err(|e| ApiError::InvalidInput(e.to_string())),
        config_keys::DEFAULT_FROZEN_DAYS
        | config_keys::DEFAULT_SLUSHY_DAYS
        | config_keys::DEFAULT_FREE_DAYS => match value.parse::<i64>() {
            Ok(days) if days >= 0 => Ok(()),
            _ => Err(ApiError::InvalidInput(format!(
                "{}必须为非负整数, 实际: {}",
                key, value
            ))),
        },
        config_keys::SCHEDULE_NUMBER_PREFIX => {
            if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(())
            } else {
                Err(ApiError::InvalidInput(format!(
                    "计划编号前缀只能包含字母和数字: {}",
                    value
                )))
            }
        }
        _ => Err(ApiError::InvalidInput(format!("未知配置键: {}", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> ConfigApi {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let manager = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());
        ConfigApi::new(manager, Arc::new(ActionLogRepository::new(conn)))
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 7, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_update_config_is_logged() {
        let api = setup();
        api.update_config(config_keys::DEFAULT_FROZEN_DAYS, "14", "admin", "季度调整", now())
            .unwrap();
        api.update_config(config_keys::DEFAULT_FROZEN_DAYS, "21", "admin", "旺季", now())
            .unwrap();

        let defaults = api.get_planning_defaults().unwrap();
        assert_eq!(defaults.fences.frozen_days, 21);

        let entries = api.list_config_changes(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].schedule_id.is_none());
        assert_eq!(entries[0].detail.as_deref(), Some("旺季"));
        let payload = entries[0].payload_json.as_ref().unwrap();
        assert_eq!(payload["old_value"], "14");
        assert_eq!(payload["new_value"], "21");
    }

    #[test]
    fn test_update_config_rejects_bad_values() {
        let api = setup();
        for (key, value) in [
            (config_keys::DEFAULT_FROZEN_DAYS, "-1"),
            (config_keys::DEFAULT_SLUSHY_DAYS, "abc"),
            (config_keys::DEFAULT_PERIOD_TYPE, "YEARLY"),
            (config_keys::SCHEDULE_NUMBER_PREFIX, "MP-S"),
            ("mps.unknown", "1"),
        ] {
            let err = api.update_config(key, value, "admin", "test", now()).unwrap_err();
            assert!(matches!(err, ApiError::InvalidInput(_)), "{} = {}", key, value);
        }
        assert_eq!(api.get_config_snapshot().unwrap(), json!({}));
    }

    #[test]
    fn test_update_config_requires_reason() {
        let api = setup();
        let err = api
            .update_config(config_keys::DEFAULT_PERIOD_TYPE, "DAILY", "admin", " ", now())
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
