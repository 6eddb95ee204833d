// ==========================================
// 主生产计划引擎 - 操作日志领域模型
// ==========================================
// 红线: 所有提交成功的写操作必须记录
// 用途: 审计追踪, 影响分析
// ==========================================

use crate::domain::types::ScheduleAction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,               // 日志ID
    pub schedule_id: Option<String>,     // 关联计划 (删除后保留日志, 可为 None)
    pub action_type: String,             // 操作类型 (ScheduleAction::to_db_str)
    pub action_ts: NaiveDateTime,        // 操作时间
    pub actor: String,                   // 操作人
    pub payload_json: Option<JsonValue>, // 操作参数
    pub impact_summary_json: Option<JsonValue>, // 影响摘要 (MutationOutcome)
    pub detail: Option<String>,          // 描述
}

impl ActionLog {
    /// 构造一条新日志 (action_id 自动生成)
    pub fn new(
        schedule_id: Option<String>,
        action: ScheduleAction,
        actor: &str,
        action_ts: NaiveDateTime,
    ) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            schedule_id,
            action_type: action.to_db_str().to_string(),
            action_ts,
            actor: actor.to_string(),
            payload_json: None,
            impact_summary_json: None,
            detail: None,
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn with_impact(mut self, impact: JsonValue) -> Self {
        self.impact_summary_json = Some(impact);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
