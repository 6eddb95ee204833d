// ==========================================
// 主生产计划引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 业务冲突均为可恢复错误, 返回即表示未做任何修改
//       Internal 仅用于程序不变量被破坏 (属于缺陷, 不是业务冲突)
// ==========================================

use crate::domain::types::{FenceState, ScheduleStatus};
use chrono::NaiveDate;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    // ===== 查找 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    // ===== 计划行不变量 =====
    #[error("周期重复: product={product_id}, period={period_date}")]
    DuplicatePeriod {
        product_id: String,
        period_date: NaiveDate,
    },

    #[error("超出计划期间: period={period_date}, 期间=[{period_start}, {period_end}]")]
    OutOfHorizon {
        period_date: NaiveDate,
        period_start: NaiveDate,
        period_end: NaiveDate,
    },

    // ===== 围栏 =====
    #[error("围栏保护: line={line_id}, fence={fence}, 操作={operation}")]
    FenceViolation {
        line_id: String,
        fence: FenceState,
        operation: String,
    },

    #[error("计划行已有实绩, 禁止删除: line={line_id}")]
    HasActuals { line_id: String },

    // ===== 生命周期 =====
    #[error("无效的状态转换: from={from} 操作={transition}")]
    InvalidTransition {
        from: ScheduleStatus,
        transition: String,
    },

    #[error("当前状态不允许该操作: status={status} 操作={operation}")]
    InvalidState {
        status: ScheduleStatus,
        operation: String,
    },

    // ===== 输入校验 =====
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ===== 程序不变量 =====
    #[error("内部错误(不变量被破坏): {0}")]
    Internal(String),
}

impl ScheduleError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ScheduleError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ScheduleError::ValidationError(message.into())
    }

    /// 是否为程序缺陷 (非业务错误)
    pub fn is_internal(&self) -> bool {
        matches!(self, ScheduleError::Internal(_))
    }
}

/// Result 类型别名
pub type ScheduleResult<T> = Result<T, ScheduleError>;
