// ==========================================
// 主生产计划引擎 - API层错误
// ==========================================
// 汇总引擎/仓储/导入三类错误, 调用方只需处理 ApiError
// 除 InternalError/Other 外均为可恢复的业务错误
// ==========================================

use crate::engine::error::ScheduleError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    // ----- 计划规则 -----
    #[error("受时界保护: {0}")]
    FenceViolation(String),

    #[error("已录入实绩: {0}")]
    HasActuals(String),

    #[error("周期重复: {0}")]
    DuplicatePeriod(String),

    #[error("不在计划期间内: {0}")]
    OutOfHorizon(String),

    #[error("状态流转被拒绝: {0}")]
    InvalidTransition(String),

    #[error("当前状态不可操作: {0}")]
    InvalidState(String),

    #[error("校验失败: {0}")]
    ValidationError(String),

    // ----- 请求与数据 -----
    #[error("参数无效: {0}")]
    InvalidInput(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("数据约束冲突: {0}")]
    BusinessRuleViolation(String),

    #[error("并发修改冲突: {0}")]
    OptimisticLockFailure(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库不可用: {0}")]
    DatabaseConnectionError(String),

    // ----- 导入 -----
    #[error("导入失败: {0}")]
    ImportError(String),

    #[error("第 {row} 行导入失败: {reason}")]
    ImportRowRejected { row: usize, reason: String },

    // ----- 程序缺陷 -----
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn is_internal(&self) -> bool {
        matches!(self, ApiError::InternalError(_) | ApiError::Other(_))
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        let message = err.to_string();
        match err {
            ScheduleError::NotFound { .. } => ApiError::NotFound(message),
            ScheduleError::DuplicatePeriod { .. } => ApiError::DuplicatePeriod(message),
            ScheduleError::OutOfHorizon { .. } => ApiError::OutOfHorizon(message),
            ScheduleError::FenceViolation { .. } => ApiError::FenceViolation(message),
            ScheduleError::HasActuals { .. } => ApiError::HasActuals(message),
            ScheduleError::InvalidTransition { .. } => ApiError::InvalidTransition(message),
            ScheduleError::InvalidState { .. } => ApiError::InvalidState(message),
            ScheduleError::ValidationError(msg) => ApiError::ValidationError(msg),
            ScheduleError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        let message = err.to_string();
        match err {
            RepositoryError::OptimisticLockFailure { schedule_id, .. } => ApiError::OptimisticLockFailure(
                format!("{} (计划 {} 已被他人保存, 请重新加载)", message, schedule_id),
            ),
            RepositoryError::NotFound { .. } => ApiError::NotFound(message),
            RepositoryError::LockError(_) => ApiError::DatabaseConnectionError(message),
            RepositoryError::DatabaseQueryError(_) => ApiError::DatabaseError(message),
            RepositoryError::UniqueConstraintViolation(_)
            | RepositoryError::ForeignKeyViolation(_) => ApiError::BusinessRuleViolation(message),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err.row() {
            Some(row) => ApiError::ImportRowRejected {
                row,
                reason: err.to_string(),
            },
            None => ApiError::ImportError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
