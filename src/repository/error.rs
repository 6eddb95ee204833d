// ==========================================
// 主生产计划引擎 - 仓储层错误
// ==========================================
// SQLite 错误按约束类型归类, 修订号冲突单独成类
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 保存时库中修订号已前进
    #[error("计划 {schedule_id} 修订号冲突: 持有 {expected}, 库中 {actual}")]
    OptimisticLockFailure {
        schedule_id: String,
        expected: i32,
        actual: i32,
    },

    #[error("{entity} 不存在: {id}")]
    NotFound { entity: String, id: String },

    /// 连接互斥锁中毒
    #[error("连接不可用: {0}")]
    LockError(String),

    #[error("SQL 执行失败: {0}")]
    DatabaseQueryError(String),

    #[error("违反唯一约束: {0}")]
    UniqueConstraintViolation(String),

    #[error("违反外键约束: {0}")]
    ForeignKeyViolation(String),

    #[error("数据编码失败: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "row".to_string(),
                id: "-".to_string(),
            },
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE") => {
                RepositoryError::UniqueConstraintViolation(msg)
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("FOREIGN KEY") => {
                RepositoryError::ForeignKeyViolation(msg)
            }
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::InternalError(err.to_string())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err: RepositoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_unique_failure_is_classified() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: RepositoryError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_lock_failure_message() {
        let err = RepositoryError::OptimisticLockFailure {
            schedule_id: "S1".to_string(),
            expected: 2,
            actual: 3,
        };
        assert_eq!(err.to_string(), "计划 S1 修订号冲突: 持有 2, 库中 3");
    }
}
