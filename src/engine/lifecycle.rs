// ==========================================
// 主生产计划引擎 - 计划生命周期状态机
// ==========================================
// 状态: DRAFT → SUBMITTED → APPROVED → ACTIVE
//       CANCELLED 可由 DRAFT / SUBMITTED / APPROVED 进入
// 红线: 未列出的 (状态, 转换) 组合一律 InvalidTransition, 且不修改状态
// ==========================================

use crate::domain::types::ScheduleStatus;
use crate::engine::error::{ScheduleError, ScheduleResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 状态转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transition {
    Submit,
    Approve,
    Activate,
    Cancel,
}

impl Transition {
    pub const ALL: [Transition; 4] = [
        Transition::Submit,
        Transition::Approve,
        Transition::Activate,
        Transition::Cancel,
    ];
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Submit => write!(f, "SUBMIT"),
            Transition::Approve => write!(f, "APPROVE"),
            Transition::Activate => write!(f, "ACTIVATE"),
            Transition::Cancel => write!(f, "CANCEL"),
        }
    }
}

/// 计算转换后的状态
pub fn next_status(from: ScheduleStatus, transition: Transition) -> ScheduleResult<ScheduleStatus> {
    use ScheduleStatus::*;

    match (from, transition) {
        (Draft, Transition::Submit) => Ok(Submitted),
        (Submitted, Transition::Approve) => Ok(Approved),
        (Approved, Transition::Activate) => Ok(Active),
        (Draft | Submitted | Approved, Transition::Cancel) => Ok(Cancelled),
        (Draft | Submitted | Approved | Active | Cancelled, _) => {
            Err(ScheduleError::InvalidTransition {
                from,
                transition: transition.to_string(),
            })
        }
    }
}

/// 表头字段 (名称/期间/围栏) 仅草稿可改
pub fn ensure_header_editable(status: ScheduleStatus, operation: &str) -> ScheduleResult<()> {
    match status {
        ScheduleStatus::Draft => Ok(()),
        ScheduleStatus::Submitted
        | ScheduleStatus::Approved
        | ScheduleStatus::Active
        | ScheduleStatus::Cancelled => Err(ScheduleError::InvalidState {
            status,
            operation: operation.to_string(),
        }),
    }
}

/// 计划行写操作: 已取消的计划不可再改
pub fn ensure_lines_mutable(status: ScheduleStatus, operation: &str) -> ScheduleResult<()> {
    match status {
        ScheduleStatus::Draft
        | ScheduleStatus::Submitted
        | ScheduleStatus::Approved
        | ScheduleStatus::Active => Ok(()),
        ScheduleStatus::Cancelled => Err(ScheduleError::InvalidState {
            status,
            operation: operation.to_string(),
        }),
    }
}

/// 整单删除: 执行中的计划不可删除 (需由新计划替代)
pub fn ensure_deletable(status: ScheduleStatus) -> ScheduleResult<()> {
    match status {
        ScheduleStatus::Active => Err(ScheduleError::InvalidState {
            status,
            operation: "delete".to_string(),
        }),
        ScheduleStatus::Draft
        | ScheduleStatus::Submitted
        | ScheduleStatus::Approved
        | ScheduleStatus::Cancelled => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScheduleStatus::*;

    #[test]
    fn test_happy_path() {
        let s = next_status(Draft, Transition::Submit).unwrap();
        let s = next_status(s, Transition::Approve).unwrap();
        let s = next_status(s, Transition::Activate).unwrap();
        assert_eq!(s, Active);
    }

    #[test]
    fn test_every_unlisted_pair_is_invalid() {
        let allowed = [
            (Draft, Transition::Submit),
            (Submitted, Transition::Approve),
            (Approved, Transition::Activate),
            (Draft, Transition::Cancel),
            (Submitted, Transition::Cancel),
            (Approved, Transition::Cancel),
        ];

        for from in ScheduleStatus::ALL {
            for transition in Transition::ALL {
                let result = next_status(from, transition);
                if allowed.contains(&(from, transition)) {
                    assert!(result.is_ok(), "{} + {} 应允许", from, transition);
                } else {
                    assert!(
                        matches!(result, Err(ScheduleError::InvalidTransition { from: f, .. }) if f == from),
                        "{} + {} 应拒绝",
                        from,
                        transition
                    );
                }
            }
        }
    }

    #[test]
    fn test_active_cannot_be_cancelled_or_deleted() {
        assert!(matches!(
            next_status(Active, Transition::Cancel),
            Err(ScheduleError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ensure_deletable(Active),
            Err(ScheduleError::InvalidState { .. })
        ));
        assert!(ensure_deletable(Cancelled).is_ok());
        assert!(ensure_deletable(Draft).is_ok());
    }

    #[test]
    fn test_header_only_editable_in_draft() {
        assert!(ensure_header_editable(Draft, "update").is_ok());
        for status in [Submitted, Approved, Active, Cancelled] {
            assert!(matches!(
                ensure_header_editable(status, "update"),
                Err(ScheduleError::InvalidState { .. })
            ));
        }
    }

    #[test]
    fn test_cancelled_lines_are_read_only() {
        assert!(ensure_lines_mutable(Active, "add_line").is_ok());
        assert!(ensure_lines_mutable(Cancelled, "add_line").is_err());
    }
}
