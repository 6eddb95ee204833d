// ==========================================
// 主生产计划引擎 - 领域类型定义
// ==========================================
// 职责: 计划周期类型 / 计划状态 / 围栏状态 / 操作类型
// 红线: 状态类型为封闭枚举, 解析失败必须报错, 不允许静默回落默认值
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 枚举解析失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("无法解析{kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ==========================================
// 计划周期类型 (Period Type)
// ==========================================
// 决定周期桶宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Daily,   // 日
    Weekly,  // 周
    Monthly, // 月
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.to_db_str())
    }
}

impl PeriodType {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "DAILY",
            PeriodType::Weekly => "WEEKLY",
            PeriodType::Monthly => "MONTHLY",
        }
    }
}

impl FromStr for PeriodType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAILY" => Ok(PeriodType::Daily),
            "WEEKLY" => Ok(PeriodType::Weekly),
            "MONTHLY" => Ok(PeriodType::Monthly),
            _ => Err(ParseEnumError::new("计划周期类型", s)),
        }
    }
}

// ==========================================
// 计划状态 (Schedule Status)
// ==========================================
// 状态机: Draft → Submitted → Approved → Active
//         Draft/Submitted/Approved → Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Draft,     // 草稿
    Submitted, // 已提交
    Approved,  // 已审批
    Active,    // 执行中
    Cancelled, // 已取消
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.to_db_str())
    }
}

impl ScheduleStatus {
    /// 全部状态 (用于穷举校验)
    pub const ALL: [ScheduleStatus; 5] = [
        ScheduleStatus::Draft,
        ScheduleStatus::Submitted,
        ScheduleStatus::Approved,
        ScheduleStatus::Active,
        ScheduleStatus::Cancelled,
    ];

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "DRAFT",
            ScheduleStatus::Submitted => "SUBMITTED",
            ScheduleStatus::Approved => "APPROVED",
            ScheduleStatus::Active => "ACTIVE",
            ScheduleStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Active | ScheduleStatus::Cancelled)
    }
}

impl FromStr for ScheduleStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(ScheduleStatus::Draft),
            "SUBMITTED" => Ok(ScheduleStatus::Submitted),
            "APPROVED" => Ok(ScheduleStatus::Approved),
            "ACTIVE" => Ok(ScheduleStatus::Active),
            "CANCELLED" => Ok(ScheduleStatus::Cancelled),
            _ => Err(ParseEnumError::new("计划状态", s)),
        }
    }
}

// ==========================================
// 围栏状态 (Fence State)
// ==========================================
// 顺序: Frozen < Slushy < Free
// 红线: 围栏状态是派生值, 不落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FenceState {
    Frozen, // 冻结: 禁止修改/删除
    Slushy, // 半冻结: 可修改(需重新审批), 禁止删除
    Free,   // 自由: 可修改/删除
}

impl fmt::Display for FenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceState::Frozen => write!(f, "FROZEN"),
            FenceState::Slushy => write!(f, "SLUSHY"),
            FenceState::Free => write!(f, "FREE"),
        }
    }
}

impl FenceState {
    /// 是否允许修改计划量
    pub fn allows_edit(&self) -> bool {
        !matches!(self, FenceState::Frozen)
    }

    /// 是否允许删除计划行
    pub fn allows_delete(&self) -> bool {
        matches!(self, FenceState::Free)
    }
}

// ==========================================
// 操作类型 (Schedule Action)
// ==========================================
// 用途: 操作日志 action_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleAction {
    CreateSchedule,
    UpdateHeader,
    SetPlanningFences,
    AddLine,
    GenerateLines,
    UpdateLine,
    RemoveLine,
    RecordActuals,
    ImportForecast,
    Submit,
    Approve,
    Activate,
    Cancel,
    DeleteSchedule,
    UpdateConfig,
}

impl fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.to_db_str())
    }
}

impl ScheduleAction {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ScheduleAction::CreateSchedule => "CREATE_SCHEDULE",
            ScheduleAction::UpdateHeader => "UPDATE_HEADER",
            ScheduleAction::SetPlanningFences => "SET_PLANNING_FENCES",
            ScheduleAction::AddLine => "ADD_LINE",
            ScheduleAction::GenerateLines => "GENERATE_LINES",
            ScheduleAction::UpdateLine => "UPDATE_LINE",
            ScheduleAction::RemoveLine => "REMOVE_LINE",
            ScheduleAction::RecordActuals => "RECORD_ACTUALS",
            ScheduleAction::ImportForecast => "IMPORT_FORECAST",
            ScheduleAction::Submit => "SUBMIT",
            ScheduleAction::Approve => "APPROVE",
            ScheduleAction::Activate => "ACTIVATE",
            ScheduleAction::Cancel => "CANCEL",
            ScheduleAction::DeleteSchedule => "DELETE_SCHEDULE",
            ScheduleAction::UpdateConfig => "UPDATE_CONFIG",
        }
    }
}
