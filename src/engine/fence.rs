// ==========================================
// 主生产计划引擎 - 计划围栏判定
// ==========================================
// 职责: 周期日期 + 参考日期 + 围栏长度 → Frozen / Slushy / Free
// 红线: 纯函数, 每次写操作都用调用方传入的参考日期重新判定, 不缓存
// ==========================================
// 规则 (offset = period_date - reference_date, 单位: 自然日):
//   offset <= frozen                    → Frozen (含过去的周期)
//   frozen < offset <= frozen + slushy  → Slushy
//   offset > frozen + slushy            → Free
// ==========================================

use crate::domain::schedule::PlanningFences;
use crate::domain::types::FenceState;
use chrono::NaiveDate;

/// 判定单个周期的围栏状态
pub fn classify(
    period_date: NaiveDate,
    reference_date: NaiveDate,
    frozen_days: i64,
    slushy_days: i64,
) -> FenceState {
    let offset = (period_date - reference_date).num_days();

    if offset < 0 || offset <= frozen_days {
        FenceState::Frozen
    } else if offset <= frozen_days + slushy_days {
        FenceState::Slushy
    } else {
        FenceState::Free
    }
}

// ==========================================
// FenceClassifier - 绑定围栏配置的判定器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct FenceClassifier {
    fences: PlanningFences,
}

impl FenceClassifier {
    pub fn new(fences: PlanningFences) -> Self {
        Self { fences }
    }

    pub fn classify(&self, period_date: NaiveDate, reference_date: NaiveDate) -> FenceState {
        classify(
            period_date,
            reference_date,
            self.fences.frozen_days,
            self.fences.slushy_days,
        )
    }
}
