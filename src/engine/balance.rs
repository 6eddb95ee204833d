// ==========================================
// 主生产计划引擎 - PAB / ATP 计算器
// ==========================================
// 职责: 对单个产品的有序计划行做一次前向折叠, 产出新的结果序列
// 红线: 纯函数, 不修改输入; 第 i 期的输出是第 i+1 期的输入
// ==========================================
// 递推公式 (第 i 期):
//   期初[i]   = 期初库存(i=1) | PAB[i-1]
//   毛需求[i] = 相关需求[i] + max(预测[i], 订单[i])
//   PAB[i]    = 期初[i] + 计划生产[i] - 毛需求[i]
//   ATP[i]    = max(0, 计划生产[i] + 期初[i] - Σ订单[i..下一个入库期))
//               仅在有入库的周期或第1期发布, 其余为 None
//   PAB[i] < 安全库存[i] → 低于安全库存警告 (不自动调整计划量)
// ==========================================

use crate::domain::schedule::ScheduleLine;
use crate::engine::error::{ScheduleError, ScheduleResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

// ==========================================
// PeriodBalance - 单期计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBalance {
    pub line_id: String,
    pub period_date: NaiveDate,
    pub opening_balance: f64,
    pub gross_demand: f64,
    pub projected_available_balance: f64,
    pub available_to_promise: Option<f64>,
    pub below_safety_stock: bool,
}

// ==========================================
// SafetyStockWarning - 低于安全库存警告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyStockWarning {
    pub product_id: String,
    pub line_id: String,
    pub period_date: NaiveDate,
    pub projected_available_balance: f64,
    pub safety_stock: f64,
    pub shortfall: f64,
}

impl SafetyStockWarning {
    pub fn from_line(line: &ScheduleLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            line_id: line.line_id.clone(),
            period_date: line.period_date,
            projected_available_balance: line.projected_available_balance,
            safety_stock: line.safety_stock,
            shortfall: line.safety_stock - line.projected_available_balance,
        }
    }
}

// ==========================================
// BalanceCalculator
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceCalculator;

impl BalanceCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 全量计算 (从第1期开始)
    pub fn project(&self, lines: &[ScheduleLine]) -> ScheduleResult<Vec<PeriodBalance>> {
        self.project_from(lines, 0)
    }

    /// 从 start_index 开始计算到期末
    ///
    /// start_index 之前的周期不重算, 其 PAB 作为起点期初值.
    /// 返回结果与 lines[start_index..] 一一对应.
    #[instrument(skip(self, lines), fields(count = lines.len()))]
    pub fn project_from(
        &self,
        lines: &[ScheduleLine],
        start_index: usize,
    ) -> ScheduleResult<Vec<PeriodBalance>> {
        check_ordering(lines)?;

        if start_index > lines.len() {
            return Err(ScheduleError::Internal(format!(
                "重算起点越界: start_index={}, len={}",
                start_index,
                lines.len()
            )));
        }

        let seed = match start_index {
            0 => lines.first().map(|l| l.beginning_inventory).unwrap_or(0.0),
            i => lines[i - 1].projected_available_balance,
        };

        let balances = lines[start_index..]
            .iter()
            .enumerate()
            .scan(seed, |opening, (offset, line)| {
                let index = start_index + offset;
                let opening_balance = *opening;
                let gross_demand = line.gross_demand();
                let pab = opening_balance + line.planned_production_qty - gross_demand;

                let available_to_promise = if index == 0 || line.has_receipt() {
                    let committed = committed_orders(lines, index);
                    Some((line.planned_production_qty + opening_balance - committed).max(0.0))
                } else {
                    None
                };

                *opening = pab;

                Some(PeriodBalance {
                    line_id: line.line_id.clone(),
                    period_date: line.period_date,
                    opening_balance,
                    gross_demand,
                    projected_available_balance: pab,
                    available_to_promise,
                    below_safety_stock: pab < line.safety_stock,
                })
            })
            .collect();

        Ok(balances)
    }
}

/// Σ客户订单: 从 index 起到下一个入库周期 (不含)
fn committed_orders(lines: &[ScheduleLine], index: usize) -> f64 {
    let mut total = lines[index].customer_order_qty;
    for line in &lines[index + 1..] {
        if line.has_receipt() {
            break;
        }
        total += line.customer_order_qty;
    }
    total
}

/// 校验输入为同一产品且周期严格递增
fn check_ordering(lines: &[ScheduleLine]) -> ScheduleResult<()> {
    for pair in lines.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.product_id != next.product_id {
            return Err(ScheduleError::Internal(format!(
                "计划行序列混入多个产品: {} / {}",
                prev.product_id, next.product_id
            )));
        }
        if prev.period_date >= next.period_date {
            return Err(ScheduleError::Internal(format!(
                "计划行序列未严格递增: product={}, {} >= {}",
                prev.product_id, prev.period_date, next.period_date
            )));
        }
    }
    Ok(())
}

/// ATP 窗口起点: index 所在的 ATP 区间从最近一个 (含自身) 入库周期或第1期开始
pub fn atp_anchor(lines: &[ScheduleLine], index: usize) -> usize {
    (0..=index.min(lines.len().saturating_sub(1)))
        .rev()
        .find(|&i| i == 0 || lines[i].has_receipt())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    /// (预测, 订单, 计划生产)
    fn make_lines(rows: &[(f64, f64, f64)], beginning_inventory: f64) -> Vec<ScheduleLine> {
        rows.iter()
            .enumerate()
            .map(|(i, &(forecast, orders, planned))| ScheduleLine {
                line_id: format!("L{}", i + 1),
                schedule_id: "S1".to_string(),
                product_id: "P1".to_string(),
                period_date: base_date() + Duration::days(7 * i as i64),
                period_number: i as u32 + 1,
                forecast_qty: forecast,
                customer_order_qty: orders,
                dependent_demand: 0.0,
                planned_production_qty: planned,
                beginning_inventory: if i == 0 { beginning_inventory } else { 0.0 },
                safety_stock: 0.0,
                projected_available_balance: 0.0,
                available_to_promise: None,
                actual_production_qty: 0.0,
                actual_sales_qty: 0.0,
                requires_reapproval: false,
            })
            .collect()
    }

    fn apply(lines: &mut [ScheduleLine], balances: &[PeriodBalance], start: usize) {
        for (line, b) in lines[start..].iter_mut().zip(balances) {
            line.projected_available_balance = b.projected_available_balance;
            line.available_to_promise = b.available_to_promise;
        }
    }

    #[test]
    fn test_two_period_recurrence() {
        let lines = make_lines(&[(30.0, 40.0, 50.0), (60.0, 20.0, 0.0)], 100.0);
        let balances = BalanceCalculator::new().project(&lines).unwrap();

        assert_eq!(balances[0].gross_demand, 40.0);
        assert_eq!(balances[0].projected_available_balance, 110.0);
        assert_eq!(balances[1].opening_balance, 110.0);
        assert_eq!(balances[1].gross_demand, 60.0);
        assert_eq!(balances[1].projected_available_balance, 50.0);
    }

    #[test]
    fn test_dependent_demand_is_additive() {
        let mut lines = make_lines(&[(10.0, 0.0, 0.0)], 50.0);
        lines[0].dependent_demand = 15.0;
        let balances = BalanceCalculator::new().project(&lines).unwrap();
        assert_eq!(balances[0].gross_demand, 25.0);
        assert_eq!(balances[0].projected_available_balance, 25.0);
    }

    #[test]
    fn test_atp_published_only_on_receipt_periods() {
        // 第1期: 期初100, 生产50; 订单 40 + 20 (第2期无入库) → ATP = 150 - 60 = 90
        // 第3期: 入库 80, 期初 = PAB[2], 订单 10 + 5
        let lines = make_lines(
            &[
                (30.0, 40.0, 50.0),
                (60.0, 20.0, 0.0),
                (10.0, 10.0, 80.0),
                (0.0, 5.0, 0.0),
            ],
            100.0,
        );
        let balances = BalanceCalculator::new().project(&lines).unwrap();

        assert_eq!(balances[0].available_to_promise, Some(90.0));
        assert_eq!(balances[1].available_to_promise, None);
        // PAB[2] = 50 → ATP[3] = 80 + 50 - 15 = 115
        assert_eq!(balances[2].opening_balance, 50.0);
        assert_eq!(balances[2].available_to_promise, Some(115.0));
        assert_eq!(balances[3].available_to_promise, None);
    }

    #[test]
    fn test_atp_is_floored_at_zero() {
        let lines = make_lines(&[(0.0, 500.0, 10.0)], 0.0);
        let balances = BalanceCalculator::new().project(&lines).unwrap();
        assert_eq!(balances[0].available_to_promise, Some(0.0));
        assert_eq!(balances[0].projected_available_balance, -490.0);
    }

    #[test]
    fn test_below_safety_stock_is_flagged_but_plan_untouched() {
        let mut lines = make_lines(&[(80.0, 0.0, 0.0)], 100.0);
        lines[0].safety_stock = 30.0;
        let balances = BalanceCalculator::new().project(&lines).unwrap();
        assert!(balances[0].below_safety_stock);
        assert_eq!(lines[0].planned_production_qty, 0.0);
    }

    #[test]
    fn test_recurrence_holds_for_every_period() {
        let rows: Vec<(f64, f64, f64)> = (0..12)
            .map(|i| {
                let i = i as f64;
                (10.0 + i * 3.0, 25.0 - i, if (i as i32) % 3 == 0 { 40.0 } else { 0.0 })
            })
            .collect();
        let mut lines = make_lines(&rows, 75.0);
        for (i, line) in lines.iter_mut().enumerate() {
            line.dependent_demand = (i % 4) as f64;
        }

        let balances = BalanceCalculator::new().project(&lines).unwrap();
        for i in 1..lines.len() {
            let expected = balances[i - 1].projected_available_balance
                + lines[i].planned_production_qty
                - lines[i].dependent_demand
                - lines[i].forecast_qty.max(lines[i].customer_order_qty);
            assert!((balances[i].projected_available_balance - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut lines = make_lines(
            &[(30.0, 40.0, 50.0), (60.0, 20.0, 0.0), (5.0, 5.0, 20.0)],
            100.0,
        );
        let calc = BalanceCalculator::new();

        let first = calc.project(&lines).unwrap();
        apply(&mut lines, &first, 0);
        let second = calc.project(&lines).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_pass_matches_full_pass() {
        let mut lines = make_lines(
            &[(30.0, 40.0, 50.0), (60.0, 20.0, 0.0), (5.0, 5.0, 20.0), (0.0, 9.0, 0.0)],
            100.0,
        );
        let calc = BalanceCalculator::new();
        let full = calc.project(&lines).unwrap();
        apply(&mut lines, &full, 0);

        let tail = calc.project_from(&lines, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[..], full[2..]);
    }

    #[test]
    fn test_unordered_sequence_is_internal_error() {
        let mut lines = make_lines(&[(1.0, 1.0, 1.0), (1.0, 1.0, 1.0)], 0.0);
        lines.swap(0, 1);
        let err = BalanceCalculator::new().project(&lines).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_atp_anchor() {
        let lines = make_lines(
            &[(0.0, 0.0, 10.0), (0.0, 0.0, 0.0), (0.0, 0.0, 5.0), (0.0, 0.0, 0.0)],
            0.0,
        );
        assert_eq!(atp_anchor(&lines, 0), 0);
        assert_eq!(atp_anchor(&lines, 1), 0);
        assert_eq!(atp_anchor(&lines, 2), 2);
        assert_eq!(atp_anchor(&lines, 3), 2);
    }

    #[test]
    fn test_empty_sequence() {
        assert!(BalanceCalculator::new().project(&[]).unwrap().is_empty());
    }
}
