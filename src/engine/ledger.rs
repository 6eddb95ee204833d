// ==========================================
// 主生产计划引擎 - 计划行台账
// ==========================================
// 职责: 按产品维护有序、连续、无缺口的计划行序列, 提供安全的修改原语
// 不变量:
//   1. 同一 (产品, 周期) 只有一行
//   2. 同一产品的周期严格递增且在周期网格上连续
//   3. period_number = 产品内周期的名次 (从1开始)
// 说明: 原语本身先校验后修改, 校验失败时台账不变
// ==========================================

use crate::domain::schedule::{LineInput, LineUpdate, ScheduleLine};
use crate::domain::types::FenceState;
use crate::engine::balance::{atp_anchor, BalanceCalculator};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::fence::FenceClassifier;
use crate::engine::period::PeriodGrid;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// BalanceChange - 需回写的余额变更
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub line_id: String,
    pub product_id: String,
    pub period_date: NaiveDate,
    pub previous_pab: f64,
    pub projected_available_balance: f64,
    pub previous_atp: Option<f64>,
    pub available_to_promise: Option<f64>,
}

/// 行定位: (产品, 产品内下标)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePosition {
    pub product_id: String,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleLedger {
    schedule_id: String,
    products: BTreeMap<String, Vec<ScheduleLine>>,
}

impl ScheduleLedger {
    pub fn new(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            products: BTreeMap::new(),
        }
    }

    /// 由已持久化的计划行重建台账 (加载路径)
    ///
    /// 发现重复周期或归属错误视为内部错误: 这些状态本不该被写入.
    pub fn from_lines(
        schedule_id: impl Into<String>,
        lines: Vec<ScheduleLine>,
    ) -> ScheduleResult<Self> {
        let mut ledger = Self::new(schedule_id);

        for line in lines {
            if line.schedule_id != ledger.schedule_id {
                return Err(ScheduleError::Internal(format!(
                    "计划行 {} 属于计划 {}, 不属于 {}",
                    line.line_id, line.schedule_id, ledger.schedule_id
                )));
            }
            ledger
                .products
                .entry(line.product_id.clone())
                .or_default()
                .push(line);
        }

        for (product_id, lines) in ledger.products.iter_mut() {
            lines.sort_by_key(|l| l.period_date);
            if lines.windows(2).any(|w| w[0].period_date == w[1].period_date) {
                return Err(ScheduleError::Internal(format!(
                    "产品 {} 存在重复周期",
                    product_id
                )));
            }
            renumber(lines);
        }

        Ok(ledger)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.values().map(Vec::len).sum()
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(String::as_str)
    }

    /// 全部计划行 (按产品、周期排序)
    pub fn lines(&self) -> impl Iterator<Item = &ScheduleLine> {
        self.products.values().flatten()
    }

    pub fn product_lines(&self, product_id: &str) -> &[ScheduleLine] {
        self.products
            .get(product_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn locate(&self, line_id: &str) -> Option<LinePosition> {
        self.products.iter().find_map(|(product_id, lines)| {
            lines
                .iter()
                .position(|l| l.line_id == line_id)
                .map(|index| LinePosition {
                    product_id: product_id.clone(),
                    index,
                })
        })
    }

    pub fn line(&self, line_id: &str) -> Option<&ScheduleLine> {
        self.lines().find(|l| l.line_id == line_id)
    }

    fn require(&self, line_id: &str) -> ScheduleResult<LinePosition> {
        self.locate(line_id)
            .ok_or_else(|| ScheduleError::not_found("ScheduleLine", line_id))
    }

    fn line_at(&self, pos: &LinePosition) -> &ScheduleLine {
        &self.products[&pos.product_id][pos.index]
    }

    fn line_at_mut(&mut self, pos: &LinePosition) -> ScheduleResult<&mut ScheduleLine> {
        self.products
            .get_mut(&pos.product_id)
            .and_then(|lines| lines.get_mut(pos.index))
            .ok_or_else(|| ScheduleError::Internal(format!("行定位失效: {:?}", pos)))
    }

    // ==========================================
    // 修改原语
    // ==========================================

    /// 新增计划行
    ///
    /// 产品的第一行可落在期间内任意网格日期; 之后只能紧邻已有区间的首尾,
    /// 否则会留下缺口.
    pub fn add_line(
        &mut self,
        input: &LineInput,
        grid: &PeriodGrid,
        line_id: String,
    ) -> ScheduleResult<LinePosition> {
        if input.product_id.trim().is_empty() {
            return Err(ScheduleError::validation("product_id 不能为空"));
        }
        for (field, value) in input.quantities() {
            validate_quantity(field, value)?;
        }

        if input.period_date < grid.start() || input.period_date > grid.end() {
            return Err(ScheduleError::OutOfHorizon {
                period_date: input.period_date,
                period_start: grid.start(),
                period_end: grid.end(),
            });
        }
        if !grid.is_aligned(input.period_date) {
            return Err(ScheduleError::validation(format!(
                "周期日期 {} 不在周期网格上",
                input.period_date
            )));
        }

        let existing = self.product_lines(&input.product_id);
        if existing.iter().any(|l| l.period_date == input.period_date) {
            return Err(ScheduleError::DuplicatePeriod {
                product_id: input.product_id.clone(),
                period_date: input.period_date,
            });
        }

        let index = match (existing.first(), existing.last()) {
            (Some(first), Some(last)) => {
                if grid.previous_bucket(first.period_date) == Some(input.period_date) {
                    0
                } else if grid.next_bucket(last.period_date) == Some(input.period_date) {
                    existing.len()
                } else {
                    return Err(ScheduleError::validation(format!(
                        "产品 {} 的周期 {} 与已有区间 [{}, {}] 不相邻, 会产生缺口",
                        input.product_id, input.period_date, first.period_date, last.period_date
                    )));
                }
            }
            _ => 0,
        };

        // 前插成为新首期: 未给期初库存时沿用原首期的期初
        let beginning_inventory = match existing.first() {
            Some(first) if index == 0 && input.beginning_inventory == 0.0 => {
                first.beginning_inventory
            }
            _ => input.beginning_inventory,
        };

        let line = ScheduleLine {
            line_id,
            schedule_id: self.schedule_id.clone(),
            product_id: input.product_id.clone(),
            period_date: input.period_date,
            period_number: 0,
            forecast_qty: input.forecast_qty,
            customer_order_qty: input.customer_order_qty,
            dependent_demand: input.dependent_demand,
            planned_production_qty: input.planned_production_qty,
            beginning_inventory,
            safety_stock: input.safety_stock,
            projected_available_balance: 0.0,
            available_to_promise: None,
            actual_production_qty: 0.0,
            actual_sales_qty: 0.0,
            requires_reapproval: false,
        };

        let lines = self.products.entry(input.product_id.clone()).or_default();
        lines.insert(index, line);
        renumber(lines);

        Ok(LinePosition {
            product_id: input.product_id.clone(),
            index,
        })
    }

    /// 修改计划行
    ///
    /// 冻结区拒绝; 半冻结区允许但标记待重新审批.
    pub fn update_line(
        &mut self,
        line_id: &str,
        update: &LineUpdate,
        classifier: &FenceClassifier,
        today: NaiveDate,
    ) -> ScheduleResult<(LinePosition, FenceState)> {
        let pos = self.require(line_id)?;
        let fence = classifier.classify(self.line_at(&pos).period_date, today);

        if !fence.allows_edit() {
            return Err(ScheduleError::FenceViolation {
                line_id: line_id.to_string(),
                fence,
                operation: "update".to_string(),
            });
        }

        if update.is_empty() {
            return Err(ScheduleError::validation("修改内容为空"));
        }
        for (field, value) in update.quantities() {
            if let Some(v) = value {
                validate_quantity(field, v)?;
            }
        }
        if pos.index > 0 && update.beginning_inventory.is_some() {
            return Err(ScheduleError::validation(
                "期初库存仅对产品第1期有效, 之后各期由上期 PAB 推导",
            ));
        }

        let line = self.line_at_mut(&pos)?;
        update.apply_to(line);
        if fence == FenceState::Slushy {
            line.requires_reapproval = true;
        }

        Ok((pos, fence))
    }

    /// 删除计划行, 返回被删除的行及其原位置
    ///
    /// 仅自由区、无实绩、且位于产品区间首尾的行可删除.
    pub fn remove_line(
        &mut self,
        line_id: &str,
        classifier: &FenceClassifier,
        today: NaiveDate,
    ) -> ScheduleResult<(LinePosition, ScheduleLine)> {
        let pos = self.require(line_id)?;
        let line = self.line_at(&pos);
        let fence = classifier.classify(line.period_date, today);

        if !fence.allows_delete() {
            return Err(ScheduleError::FenceViolation {
                line_id: line_id.to_string(),
                fence,
                operation: "remove".to_string(),
            });
        }
        if line.has_actuals() {
            return Err(ScheduleError::HasActuals {
                line_id: line_id.to_string(),
            });
        }

        let count = self.product_lines(&pos.product_id).len();
        if pos.index != 0 && pos.index + 1 != count {
            return Err(ScheduleError::validation(format!(
                "计划行 {} 位于产品 {} 区间中部, 删除会产生缺口",
                line_id, pos.product_id
            )));
        }

        let lines = self
            .products
            .get_mut(&pos.product_id)
            .ok_or_else(|| ScheduleError::Internal(format!("行定位失效: {:?}", pos)))?;
        let removed = lines.remove(pos.index);
        if lines.is_empty() {
            self.products.remove(&pos.product_id);
        } else {
            renumber(lines);
        }

        Ok((pos, removed))
    }

    /// 记录实绩 (不受围栏限制, 不触发重算)
    pub fn record_actuals(
        &mut self,
        line_id: &str,
        produced_qty: f64,
        sold_qty: f64,
    ) -> ScheduleResult<&ScheduleLine> {
        validate_quantity("actual_production_qty", produced_qty)?;
        validate_quantity("actual_sales_qty", sold_qty)?;

        let pos = self.require(line_id)?;
        let line = self.line_at_mut(&pos)?;
        line.actual_production_qty = produced_qty;
        line.actual_sales_qty = sold_qty;
        Ok(&*line)
    }

    /// 标记待重新审批
    pub fn flag_reapproval(&mut self, line_id: &str) -> ScheduleResult<()> {
        let pos = self.require(line_id)?;
        self.line_at_mut(&pos)?.requires_reapproval = true;
        Ok(())
    }

    /// 清除全部待重新审批标志, 返回被清除的行数
    pub fn clear_reapproval_flags(&mut self) -> usize {
        let mut cleared = 0;
        for line in self.products.values_mut().flatten() {
            if line.requires_reapproval {
                line.requires_reapproval = false;
                cleared += 1;
            }
        }
        cleared
    }

    // ==========================================
    // 重算
    // ==========================================

    /// 校验产品序列在网格上连续 (缺口属于程序缺陷)
    pub fn verify_contiguity(&self, product_id: &str, grid: &PeriodGrid) -> ScheduleResult<()> {
        let lines = self.product_lines(product_id);

        for line in lines {
            if !grid.is_aligned(line.period_date) {
                return Err(ScheduleError::Internal(format!(
                    "产品 {} 的周期 {} 不在网格上",
                    product_id, line.period_date
                )));
            }
        }
        for pair in lines.windows(2) {
            if grid.next_bucket(pair[0].period_date) != Some(pair[1].period_date) {
                return Err(ScheduleError::Internal(format!(
                    "产品 {} 在 {} 与 {} 之间存在缺口",
                    product_id, pair[0].period_date, pair[1].period_date
                )));
            }
        }
        Ok(())
    }

    /// 从 start_index 起重算产品余额, 返回实际变化的周期
    ///
    /// 从前一期所在 ATP 窗口的起点开始重算: start_index 的订单或入库变化
    /// 会改变前一窗口的订单合计区间. 更早的周期 PAB 不变.
    pub fn recompute_product(
        &mut self,
        product_id: &str,
        start_index: usize,
        grid: &PeriodGrid,
    ) -> ScheduleResult<Vec<BalanceChange>> {
        self.verify_contiguity(product_id, grid)?;

        let Some(lines) = self.products.get_mut(product_id) else {
            return Ok(Vec::new());
        };
        if lines.is_empty() || start_index >= lines.len() {
            return Ok(Vec::new());
        }

        let anchor = atp_anchor(lines, start_index.saturating_sub(1));
        let balances = BalanceCalculator::new().project_from(lines, anchor)?;

        let mut changes = Vec::new();
        for (offset, balance) in balances.into_iter().enumerate() {
            let index = anchor + offset;
            let line = &mut lines[index];

            if index > 0 {
                line.beginning_inventory = balance.opening_balance;
            }

            let pab_changed = line.projected_available_balance != balance.projected_available_balance;
            let atp_changed = line.available_to_promise != balance.available_to_promise;
            if pab_changed || atp_changed {
                changes.push(BalanceChange {
                    line_id: line.line_id.clone(),
                    product_id: line.product_id.clone(),
                    period_date: line.period_date,
                    previous_pab: line.projected_available_balance,
                    projected_available_balance: balance.projected_available_balance,
                    previous_atp: line.available_to_promise,
                    available_to_promise: balance.available_to_promise,
                });
            }

            line.projected_available_balance = balance.projected_available_balance;
            line.available_to_promise = balance.available_to_promise;
        }

        Ok(changes)
    }
}

/// 重新编号 (产品内名次)
fn renumber(lines: &mut [ScheduleLine]) {
    for (i, line) in lines.iter_mut().enumerate() {
        line.period_number = i as u32 + 1;
    }
}

fn validate_quantity(field: &str, value: f64) -> ScheduleResult<()> {
    if !value.is_finite() {
        return Err(ScheduleError::validation(format!("{} 不是有效数值", field)));
    }
    if value < 0.0 {
        return Err(ScheduleError::validation(format!(
            "{} 不能为负数: {}",
            field, value
        )));
    }
    Ok(())
}
