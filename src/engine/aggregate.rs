// ==========================================
// 主生产计划引擎 - 计划聚合
// ==========================================
// 职责: 一致性边界. 表头 + 全部计划行的修改都经由此处,
//       统一执行生命周期校验 → 围栏校验 → 台账修改 → 余额重算
// 红线: 任一步骤失败, 聚合保持调用前状态 (先在副本上执行, 成功后替换)
// ==========================================

use crate::domain::schedule::{
    LineInput, LineUpdate, MasterSchedule, PlanningFences, ProductSummary, ScheduleLine,
};
use crate::domain::types::{FenceState, PeriodType, ScheduleStatus};
use crate::engine::balance::{atp_anchor, SafetyStockWarning};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::fence::FenceClassifier;
use crate::engine::ledger::{BalanceChange, ScheduleLedger};
use crate::engine::lifecycle::{self, Transition};
use crate::engine::period::PeriodGrid;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

// ==========================================
// NewSchedule - 创建参数
// ==========================================
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub schedule_id: String,
    pub schedule_number: String,
    pub name: String,
    pub description: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_type: PeriodType,
    pub fences: PlanningFences,
    pub created_by: String,
}

// ==========================================
// MutationOutcome - 一次提交的对外输出
// ==========================================
/// - balance_changes: 需持久层回写的 PAB/ATP 变化
/// - safety_stock_warnings: 受影响产品当前低于安全库存的周期
/// - reapproval_flagged: 本次因半冻结区修改而标记待审批的行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub affected_line_id: Option<String>,
    pub balance_changes: Vec<BalanceChange>,
    pub safety_stock_warnings: Vec<SafetyStockWarning>,
    pub reapproval_flagged: Vec<String>,
}

impl MutationOutcome {
    fn for_line(line_id: &str) -> Self {
        Self {
            affected_line_id: Some(line_id.to_string()),
            ..Default::default()
        }
    }

    /// 合并另一结果 (批量操作时使用); 同一行的余额变化保留最早的 previous 值
    pub fn merge(&mut self, other: MutationOutcome) {
        for change in other.balance_changes {
            match self
                .balance_changes
                .iter_mut()
                .find(|c| c.line_id == change.line_id)
            {
                Some(existing) => {
                    existing.projected_available_balance = change.projected_available_balance;
                    existing.available_to_promise = change.available_to_promise;
                }
                None => self.balance_changes.push(change),
            }
        }
        self.balance_changes.retain(|c| {
            c.previous_pab != c.projected_available_balance
                || c.previous_atp != c.available_to_promise
        });

        for warning in other.safety_stock_warnings {
            self.safety_stock_warnings
                .retain(|w| w.product_id != warning.product_id || w.line_id != warning.line_id);
            self.safety_stock_warnings.push(warning);
        }
        for line_id in other.reapproval_flagged {
            if !self.reapproval_flagged.contains(&line_id) {
                self.reapproval_flagged.push(line_id);
            }
        }
        if other.affected_line_id.is_some() {
            self.affected_line_id = other.affected_line_id;
        }
    }
}

// ==========================================
// ScheduleAggregate
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleAggregate {
    header: MasterSchedule,
    ledger: ScheduleLedger,
}

impl ScheduleAggregate {
    /// 创建空的草稿计划
    pub fn create(new: NewSchedule, created_at: NaiveDateTime) -> ScheduleResult<Self> {
        if new.name.trim().is_empty() {
            return Err(ScheduleError::validation("计划名称不能为空"));
        }
        if new.schedule_number.trim().is_empty() {
            return Err(ScheduleError::validation("计划编号不能为空"));
        }
        if new.created_by.trim().is_empty() {
            return Err(ScheduleError::validation("创建人不能为空"));
        }
        if new.period_start >= new.period_end {
            return Err(ScheduleError::validation(format!(
                "计划期间无效: {} >= {}",
                new.period_start, new.period_end
            )));
        }
        validate_fences(&new.fences, (new.period_end - new.period_start).num_days())?;

        let header = MasterSchedule {
            schedule_id: new.schedule_id.clone(),
            schedule_number: new.schedule_number,
            name: new.name,
            description: non_blank(new.description),
            period_start: new.period_start,
            period_end: new.period_end,
            period_type: new.period_type,
            fences: new.fences,
            status: ScheduleStatus::Draft,
            created_by: new.created_by,
            created_at,
            approved_by: None,
            approval_date: None,
            revision: 0,
        };

        info!(
            schedule_id = %header.schedule_id,
            schedule_number = %header.schedule_number,
            "创建主生产计划"
        );

        Ok(Self {
            ledger: ScheduleLedger::new(new.schedule_id),
            header,
        })
    }

    /// 由持久化数据重建
    pub fn restore(header: MasterSchedule, lines: Vec<ScheduleLine>) -> ScheduleResult<Self> {
        let ledger = ScheduleLedger::from_lines(header.schedule_id.clone(), lines)?;
        Ok(Self { header, ledger })
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn header(&self) -> &MasterSchedule {
        &self.header
    }

    pub fn schedule_id(&self) -> &str {
        &self.header.schedule_id
    }

    pub fn status(&self) -> ScheduleStatus {
        self.header.status
    }

    pub fn lines(&self) -> impl Iterator<Item = &ScheduleLine> {
        self.ledger.lines()
    }

    pub fn line(&self, line_id: &str) -> Option<&ScheduleLine> {
        self.ledger.line(line_id)
    }

    pub fn products(&self) -> Vec<String> {
        self.ledger.products().map(str::to_string).collect()
    }

    pub fn product_lines(&self, product_id: &str) -> &[ScheduleLine] {
        self.ledger.product_lines(product_id)
    }

    /// 指定参考日期下某行的围栏状态 (实时判定)
    pub fn fence_of(&self, line_id: &str, today: NaiveDate) -> ScheduleResult<FenceState> {
        let line = self
            .ledger
            .line(line_id)
            .ok_or_else(|| ScheduleError::not_found("ScheduleLine", line_id))?;
        Ok(self.classifier().classify(line.period_date, today))
    }

    pub fn lines_pending_reapproval(&self) -> Vec<&ScheduleLine> {
        self.ledger.lines().filter(|l| l.requires_reapproval).collect()
    }

    pub fn safety_stock_warnings(&self) -> Vec<SafetyStockWarning> {
        self.ledger
            .lines()
            .filter(|l| l.is_below_safety_stock())
            .map(SafetyStockWarning::from_line)
            .collect()
    }

    /// 按产品汇总
    pub fn summary(&self) -> Vec<ProductSummary> {
        self.ledger
            .products()
            .map(|product_id| {
                let lines = self.ledger.product_lines(product_id);
                ProductSummary {
                    product_id: product_id.to_string(),
                    period_count: lines.len(),
                    total_gross_demand: lines.iter().map(ScheduleLine::gross_demand).sum(),
                    total_planned_production: lines.iter().map(|l| l.planned_production_qty).sum(),
                    total_actual_production: lines.iter().map(|l| l.actual_production_qty).sum(),
                    total_actual_sales: lines.iter().map(|l| l.actual_sales_qty).sum(),
                    total_variance: lines.iter().map(ScheduleLine::variance).sum(),
                    ending_balance: lines
                        .last()
                        .map(|l| l.projected_available_balance)
                        .unwrap_or(0.0),
                    below_safety_stock_periods: lines
                        .iter()
                        .filter(|l| l.is_below_safety_stock())
                        .count(),
                }
            })
            .collect()
    }

    /// 某日可承诺量: 取覆盖该日的周期所在 ATP 窗口起点 (第1期或入库期) 的 ATP
    ///
    /// 产品无计划行或日期不被任何周期覆盖时返回 None.
    pub fn atp_at(&self, product_id: &str, date: NaiveDate) -> Option<f64> {
        let lines = self.ledger.product_lines(product_id);
        let last = lines.last()?;
        let covered = self
            .grid()
            .next_bucket(last.period_date)
            .map_or(date <= self.header.period_end, |next| date < next);
        if !covered {
            return None;
        }

        let index = lines.iter().rposition(|l| l.period_date <= date)?;
        lines[atp_anchor(lines, index)].available_to_promise
    }

    /// 删除前校验 (执行中的计划不可删除)
    pub fn ensure_deletable(&self) -> ScheduleResult<()> {
        lifecycle::ensure_deletable(self.header.status)
    }

    /// 持久化成功后推进修订号
    pub fn mark_persisted(&mut self, revision: i32) {
        self.header.revision = revision;
    }

    fn grid(&self) -> PeriodGrid {
        PeriodGrid::new(
            self.header.period_start,
            self.header.period_end,
            self.header.period_type,
        )
    }

    fn classifier(&self) -> FenceClassifier {
        FenceClassifier::new(self.header.fences)
    }

    // ==========================================
    // 表头修改 (仅草稿)
    // ==========================================

    pub fn set_planning_fences(&mut self, fences: PlanningFences) -> ScheduleResult<()> {
        lifecycle::ensure_header_editable(self.header.status, "set_planning_fences")?;
        validate_fences(&fences, self.header.horizon_days())?;

        debug!(schedule_id = %self.header.schedule_id, ?fences, "更新计划围栏");
        self.header.fences = fences;
        Ok(())
    }

    /// 修改名称 / 说明 / 期间结束日 (说明传空串即清除)
    pub fn update_header(
        &mut self,
        name: Option<String>,
        description: Option<String>,
        period_end: Option<NaiveDate>,
    ) -> ScheduleResult<()> {
        lifecycle::ensure_header_editable(self.header.status, "update")?;

        if let Some(name) = &name {
            if name.trim().is_empty() {
                return Err(ScheduleError::validation("计划名称不能为空"));
            }
        }
        if let Some(end) = period_end {
            if end <= self.header.period_start {
                return Err(ScheduleError::validation(format!(
                    "计划期间无效: {} >= {}",
                    self.header.period_start, end
                )));
            }
            validate_fences(
                &self.header.fences,
                (end - self.header.period_start).num_days(),
            )?;
            if let Some(line) = self.ledger.lines().find(|l| l.period_date > end) {
                return Err(ScheduleError::validation(format!(
                    "计划行 {} 的周期 {} 会落在新期间之外",
                    line.line_id, line.period_date
                )));
            }
        }

        if let Some(name) = name {
            self.header.name = name;
        }
        if description.is_some() {
            self.header.description = non_blank(description);
        }
        if let Some(end) = period_end {
            self.header.period_end = end;
        }
        Ok(())
    }

    // ==========================================
    // 计划行修改
    // ==========================================

    /// 新增计划行
    ///
    /// 草稿阶段不受围栏限制; 提交后新增同样遵守围栏 (冻结区拒绝, 半冻结区标记待审批).
    #[instrument(skip(self, input), fields(schedule_id = %self.header.schedule_id, product_id = %input.product_id))]
    pub fn add_line(&mut self, input: LineInput, today: NaiveDate) -> ScheduleResult<MutationOutcome> {
        lifecycle::ensure_lines_mutable(self.header.status, "add_line")?;

        let mut ledger = self.ledger.clone();
        let outcome = self.add_into(&mut ledger, &input, today)?;
        self.ledger = ledger;

        info!(line_id = ?outcome.affected_line_id, changes = outcome.balance_changes.len(), "新增计划行");
        self.log_warnings(&outcome);
        Ok(outcome)
    }

    fn add_into(
        &self,
        ledger: &mut ScheduleLedger,
        input: &LineInput,
        today: NaiveDate,
    ) -> ScheduleResult<MutationOutcome> {
        let grid = self.grid();
        let line_id = uuid::Uuid::new_v4().to_string();

        let fence = if self.header.status == ScheduleStatus::Draft {
            FenceState::Free
        } else {
            self.classifier().classify(input.period_date, today)
        };
        if !fence.allows_edit() {
            return Err(ScheduleError::FenceViolation {
                line_id,
                fence,
                operation: "add".to_string(),
            });
        }

        let pos = ledger.add_line(input, &grid, line_id.clone())?;
        let mut outcome = MutationOutcome::for_line(&line_id);

        if fence == FenceState::Slushy {
            ledger.flag_reapproval(&line_id)?;
            outcome.reapproval_flagged.push(line_id.clone());
        }

        outcome.balance_changes = ledger.recompute_product(&pos.product_id, pos.index, &grid)?;
        outcome.safety_stock_warnings = product_warnings(ledger, &pos.product_id);
        Ok(outcome)
    }

    /// 新增或修改 (按 产品+周期 匹配), 用于批量导入
    pub fn upsert_line(&mut self, input: LineInput, today: NaiveDate) -> ScheduleResult<MutationOutcome> {
        let existing = self
            .ledger
            .product_lines(&input.product_id)
            .iter()
            .enumerate()
            .find(|(_, l)| l.period_date == input.period_date)
            .map(|(index, l)| (index, l.line_id.clone()));

        match existing {
            Some((index, line_id)) => {
                let update = LineUpdate {
                    forecast_qty: Some(input.forecast_qty),
                    customer_order_qty: Some(input.customer_order_qty),
                    dependent_demand: Some(input.dependent_demand),
                    planned_production_qty: Some(input.planned_production_qty),
                    // 未提供期初库存 (0) 时保留原值
                    beginning_inventory: (index == 0 && input.beginning_inventory > 0.0)
                        .then_some(input.beginning_inventory),
                    safety_stock: Some(input.safety_stock),
                };
                self.update_line(&line_id, update, today)
            }
            None => self.add_line(input, today),
        }
    }

    /// 为产品补齐计划期间内所有缺失周期
    ///
    /// template 的 product_id / period_date 被忽略; 期初库存只用于产品第一期.
    #[instrument(skip(self, template), fields(schedule_id = %self.header.schedule_id))]
    pub fn generate_product_lines(
        &mut self,
        product_id: &str,
        template: &LineInput,
        today: NaiveDate,
    ) -> ScheduleResult<MutationOutcome> {
        lifecycle::ensure_lines_mutable(self.header.status, "generate_lines")?;

        let grid = self.grid();
        let existing: Vec<NaiveDate> = self
            .ledger
            .product_lines(product_id)
            .iter()
            .map(|l| l.period_date)
            .collect();

        let (before, after): (Vec<NaiveDate>, Vec<NaiveDate>) = match (existing.first(), existing.last()) {
            (Some(first), Some(last)) => (
                grid.buckets().into_iter().filter(|d| d < first).rev().collect(),
                grid.buckets().into_iter().filter(|d| d > last).collect(),
            ),
            _ => (Vec::new(), grid.buckets()),
        };

        let mut ledger = self.ledger.clone();
        let mut outcome = MutationOutcome::default();
        let mut generated = 0usize;

        for date in after.into_iter().chain(before) {
            let mut input = template.clone();
            input.product_id = product_id.to_string();
            input.period_date = date;
            // 前插时由台账沿用原首期期初; 非首期的期初由重算推导
            if ledger
                .product_lines(product_id)
                .first()
                .is_some_and(|first| date < first.period_date)
            {
                input.beginning_inventory = 0.0;
            }
            outcome.merge(self.add_into(&mut ledger, &input, today)?);
            generated += 1;
        }

        outcome.affected_line_id = None;
        self.ledger = ledger;

        info!(product_id, generated, "补齐产品周期");
        self.log_warnings(&outcome);
        Ok(outcome)
    }

    /// 修改计划行 (冻结区拒绝)
    #[instrument(skip(self, update), fields(schedule_id = %self.header.schedule_id))]
    pub fn update_line(
        &mut self,
        line_id: &str,
        update: LineUpdate,
        today: NaiveDate,
    ) -> ScheduleResult<MutationOutcome> {
        lifecycle::ensure_lines_mutable(self.header.status, "update_line")?;

        let grid = self.grid();
        let mut ledger = self.ledger.clone();
        let (pos, fence) = ledger.update_line(line_id, &update, &self.classifier(), today)?;

        let mut outcome = MutationOutcome::for_line(line_id);
        if fence == FenceState::Slushy {
            outcome.reapproval_flagged.push(line_id.to_string());
        }
        outcome.balance_changes = ledger.recompute_product(&pos.product_id, pos.index, &grid)?;
        outcome.safety_stock_warnings = product_warnings(&ledger, &pos.product_id);
        self.ledger = ledger;

        info!(%fence, changes = outcome.balance_changes.len(), "修改计划行");
        self.log_warnings(&outcome);
        Ok(outcome)
    }

    /// 删除计划行 (仅自由区、无实绩)
    #[instrument(skip(self), fields(schedule_id = %self.header.schedule_id))]
    pub fn remove_line(&mut self, line_id: &str, today: NaiveDate) -> ScheduleResult<MutationOutcome> {
        lifecycle::ensure_lines_mutable(self.header.status, "remove_line")?;

        let grid = self.grid();
        let mut ledger = self.ledger.clone();
        let (pos, _removed) = ledger.remove_line(line_id, &self.classifier(), today)?;

        // 删除首行后从头重算; 删除末行后仅需刷新覆盖它的 ATP 窗口
        let start = if pos.index == 0 { 0 } else { pos.index - 1 };
        let mut outcome = MutationOutcome::for_line(line_id);
        outcome.balance_changes = ledger.recompute_product(&pos.product_id, start, &grid)?;
        outcome.safety_stock_warnings = product_warnings(&ledger, &pos.product_id);
        self.ledger = ledger;

        info!(changes = outcome.balance_changes.len(), "删除计划行");
        Ok(outcome)
    }

    /// 记录实绩 (不受围栏限制, 不触发余额重算)
    pub fn record_actuals(
        &mut self,
        line_id: &str,
        produced_qty: f64,
        sold_qty: f64,
    ) -> ScheduleResult<MutationOutcome> {
        lifecycle::ensure_lines_mutable(self.header.status, "record_actuals")?;

        self.ledger.record_actuals(line_id, produced_qty, sold_qty)?;
        debug!(
            schedule_id = %self.header.schedule_id,
            line_id,
            produced_qty,
            sold_qty,
            "记录实绩"
        );
        Ok(MutationOutcome::for_line(line_id))
    }

    // ==========================================
    // 生命周期
    // ==========================================

    fn transition(&mut self, transition: Transition) -> ScheduleResult<ScheduleStatus> {
        let from = self.header.status;
        let to = lifecycle::next_status(from, transition)?;
        self.header.status = to;
        info!(schedule_id = %self.header.schedule_id, %from, %to, "计划状态变更");
        Ok(to)
    }

    pub fn submit(&mut self) -> ScheduleResult<ScheduleStatus> {
        self.transition(Transition::Submit)
    }

    /// 审批: 记录审批人与时间, 清除待重新审批标志
    pub fn approve(&mut self, approver_id: &str, approved_at: NaiveDateTime) -> ScheduleResult<ScheduleStatus> {
        if approver_id.trim().is_empty() {
            return Err(ScheduleError::validation("审批人不能为空"));
        }
        let status = self.transition(Transition::Approve)?;
        self.header.approved_by = Some(approver_id.to_string());
        self.header.approval_date = Some(approved_at);
        let cleared = self.ledger.clear_reapproval_flags();
        debug!(cleared, "清除待重新审批标志");
        Ok(status)
    }

    pub fn activate(&mut self) -> ScheduleResult<ScheduleStatus> {
        self.transition(Transition::Activate)
    }

    pub fn cancel(&mut self) -> ScheduleResult<ScheduleStatus> {
        self.transition(Transition::Cancel)
    }

    fn log_warnings(&self, outcome: &MutationOutcome) {
        for w in &outcome.safety_stock_warnings {
            warn!(
                schedule_id = %self.header.schedule_id,
                product_id = %w.product_id,
                period = %w.period_date,
                pab = w.projected_available_balance,
                safety_stock = w.safety_stock,
                "PAB 低于安全库存"
            );
        }
    }
}

fn validate_fences(fences: &PlanningFences, horizon_days: i64) -> ScheduleResult<()> {
    if fences.frozen_days < 0 || fences.slushy_days < 0 || fences.free_days < 0 {
        return Err(ScheduleError::validation(format!(
            "围栏天数不能为负: {:?}",
            fences
        )));
    }
    if fences.total_days() > horizon_days {
        return Err(ScheduleError::validation(format!(
            "围栏总天数 {} 超过计划期间 {} 天",
            fences.total_days(),
            horizon_days
        )));
    }
    Ok(())
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

fn product_warnings(ledger: &ScheduleLedger, product_id: &str) -> Vec<SafetyStockWarning> {
    ledger
        .product_lines(product_id)
        .iter()
        .filter(|l| l.is_below_safety_stock())
        .map(SafetyStockWarning::from_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::balance::BalanceCalculator;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ts() -> NaiveDateTime {
        d(2026, 6, 20).and_hms_opt(9, 0, 0).unwrap()
    }

    /// 月计划 2026-07 ~ 2026-10, 冻结 30 天, 半冻结 30 天
    fn monthly_schedule() -> ScheduleAggregate {
        ScheduleAggregate::create(
            NewSchedule {
                schedule_id: "S1".into(),
                schedule_number: "MPS-202607-0001".into(),
                name: "三季度主计划".into(),
                description: Some("含新品导入".into()),
                period_start: d(2026, 7, 1),
                period_end: d(2026, 10, 31),
                period_type: PeriodType::Monthly,
                fences: PlanningFences::new(30, 30, 0),
                created_by: "planner".into(),
            },
            ts(),
        )
        .unwrap()
    }

    fn with_four_periods() -> (ScheduleAggregate, Vec<String>) {
        let mut agg = monthly_schedule();
        let mut ids = Vec::new();
        for (i, date) in [d(2026, 7, 1), d(2026, 8, 1), d(2026, 9, 1), d(2026, 10, 1)]
            .into_iter()
            .enumerate()
        {
            let mut input = LineInput::new("P1", date, 30.0, 20.0, 50.0);
            if i == 0 {
                input = input.with_beginning_inventory(100.0);
            }
            let outcome = agg.add_line(input, d(2026, 7, 1)).unwrap();
            ids.push(outcome.affected_line_id.unwrap());
        }
        (agg, ids)
    }

    #[test]
    fn test_create_validates_horizon_and_fences() {
        let mut new = NewSchedule {
            schedule_id: "S1".into(),
            schedule_number: "MPS-1".into(),
            name: "x".into(),
            description: None,
            period_start: d(2026, 7, 1),
            period_end: d(2026, 7, 1),
            period_type: PeriodType::Weekly,
            fences: PlanningFences::default(),
            created_by: "planner".into(),
        };
        assert!(matches!(
            ScheduleAggregate::create(new.clone(), ts()),
            Err(ScheduleError::ValidationError(_))
        ));

        new.period_end = d(2026, 7, 31);
        new.fences = PlanningFences::new(20, 20, 0);
        assert!(matches!(
            ScheduleAggregate::create(new.clone(), ts()),
            Err(ScheduleError::ValidationError(_))
        ));

        new.fences = PlanningFences::new(7, -1, 0);
        assert!(ScheduleAggregate::create(new.clone(), ts()).is_err());

        new.fences = PlanningFences::new(7, 7, 16);
        let agg = ScheduleAggregate::create(new, ts()).unwrap();
        assert_eq!(agg.status(), ScheduleStatus::Draft);
        assert_eq!(agg.header().revision, 0);
        assert!(agg.lines().next().is_none());
    }

    #[test]
    fn test_monthly_fences_scenario() {
        let (mut agg, ids) = with_four_periods();
        let today = d(2026, 7, 1);

        let fences: Vec<FenceState> = ids.iter().map(|id| agg.fence_of(id, today).unwrap()).collect();
        assert_eq!(
            fences,
            vec![FenceState::Frozen, FenceState::Slushy, FenceState::Free, FenceState::Free]
        );

        let update = LineUpdate {
            planned_production_qty: Some(80.0),
            ..Default::default()
        };
        let before = agg.clone();
        let err = agg.update_line(&ids[0], update.clone(), today).unwrap_err();
        assert!(matches!(err, ScheduleError::FenceViolation { fence: FenceState::Frozen, .. }));
        assert_eq!(agg, before);

        let outcome = agg.update_line(&ids[2], update, today).unwrap();
        assert!(outcome.reapproval_flagged.is_empty());
        assert_eq!(agg.line(&ids[2]).unwrap().planned_production_qty, 80.0);
    }

    #[test]
    fn test_balance_chain_scenario() {
        let mut agg = monthly_schedule();
        let today = d(2026, 6, 1);
        let first = agg
            .add_line(
                LineInput::new("P1", d(2026, 7, 1), 30.0, 40.0, 50.0).with_beginning_inventory(100.0),
                today,
            )
            .unwrap();
        let second = agg
            .add_line(LineInput::new("P1", d(2026, 8, 1), 60.0, 20.0, 0.0), today)
            .unwrap();

        let lines = agg.product_lines("P1");
        assert_eq!(lines[0].gross_demand(), 40.0);
        assert_eq!(lines[0].projected_available_balance, 110.0);
        assert_eq!(lines[1].beginning_inventory, 110.0);
        assert_eq!(lines[1].gross_demand(), 60.0);
        assert_eq!(lines[1].projected_available_balance, 50.0);

        assert_eq!(first.balance_changes.len(), 1);
        // 第2期无入库, 不发布 ATP; 第1期 ATP 窗口扩展到第2期的客户订单
        assert_eq!(lines[1].available_to_promise, None);
        assert_eq!(lines[0].available_to_promise, Some(90.0));
        assert!(second.balance_changes.iter().any(|c| c.line_id == lines[0].line_id));
    }

    #[test]
    fn test_submit_locks_header() {
        let mut agg = monthly_schedule();
        assert_eq!(agg.submit().unwrap(), ScheduleStatus::Submitted);

        assert!(matches!(
            agg.update_header(Some("改名".into()), None, None),
            Err(ScheduleError::InvalidState { status: ScheduleStatus::Submitted, .. })
        ));
        assert!(matches!(
            agg.set_planning_fences(PlanningFences::new(1, 1, 1)),
            Err(ScheduleError::InvalidState { .. })
        ));
        assert_eq!(agg.header().name, "三季度主计划");
    }

    #[test]
    fn test_active_schedule_cannot_be_cancelled_or_deleted() {
        let mut agg = monthly_schedule();
        agg.submit().unwrap();
        agg.approve("manager", ts()).unwrap();
        agg.activate().unwrap();

        assert!(matches!(agg.cancel(), Err(ScheduleError::InvalidTransition { .. })));
        assert_eq!(agg.status(), ScheduleStatus::Active);
        assert!(matches!(
            agg.ensure_deletable(),
            Err(ScheduleError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_slushy_edit_flags_reapproval_until_approved() {
        let (mut agg, ids) = with_four_periods();
        agg.submit().unwrap();

        let update = LineUpdate {
            forecast_qty: Some(45.0),
            ..Default::default()
        };
        let outcome = agg.update_line(&ids[1], update, d(2026, 7, 1)).unwrap();
        assert_eq!(outcome.reapproval_flagged, vec![ids[1].clone()]);
        assert_eq!(agg.lines_pending_reapproval().len(), 1);

        agg.approve("manager", ts()).unwrap();
        assert!(agg.lines_pending_reapproval().is_empty());
        assert_eq!(agg.header().approved_by.as_deref(), Some("manager"));
        assert_eq!(agg.header().approval_date, Some(ts()));
    }

    #[test]
    fn test_add_after_submit_obeys_fences() {
        let mut agg = monthly_schedule();
        agg.submit().unwrap();
        let today = d(2026, 7, 1);

        let err = agg
            .add_line(LineInput::new("P2", d(2026, 7, 1), 1.0, 1.0, 1.0), today)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::FenceViolation { .. }));

        let outcome = agg
            .add_line(LineInput::new("P2", d(2026, 8, 1), 1.0, 1.0, 1.0), today)
            .unwrap();
        assert_eq!(outcome.reapproval_flagged.len(), 1);
    }

    #[test]
    fn test_cancelled_schedule_rejects_line_mutations() {
        let (mut agg, ids) = with_four_periods();
        agg.cancel().unwrap();
        assert!(matches!(
            agg.record_actuals(&ids[0], 1.0, 1.0),
            Err(ScheduleError::InvalidState { .. })
        ));
        assert!(agg.ensure_deletable().is_ok());
    }

    #[test]
    fn test_remove_last_period_refreshes_atp_window() {
        let (mut agg, ids) = with_four_periods();
        let today = d(2026, 7, 1);

        let update = LineUpdate {
            planned_production_qty: Some(0.0),
            ..Default::default()
        };
        agg.update_line(&ids[3], update, today).unwrap();
        let atp_before = agg.line(&ids[2]).unwrap().available_to_promise;

        agg.remove_line(&ids[3], today).unwrap();
        assert_eq!(agg.product_lines("P1").len(), 3);
        // 第3期 ATP 窗口不再包含第4期客户订单
        let atp_after = agg.line(&ids[2]).unwrap().available_to_promise;
        assert!(atp_after > atp_before);

        let err = agg.remove_line(&ids[0], today).unwrap_err();
        assert!(matches!(err, ScheduleError::FenceViolation { .. }));
    }

    #[test]
    fn test_generate_product_lines_fills_horizon() {
        let mut agg = monthly_schedule();
        let today = d(2026, 6, 1);
        agg.add_line(LineInput::new("P1", d(2026, 8, 1), 10.0, 0.0, 0.0), today)
            .unwrap();

        let template = LineInput::new("ignored", d(2000, 1, 1), 10.0, 5.0, 20.0)
            .with_beginning_inventory(999.0);
        agg.generate_product_lines("P1", &template, today).unwrap();

        let lines = agg.product_lines("P1");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].period_date, d(2026, 7, 1));
        assert_eq!(lines[3].period_date, d(2026, 10, 1));
        assert_eq!(
            lines.iter().map(|l| l.period_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        // 原首期期初为 0, 前插的新首期沿用
        assert_eq!(lines[0].beginning_inventory, 0.0);
    }

    #[test]
    fn test_summary_totals_production_variance() {
        let (mut agg, ids) = with_four_periods();
        agg.record_actuals(&ids[0], 45.0, 20.0).unwrap();
        agg.record_actuals(&ids[1], 60.0, 15.0).unwrap();

        let summary = agg.summary();
        // 计划 4 × 50 = 200, 实际 105
        assert_eq!(summary[0].total_planned_production, 200.0);
        assert_eq!(summary[0].total_actual_production, 105.0);
        assert_eq!(summary[0].total_variance, 95.0);
    }

    #[test]
    fn test_upsert_updates_existing_period() {
        let (mut agg, ids) = with_four_periods();
        let today = d(2026, 6, 1);
        agg.upsert_line(LineInput::new("P1", d(2026, 9, 1), 1.0, 2.0, 3.0), today)
            .unwrap();
        let line = agg.line(&ids[2]).unwrap();
        assert_eq!(line.customer_order_qty, 2.0);
        assert_eq!(agg.product_lines("P1").len(), 4);
    }

    /// 订单每期 10, 仅第1期入库 50
    fn single_receipt_schedule(today: NaiveDate) -> (ScheduleAggregate, Vec<String>) {
        let mut agg = monthly_schedule();
        let mut ids = Vec::new();
        for (i, date) in [d(2026, 7, 1), d(2026, 8, 1), d(2026, 9, 1), d(2026, 10, 1)]
            .into_iter()
            .enumerate()
        {
            let planned = if i == 0 { 50.0 } else { 0.0 };
            let outcome = agg
                .add_line(LineInput::new("P1", date, 0.0, 10.0, planned), today)
                .unwrap();
            ids.push(outcome.affected_line_id.unwrap());
        }
        (agg, ids)
    }

    fn stored_vs_full_pass(agg: &ScheduleAggregate) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
        let lines = agg.product_lines("P1");
        let full = BalanceCalculator::new().project(lines).unwrap();
        (
            lines.iter().map(|l| l.available_to_promise).collect(),
            full.iter().map(|b| b.available_to_promise).collect(),
        )
    }

    #[test]
    fn test_mid_sequence_receipt_refreshes_earlier_atp() {
        let today = d(2026, 6, 1);
        let (mut agg, ids) = single_receipt_schedule(today);
        assert_eq!(agg.line(&ids[0]).unwrap().available_to_promise, Some(10.0));

        let update = LineUpdate {
            planned_production_qty: Some(20.0),
            ..Default::default()
        };
        let outcome = agg.update_line(&ids[2], update, today).unwrap();
        assert!(outcome.balance_changes.iter().any(|c| c.line_id == ids[0]));

        let (stored, full) = stored_vs_full_pass(&agg);
        assert_eq!(stored, full);
        assert_eq!(stored, vec![Some(30.0), None, Some(30.0), None]);

        // 撤销入库后第1期窗口重新覆盖到期末
        let update = LineUpdate {
            planned_production_qty: Some(0.0),
            ..Default::default()
        };
        agg.update_line(&ids[2], update, today).unwrap();
        let (stored, full) = stored_vs_full_pass(&agg);
        assert_eq!(stored, full);
        assert_eq!(stored, vec![Some(10.0), None, None, None]);
    }

    #[test]
    fn test_order_change_inside_window_refreshes_anchor() {
        let today = d(2026, 6, 1);
        let (mut agg, ids) = single_receipt_schedule(today);

        let update = LineUpdate {
            customer_order_qty: Some(25.0),
            ..Default::default()
        };
        agg.update_line(&ids[3], update, today).unwrap();

        let (stored, full) = stored_vs_full_pass(&agg);
        assert_eq!(stored, full);
        assert_eq!(stored[0], Some(0.0));
    }

    #[test]
    fn test_prepend_keeps_beginning_inventory() {
        let mut agg = monthly_schedule();
        let today = d(2026, 6, 1);
        agg.add_line(
            LineInput::new("P1", d(2026, 8, 1), 30.0, 0.0, 0.0).with_beginning_inventory(100.0),
            today,
        )
        .unwrap();
        agg.add_line(LineInput::new("P1", d(2026, 7, 1), 20.0, 0.0, 0.0), today)
            .unwrap();

        let lines = agg.product_lines("P1");
        assert_eq!(lines[0].period_date, d(2026, 7, 1));
        assert_eq!(lines[0].beginning_inventory, 100.0);
        assert_eq!(lines[0].projected_available_balance, 80.0);
        assert_eq!(lines[1].beginning_inventory, 80.0);
        assert_eq!(lines[1].projected_available_balance, 50.0);
    }

    #[test]
    fn test_atp_at_uses_governing_receipt_period() {
        let today = d(2026, 6, 1);
        let (mut agg, ids) = single_receipt_schedule(today);
        let update = LineUpdate {
            planned_production_qty: Some(20.0),
            ..Default::default()
        };
        agg.update_line(&ids[2], update, today).unwrap();

        assert_eq!(agg.atp_at("P1", d(2026, 7, 15)), Some(30.0));
        assert_eq!(agg.atp_at("P1", d(2026, 8, 31)), Some(30.0));
        assert_eq!(agg.atp_at("P1", d(2026, 10, 20)), Some(30.0));
        assert_eq!(agg.atp_at("P1", d(2026, 9, 1)), agg.line(&ids[2]).unwrap().available_to_promise);

        assert_eq!(agg.atp_at("P1", d(2026, 6, 30)), None);
        assert_eq!(agg.atp_at("P1", d(2026, 11, 1)), None);
        assert_eq!(agg.atp_at("P9", d(2026, 7, 1)), None);
    }

    #[test]
    fn test_header_description() {
        let mut agg = monthly_schedule();
        assert_eq!(agg.header().description.as_deref(), Some("含新品导入"));

        agg.update_header(None, Some("  ".into()), None).unwrap();
        assert_eq!(agg.header().description, None);
        agg.update_header(None, Some("按周复核".into()), None).unwrap();
        assert_eq!(agg.header().description.as_deref(), Some("按周复核"));
        agg.update_header(Some("新名称".into()), None, None).unwrap();
        assert_eq!(agg.header().description.as_deref(), Some("按周复核"));
    }

    #[test]
    fn test_summary_and_warnings() {
        let mut agg = monthly_schedule();
        let today = d(2026, 6, 1);
        agg.add_line(
            LineInput::new("P1", d(2026, 7, 1), 50.0, 0.0, 0.0)
                .with_beginning_inventory(60.0)
                .with_safety_stock(20.0),
            today,
        )
        .unwrap();
        let outcome = agg
            .add_line(
                LineInput::new("P1", d(2026, 8, 1), 0.0, 0.0, 0.0).with_safety_stock(20.0),
                today,
            )
            .unwrap();
        assert_eq!(outcome.safety_stock_warnings.len(), 2);

        let summary = agg.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].period_count, 2);
        assert_eq!(summary[0].ending_balance, 10.0);
        assert_eq!(summary[0].below_safety_stock_periods, 2);
        assert_eq!(summary[0].total_variance, 0.0);
        assert_eq!(agg.safety_stock_warnings()[0].shortfall, 10.0);
    }
}
