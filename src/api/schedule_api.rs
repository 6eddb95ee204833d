// ==========================================
// 主生产计划引擎 - 主生产计划 API
// ==========================================
// 职责: 命令入口. 每条命令: 加载 → 聚合修改 → 乐观锁保存 → 审计日志
// 约定: 参考日期 (now) 与操作人均由调用方传入
// ==========================================

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::action_log::ActionLog;
use crate::domain::schedule::{
    LineFilter, LineInput, LineUpdate, MasterSchedule, PlanningFences, ProductSummary,
    ScheduleLine,
};
use crate::domain::types::{PeriodType, ScheduleAction, ScheduleStatus};
use crate::engine::{MutationOutcome, NewSchedule, SafetyStockWarning, ScheduleAggregate};
use crate::importer::ForecastImporter;
use crate::repository::{ActionLogRepository, ScheduleRepository};

// ==========================================
// 请求 / 响应
// ==========================================

/// 新建计划请求 (周期类型/围栏缺省时取配置默认值)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
    #[serde(default)]
    pub fences: Option<PlanningFences>,
}

/// 计划完整视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleView {
    pub header: MasterSchedule,
    pub lines: Vec<ScheduleLine>,
    pub summary: Vec<ProductSummary>,
    pub safety_stock_warnings: Vec<SafetyStockWarning>,
    pub pending_reapproval: Vec<String>,
}

impl From<&ScheduleAggregate> for ScheduleView {
    fn from(agg: &ScheduleAggregate) -> Self {
        Self {
            header: agg.header().clone(),
            lines: agg.lines().cloned().collect(),
            summary: agg.summary(),
            safety_stock_warnings: agg.safety_stock_warnings(),
            pending_reapproval: agg
                .lines_pending_reapproval()
                .into_iter()
                .map(|l| l.line_id.clone())
                .collect(),
        }
    }
}

/// 命令响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub schedule: ScheduleView,
    pub outcome: MutationOutcome,
}

/// 导入响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportForecastResponse {
    pub schedule: ScheduleView,
    pub outcome: MutationOutcome,
    pub added: usize,
    pub updated: usize,
}

// ==========================================
// ScheduleApi
// ==========================================
pub struct ScheduleApi {
    schedule_repo: Arc<ScheduleRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
    importer: ForecastImporter,
}

impl ScheduleApi {
    /// 创建新的ScheduleApi实例
    pub fn new(
        schedule_repo: Arc<ScheduleRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            schedule_repo,
            action_log_repo,
            config_manager,
            importer: ForecastImporter::new(),
        }
    }

    // ==========================================
    // 内部: 加载 / 提交
    // ==========================================

    fn load(&self, schedule_id: &str) -> ApiResult<ScheduleAggregate> {
        let (header, lines) = self
            .schedule_repo
            .load(schedule_id)?
            .ok_or_else(|| ApiError::NotFound(format!("MasterSchedule(id={})不存在", schedule_id)))?;
        Ok(ScheduleAggregate::restore(header, lines)?)
    }

    /// 加载 → 修改 → 保存 (带 revision 检查) → 审计
    ///
    /// mutate 返回错误时不写库, 已加载的副本直接丢弃.
    fn commit<F>(
        &self,
        schedule_id: &str,
        action: ScheduleAction,
        actor: &str,
        now: NaiveDateTime,
        payload: JsonValue,
        mutate: F,
    ) -> ApiResult<CommandResponse>
    where
        F: FnOnce(&mut ScheduleAggregate) -> ApiResult<MutationOutcome>,
    {
        require_actor(actor)?;

        let mut agg = self.load(schedule_id)?;
        let outcome = mutate(&mut agg)?;

        let log = ActionLog::new(Some(schedule_id.to_string()), action, actor, now)
            .with_payload(payload)
            .with_impact(to_json(&outcome)?);
        let revision = self.schedule_repo.save(agg.header(), agg.lines(), &log)?;
        agg.mark_persisted(revision);

        info!(
            schedule_id,
            action = %action,
            actor,
            revision,
            balance_changes = outcome.balance_changes.len(),
            "命令已提交"
        );

        Ok(CommandResponse {
            schedule: ScheduleView::from(&agg),
            outcome,
        })
    }

    // ==========================================
    // 表头与生命周期
    // ==========================================

    /// 新建计划 (草稿)
    pub fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        require_actor(actor)?;

        let defaults = self
            .config_manager
            .get_planning_defaults()
            .map_err(|e| ApiError::InternalError(format!("读取计划默认参数失败: {}", e)))?;
        let config_snapshot = self
            .config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::InternalError(format!("读取配置快照失败: {}", e)))?;

        let schedule_number = self
            .schedule_repo
            .next_schedule_number(&defaults.schedule_number_prefix, now.date())?;

        let agg = ScheduleAggregate::create(
            NewSchedule {
                schedule_id: uuid::Uuid::new_v4().to_string(),
                schedule_number,
                name: request.name.clone(),
                description: request.description.clone(),
                period_start: request.period_start,
                period_end: request.period_end,
                period_type: request.period_type.unwrap_or(defaults.period_type),
                fences: request.fences.unwrap_or(defaults.fences),
                created_by: actor.to_string(),
            },
            now,
        )?;

        let log = ActionLog::new(
            Some(agg.schedule_id().to_string()),
            ScheduleAction::CreateSchedule,
            actor,
            now,
        )
        .with_payload(json!({
            "request": request,
            "config_snapshot": config_snapshot,
        }))
        .with_detail(format!("新建计划 {}", agg.header().schedule_number));
        self.schedule_repo.create(agg.header(), &log)?;

        info!(
            schedule_id = %agg.schedule_id(),
            schedule_number = %agg.header().schedule_number,
            actor,
            "计划已创建"
        );

        Ok(CommandResponse {
            schedule: ScheduleView::from(&agg),
            outcome: MutationOutcome::default(),
        })
    }

    /// 设置计划围栏 (仅草稿)
    pub fn set_planning_fences(
        &self,
        schedule_id: &str,
        fences: PlanningFences,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        self.commit(
            schedule_id,
            ScheduleAction::SetPlanningFences,
            actor,
            now,
            json!({ "fences": fences }),
            |agg| {
                agg.set_planning_fences(fences)?;
                Ok(MutationOutcome::default())
            },
        )
    }

    /// 修改名称 / 说明 / 期间结束日 (仅草稿)
    pub fn update_header(
        &self,
        schedule_id: &str,
        name: Option<String>,
        description: Option<String>,
        period_end: Option<NaiveDate>,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        let payload = json!({ "name": name, "description": description, "period_end": period_end });
        self.commit(
            schedule_id,
            ScheduleAction::UpdateHeader,
            actor,
            now,
            payload,
            |agg| {
                agg.update_header(name, description, period_end)?;
                Ok(MutationOutcome::default())
            },
        )
    }

    pub fn submit(&self, schedule_id: &str, actor: &str, now: NaiveDateTime) -> ApiResult<CommandResponse> {
        self.commit(schedule_id, ScheduleAction::Submit, actor, now, json!({}), |agg| {
            agg.submit()?;
            Ok(MutationOutcome::default())
        })
    }

    /// 审批 (审批人即操作人, 审批时间取 now)
    pub fn approve(&self, schedule_id: &str, approver_id: &str, now: NaiveDateTime) -> ApiResult<CommandResponse> {
        self.commit(
            schedule_id,
            ScheduleAction::Approve,
            approver_id,
            now,
            json!({ "approver_id": approver_id }),
            |agg| {
                agg.approve(approver_id, now)?;
                Ok(MutationOutcome::default())
            },
        )
    }

    pub fn activate(&self, schedule_id: &str, actor: &str, now: NaiveDateTime) -> ApiResult<CommandResponse> {
        self.commit(schedule_id, ScheduleAction::Activate, actor, now, json!({}), |agg| {
            agg.activate()?;
            Ok(MutationOutcome::default())
        })
    }

    pub fn cancel(&self, schedule_id: &str, actor: &str, now: NaiveDateTime) -> ApiResult<CommandResponse> {
        self.commit(schedule_id, ScheduleAction::Cancel, actor, now, json!({}), |agg| {
            agg.cancel()?;
            Ok(MutationOutcome::default())
        })
    }

    /// 删除整张计划 (执行中的计划不可删除)
    pub fn delete_schedule(&self, schedule_id: &str, actor: &str, now: NaiveDateTime) -> ApiResult<()> {
        require_actor(actor)?;

        let agg = self.load(schedule_id)?;
        agg.ensure_deletable()?;

        let header = agg.header();
        let log = ActionLog::new(Some(schedule_id.to_string()), ScheduleAction::DeleteSchedule, actor, now)
            .with_payload(json!({
                "schedule_number": header.schedule_number,
                "status": header.status,
                "line_count": agg.lines().count(),
            }))
            .with_detail(format!("删除计划 {}", header.schedule_number));
        self.schedule_repo.delete(schedule_id, header.revision, &log)?;

        warn!(schedule_id, schedule_number = %header.schedule_number, actor, "计划已删除");
        Ok(())
    }

    // ==========================================
    // 计划行
    // ==========================================

    pub fn add_line(
        &self,
        schedule_id: &str,
        input: LineInput,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        let payload = to_json(&input)?;
        self.commit(schedule_id, ScheduleAction::AddLine, actor, now, payload, |agg| {
            Ok(agg.add_line(input, now.date())?)
        })
    }

    /// 为产品补齐计划期间内缺失的周期
    pub fn generate_product_lines(
        &self,
        schedule_id: &str,
        product_id: &str,
        template: LineInput,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        let payload = json!({ "product_id": product_id, "template": template });
        self.commit(schedule_id, ScheduleAction::GenerateLines, actor, now, payload, |agg| {
            Ok(agg.generate_product_lines(product_id, &template, now.date())?)
        })
    }

    pub fn update_line(
        &self,
        schedule_id: &str,
        line_id: &str,
        update: LineUpdate,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        let payload = json!({ "line_id": line_id, "update": update });
        self.commit(schedule_id, ScheduleAction::UpdateLine, actor, now, payload, |agg| {
            Ok(agg.update_line(line_id, update, now.date())?)
        })
    }

    pub fn remove_line(
        &self,
        schedule_id: &str,
        line_id: &str,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        self.commit(
            schedule_id,
            ScheduleAction::RemoveLine,
            actor,
            now,
            json!({ "line_id": line_id }),
            |agg| Ok(agg.remove_line(line_id, now.date())?),
        )
    }

    pub fn record_actuals(
        &self,
        schedule_id: &str,
        line_id: &str,
        produced_qty: f64,
        sold_qty: f64,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<CommandResponse> {
        let payload = json!({
            "line_id": line_id,
            "produced_qty": produced_qty,
            "sold_qty": sold_qty,
        });
        self.commit(schedule_id, ScheduleAction::RecordActuals, actor, now, payload, |agg| {
            Ok(agg.record_actuals(line_id, produced_qty, sold_qty)?)
        })
    }

    /// 导入需求预测文件 (整批原子: 任一行失败则全部不生效)
    pub fn import_forecast<P: AsRef<Path>>(
        &self,
        schedule_id: &str,
        file_path: P,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<ImportForecastResponse> {
        let path = file_path.as_ref();
        let rows = self.importer.read_file(path)?;
        let total = rows.len();

        let mut added = 0usize;
        let mut updated = 0usize;
        let payload = json!({ "file": path.display().to_string(), "rows": total });

        let response = self.commit(
            schedule_id,
            ScheduleAction::ImportForecast,
            actor,
            now,
            payload,
            |agg| {
                // 早于产品现有首期的行需由近及远逐期前插, 其余按周期顺序追加或覆盖
                let (prepend, rest): (Vec<_>, Vec<_>) = rows.into_iter().partition(|row| {
                    agg.product_lines(&row.input.product_id)
                        .first()
                        .is_some_and(|first| row.input.period_date < first.period_date)
                });

                let mut outcome = MutationOutcome::default();
                for row in prepend.into_iter().rev().chain(rest) {
                    let exists = agg
                        .product_lines(&row.input.product_id)
                        .iter()
                        .any(|l| l.period_date == row.input.period_date);

                    let step = agg.upsert_line(row.input, now.date()).map_err(|e| {
                        ApiError::ImportRowRejected {
                            row: row.row_number,
                            reason: e.to_string(),
                        }
                    })?;
                    outcome.merge(step);

                    if exists {
                        updated += 1;
                    } else {
                        added += 1;
                    }
                }
                outcome.affected_line_id = None;
                Ok(outcome)
            },
        )?;

        info!(schedule_id, total, added, updated, "需求预测导入完成");

        Ok(ImportForecastResponse {
            schedule: response.schedule,
            outcome: response.outcome,
            added,
            updated,
        })
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_schedule(&self, schedule_id: &str) -> ApiResult<ScheduleView> {
        Ok(ScheduleView::from(&self.load(schedule_id)?))
    }

    pub fn get_schedule_by_number(&self, schedule_number: &str) -> ApiResult<ScheduleView> {
        let header = self
            .schedule_repo
            .find_by_number(schedule_number)?
            .ok_or_else(|| ApiError::NotFound(format!("计划编号{}不存在", schedule_number)))?;
        self.get_schedule(&header.schedule_id)
    }

    /// 按产品 / 周期区间查询计划行
    pub fn list_lines(&self, schedule_id: &str, filter: &LineFilter) -> ApiResult<Vec<ScheduleLine>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(ApiError::InvalidInput(format!("查询区间无效: {} > {}", from, to)));
            }
        }
        if self.schedule_repo.find_by_id(schedule_id)?.is_none() {
            return Err(ApiError::NotFound(format!("MasterSchedule(id={})不存在", schedule_id)));
        }
        Ok(self.schedule_repo.find_lines(schedule_id, filter)?)
    }

    /// 产品在某日的可承诺量 (无覆盖周期时为 None)
    pub fn atp_at(&self, schedule_id: &str, product_id: &str, date: NaiveDate) -> ApiResult<Option<f64>> {
        Ok(self.load(schedule_id)?.atp_at(product_id, date))
    }

    pub fn list_schedules(&self, status: Option<ScheduleStatus>) -> ApiResult<Vec<MasterSchedule>> {
        Ok(self.schedule_repo.list(status)?)
    }

    /// 计划的操作日志 (新→旧)
    pub fn list_actions(&self, schedule_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self.action_log_repo.find_by_schedule_id(schedule_id)?)
    }
}

fn require_actor(actor: &str) -> ApiResult<()> {
    if actor.trim().is_empty() {
        return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> ApiResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| ApiError::InternalError(format!("JSON 序列化失败: {}", e)))
}
