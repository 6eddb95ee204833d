// ==========================================
// 主生产计划引擎 - 计划领域模型
// ==========================================
// 职责: MasterSchedule(聚合根表头) / ScheduleLine(计划行) / 输入值对象
// 红线: 围栏状态不存储在计划行上 (随参考日期变化, 落库必然过期)
// ==========================================

use crate::domain::types::{PeriodType, ScheduleStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// PlanningFences - 计划围栏长度
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanningFences {
    pub frozen_days: i64, // 冻结区天数
    pub slushy_days: i64, // 半冻结区天数
    pub free_days: i64,   // 自由区天数
}

impl PlanningFences {
    pub fn new(frozen_days: i64, slushy_days: i64, free_days: i64) -> Self {
        Self {
            frozen_days,
            slushy_days,
            free_days,
        }
    }

    /// 三段围栏总天数
    pub fn total_days(&self) -> i64 {
        self.frozen_days + self.slushy_days + self.free_days
    }
}

// ==========================================
// MasterSchedule - 主生产计划表头
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSchedule {
    pub schedule_id: String,                   // 计划ID
    pub schedule_number: String,               // 计划编号 (租户内唯一)
    pub name: String,                          // 计划名称
    pub description: Option<String>,           // 计划说明
    pub period_start: NaiveDate,               // 计划期间起始
    pub period_end: NaiveDate,                 // 计划期间结束
    pub period_type: PeriodType,               // 周期类型
    pub fences: PlanningFences,                // 围栏配置
    pub status: ScheduleStatus,                // 状态
    pub created_by: String,                    // 创建人
    pub created_at: NaiveDateTime,             // 创建时间
    pub approved_by: Option<String>,           // 审批人
    pub approval_date: Option<NaiveDateTime>,  // 审批时间
    pub revision: i32,                         // 乐观锁：修订号
}

impl MasterSchedule {
    /// 计划期间天数 (period_end - period_start)
    pub fn horizon_days(&self) -> i64 {
        (self.period_end - self.period_start).num_days()
    }

    /// 日期是否在计划期间内 (闭区间)
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.period_end
    }

    pub fn is_draft(&self) -> bool {
        self.status == ScheduleStatus::Draft
    }

    pub fn is_active(&self) -> bool {
        self.status == ScheduleStatus::Active
    }
}

// ==========================================
// ScheduleLine - 计划行 (产品 × 周期)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleLine {
    // ===== 标识 =====
    pub line_id: String,
    pub schedule_id: String,
    pub product_id: String,
    pub period_date: NaiveDate, // 周期起始日
    pub period_number: u32,     // 产品内序号 (从1开始)

    // ===== 需求输入 =====
    pub forecast_qty: f64,       // 预测量
    pub customer_order_qty: f64, // 客户订单量
    pub dependent_demand: f64,   // 相关需求

    // ===== 供给输入 =====
    pub planned_production_qty: f64, // 计划生产量
    pub beginning_inventory: f64,    // 期初库存 (仅第1期为输入, 之后为推导值)
    pub safety_stock: f64,           // 安全库存 (下限, 不扣减)

    // ===== 计算输出 =====
    pub projected_available_balance: f64,  // PAB
    pub available_to_promise: Option<f64>, // ATP (无新供给的周期不发布)

    // ===== 实绩 =====
    pub actual_production_qty: f64,
    pub actual_sales_qty: f64,

    // ===== 标志 =====
    pub requires_reapproval: bool, // 半冻结区修改后待重新审批
}

impl ScheduleLine {
    /// 毛需求 = 相关需求 + max(预测, 订单)
    pub fn gross_demand(&self) -> f64 {
        self.dependent_demand + self.forecast_qty.max(self.customer_order_qty)
    }

    /// 是否有新的生产入库
    pub fn has_receipt(&self) -> bool {
        self.planned_production_qty > 0.0
    }

    /// 生产偏差 = 计划生产 - 实际生产 (正数为欠产)
    pub fn variance(&self) -> f64 {
        self.planned_production_qty - self.actual_production_qty
    }

    /// 是否已记录实绩
    pub fn has_actuals(&self) -> bool {
        self.actual_production_qty != 0.0 || self.actual_sales_qty != 0.0
    }

    /// PAB 是否低于安全库存
    pub fn is_below_safety_stock(&self) -> bool {
        self.projected_available_balance < self.safety_stock
    }
}

// ==========================================
// LineInput - 新增计划行输入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: String,
    pub period_date: NaiveDate,
    pub forecast_qty: f64,
    pub customer_order_qty: f64,
    pub planned_production_qty: f64,
    #[serde(default)]
    pub dependent_demand: f64,
    #[serde(default)]
    pub beginning_inventory: f64,
    #[serde(default)]
    pub safety_stock: f64,
}

impl LineInput {
    pub fn new(
        product_id: impl Into<String>,
        period_date: NaiveDate,
        forecast_qty: f64,
        customer_order_qty: f64,
        planned_production_qty: f64,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            period_date,
            forecast_qty,
            customer_order_qty,
            planned_production_qty,
            dependent_demand: 0.0,
            beginning_inventory: 0.0,
            safety_stock: 0.0,
        }
    }

    pub fn with_dependent_demand(mut self, qty: f64) -> Self {
        self.dependent_demand = qty;
        self
    }

    pub fn with_beginning_inventory(mut self, qty: f64) -> Self {
        self.beginning_inventory = qty;
        self
    }

    pub fn with_safety_stock(mut self, qty: f64) -> Self {
        self.safety_stock = qty;
        self
    }

    /// 数量字段列表 (字段名, 值), 用于统一校验
    pub fn quantities(&self) -> [(&'static str, f64); 6] {
        [
            ("forecast_qty", self.forecast_qty),
            ("customer_order_qty", self.customer_order_qty),
            ("planned_production_qty", self.planned_production_qty),
            ("dependent_demand", self.dependent_demand),
            ("beginning_inventory", self.beginning_inventory),
            ("safety_stock", self.safety_stock),
        ]
    }
}

// ==========================================
// LineUpdate - 计划行修改 (仅覆盖 Some 字段)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub forecast_qty: Option<f64>,
    pub customer_order_qty: Option<f64>,
    pub dependent_demand: Option<f64>,
    pub planned_production_qty: Option<f64>,
    pub beginning_inventory: Option<f64>,
    pub safety_stock: Option<f64>,
}

impl LineUpdate {
    pub fn is_empty(&self) -> bool {
        self.quantities().iter().all(|(_, v)| v.is_none())
    }

    pub fn quantities(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("forecast_qty", self.forecast_qty),
            ("customer_order_qty", self.customer_order_qty),
            ("dependent_demand", self.dependent_demand),
            ("planned_production_qty", self.planned_production_qty),
            ("beginning_inventory", self.beginning_inventory),
            ("safety_stock", self.safety_stock),
        ]
    }

    /// 将修改写入计划行
    pub fn apply_to(&self, line: &mut ScheduleLine) {
        if let Some(v) = self.forecast_qty {
            line.forecast_qty = v;
        }
        if let Some(v) = self.customer_order_qty {
            line.customer_order_qty = v;
        }
        if let Some(v) = self.dependent_demand {
            line.dependent_demand = v;
        }
        if let Some(v) = self.planned_production_qty {
            line.planned_production_qty = v;
        }
        if let Some(v) = self.beginning_inventory {
            line.beginning_inventory = v;
        }
        if let Some(v) = self.safety_stock {
            line.safety_stock = v;
        }
    }
}

// ==========================================
// LineFilter - 计划行查询条件 (None 表示不限)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFilter {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>, // 周期起始日下限 (含)
    #[serde(default)]
    pub to: Option<NaiveDate>, // 周期起始日上限 (含)
}

impl LineFilter {
    pub fn product(product_id: impl Into<String>) -> Self {
        Self {
            product_id: Some(product_id.into()),
            ..Default::default()
        }
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }
}

// ==========================================
// ProductSummary - 产品汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub period_count: usize,
    pub total_gross_demand: f64,
    pub total_planned_production: f64,
    pub total_actual_production: f64,
    pub total_actual_sales: f64,
    pub total_variance: f64,
    pub ending_balance: f64,
    pub below_safety_stock_periods: usize,
}
