// ==========================================
// 主生产计划引擎 - 需求预测导入器
// ==========================================
// 职责: 原始记录 → 计划行输入 (字段映射 + 类型转换 + 行级校验)
// 列: product_id, period_date, forecast_qty, customer_order_qty, planned_production_qty
//     可选: dependent_demand_qty, safety_stock_qty, beginning_inventory_qty
// 红线: 任一行校验失败则整批拒绝, 错误带源文件行号
// ==========================================

use crate::domain::schedule::LineInput;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{parse_file, RawRecord};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// 字段 → 可接受的列名 (英文标准名 + 中文别名)
const PRODUCT_ID: &[&str] = &["product_id", "产品", "产品编码"];
const PERIOD_DATE: &[&str] = &["period_date", "周期", "周期日期"];
const FORECAST_QTY: &[&str] = &["forecast_qty", "预测量"];
const CUSTOMER_ORDER_QTY: &[&str] = &["customer_order_qty", "订单量", "客户订单量"];
const PLANNED_PRODUCTION_QTY: &[&str] = &["planned_production_qty", "计划生产量"];
const DEPENDENT_DEMAND_QTY: &[&str] = &["dependent_demand_qty", "相关需求"];
const SAFETY_STOCK_QTY: &[&str] = &["safety_stock_qty", "安全库存"];
const BEGINNING_INVENTORY_QTY: &[&str] = &["beginning_inventory_qty", "期初库存"];

const REQUIRED_COLUMNS: [&[&str]; 5] = [
    PRODUCT_ID,
    PERIOD_DATE,
    FORECAST_QTY,
    CUSTOMER_ORDER_QTY,
    PLANNED_PRODUCTION_QTY,
];

/// 一行导入数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub row_number: usize,
    pub input: LineInput,
}

#[derive(Debug, Default)]
pub struct ForecastImporter;

impl ForecastImporter {
    pub fn new() -> Self {
        Self
    }

    /// 读取文件并映射为计划行输入 (按产品、周期排序)
    pub fn read_file<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<Vec<ForecastRow>> {
        let path = file_path.as_ref();
        let records = parse_file(path)?;
        info!(file = %path.display(), records = records.len(), "读取需求预测文件");
        self.map_records(&records)
    }

    /// 映射原始记录; 结果按 (产品, 周期) 排序, 行号保留文件行号
    pub fn map_records(&self, records: &[RawRecord]) -> ImportResult<Vec<ForecastRow>> {
        let first = records.first().ok_or(ImportError::EmptyFile)?;
        for aliases in REQUIRED_COLUMNS {
            if !aliases.iter().any(|a| first.fields.contains_key(*a)) {
                return Err(ImportError::MissingColumn(aliases[0].to_string()));
            }
        }

        let mut seen: HashMap<(String, NaiveDate), usize> = HashMap::new();
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            let row = map_record(record)?;
            let key = (row.input.product_id.clone(), row.input.period_date);
            if let Some(first_row) = seen.insert(key, row.row_number) {
                return Err(ImportError::DuplicateRow {
                    row: row.row_number,
                    first_row,
                    product_id: row.input.product_id.clone(),
                    period_date: row.input.period_date.to_string(),
                });
            }
            rows.push(row);
        }
        rows.sort_by(|a, b| {
            a.input
                .product_id
                .cmp(&b.input.product_id)
                .then(a.input.period_date.cmp(&b.input.period_date))
        });

        debug!(rows = rows.len(), "需求预测映射完成");
        Ok(rows)
    }
}

fn lookup<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| record.get(alias))
}

fn map_record(record: &RawRecord) -> ImportResult<ForecastRow> {
    let row = record.row_number;

    let product_id = lookup(record, PRODUCT_ID)
        .ok_or_else(|| ImportError::FieldMappingError {
            row,
            message: "product_id 为空".to_string(),
        })?
        .to_string();

    let raw_date = lookup(record, PERIOD_DATE).ok_or_else(|| ImportError::FieldMappingError {
        row,
        message: "period_date 为空".to_string(),
    })?;
    let period_date = parse_date(raw_date).ok_or_else(|| ImportError::DateFormatError {
        row,
        field: PERIOD_DATE[0].to_string(),
        value: raw_date.to_string(),
    })?;

    let input = LineInput::new(
        product_id,
        period_date,
        parse_qty(record, FORECAST_QTY)?,
        parse_qty(record, CUSTOMER_ORDER_QTY)?,
        parse_qty(record, PLANNED_PRODUCTION_QTY)?,
    )
    .with_dependent_demand(parse_qty(record, DEPENDENT_DEMAND_QTY)?)
    .with_safety_stock(parse_qty(record, SAFETY_STOCK_QTY)?)
    .with_beginning_inventory(parse_qty(record, BEGINNING_INVENTORY_QTY)?);

    Ok(ForecastRow {
        row_number: row,
        input,
    })
}

/// 数量: 空值按 0, 非数值或负数报错
fn parse_qty(record: &RawRecord, aliases: &[&str]) -> ImportResult<f64> {
    let Some(raw) = lookup(record, aliases) else {
        return Ok(0.0);
    };

    let value = raw
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ImportError::TypeConversionError {
            row: record.row_number,
            field: aliases[0].to_string(),
            message: format!("无法解析为数值: {}", raw),
        })?;

    if value < 0.0 {
        return Err(ImportError::NegativeValue {
            row: record.row_number,
            field: aliases[0].to_string(),
            value,
        });
    }
    Ok(value)
}

/// 日期: YYYY-MM-DD / YYYYMMDD / YYYY/MM/DD, 以及 Excel 日期序列号
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    // Excel 单元格中的日期时间可能带 " 00:00:00" 或 "T00:00:00"
    let date_part = value.split([' ', 'T']).next().unwrap_or(value);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y%m%d"))
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y/%m/%d"))
        .ok()
        .or_else(|| excel_serial_date(value))
}

fn excel_serial_date(value: &str) -> Option<NaiveDate> {
    let serial = value.parse::<f64>().ok()?;
    if !(1.0..=2_958_465.0).contains(&serial) || serial.fract() != 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(row_number: usize, pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord {
            row_number,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn full(row: usize, product: &str, date: &str) -> RawRecord {
        record(
            row,
            &[
                ("product_id", product),
                ("period_date", date),
                ("forecast_qty", "30"),
                ("customer_order_qty", "40"),
                ("planned_production_qty", "1,500"),
            ],
        )
    }

    #[test]
    fn test_maps_required_and_optional_columns() {
        let mut rec = full(2, "P1", "20260701");
        rec.fields.insert("safety_stock_qty".into(), "12.5".into());
        rec.fields.insert("期初库存".into(), "100".into());

        let rows = ForecastImporter::new().map_records(&[rec]).unwrap();
        let input = &rows[0].input;
        assert_eq!(input.period_date, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        assert_eq!(input.planned_production_qty, 1500.0);
        assert_eq!(input.safety_stock, 12.5);
        assert_eq!(input.beginning_inventory, 100.0);
        assert_eq!(input.dependent_demand, 0.0);
    }

    #[test]
    fn test_row_errors_carry_row_number() {
        let importer = ForecastImporter::new();

        let mut bad_qty = full(3, "P1", "2026-07-01");
        bad_qty.fields.insert("forecast_qty".into(), "abc".into());
        let err = importer.map_records(&[full(2, "P1", "2026-08-01"), bad_qty]).unwrap_err();
        assert_eq!(err.row(), Some(3));

        let mut negative = full(5, "P1", "2026-07-01");
        negative.fields.insert("customer_order_qty".into(), "-1".into());
        assert!(matches!(
            importer.map_records(&[negative]),
            Err(ImportError::NegativeValue { row: 5, .. })
        ));

        assert!(matches!(
            importer.map_records(&[full(7, "P1", "07/01/2026")]),
            Err(ImportError::DateFormatError { row: 7, .. })
        ));
    }

    #[test]
    fn test_missing_column_and_duplicates() {
        let importer = ForecastImporter::new();
        let rec = record(2, &[("product_id", "P1"), ("period_date", "2026-07-01")]);
        assert!(matches!(
            importer.map_records(&[rec]),
            Err(ImportError::MissingColumn(_))
        ));

        let err = importer
            .map_records(&[full(2, "P1", "2026-07-01"), full(3, "P1", "20260701")])
            .unwrap_err();
        assert!(matches!(err, ImportError::DuplicateRow { row: 3, first_row: 2, .. }));

        assert!(matches!(importer.map_records(&[]), Err(ImportError::EmptyFile)));
    }

    #[test]
    fn test_rows_are_sorted_by_product_and_period() {
        let rows = ForecastImporter::new()
            .map_records(&[
                full(2, "P2", "2026-07-01"),
                full(3, "P1", "2026-09-01"),
                full(4, "P1", "2026-07-01"),
                full(5, "P1", "2026-08-01"),
            ])
            .unwrap();

        let order: Vec<(&str, usize)> = rows
            .iter()
            .map(|r| (r.input.product_id.as_str(), r.row_number))
            .collect();
        assert_eq!(order, vec![("P1", 4), ("P1", 5), ("P1", 3), ("P2", 2)]);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 7, 1);
        assert_eq!(parse_date("2026-07-01"), expected);
        assert_eq!(parse_date("20260701"), expected);
        assert_eq!(parse_date("2026/07/01"), expected);
        assert_eq!(parse_date("2026-07-01 00:00:00"), expected);
        assert_eq!(parse_date("46204"), expected);
        assert_eq!(parse_date("46204.5"), None);
    }
}
