// ==========================================
// 主生产计划引擎 - 周期网格
// ==========================================
// 职责: 按周期类型计算周期桶起始日 (以计划起始日为锚点)
//   DAILY   → start + k 天
//   WEEKLY  → start + 7k 天
//   MONTHLY → start + k 个月 (日超出当月天数时取月末)
// ==========================================

use crate::domain::types::PeriodType;
use chrono::{Datelike, Duration, Months, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodGrid {
    start: NaiveDate,
    end: NaiveDate,
    period_type: PeriodType,
}

impl PeriodGrid {
    pub fn new(start: NaiveDate, end: NaiveDate, period_type: PeriodType) -> Self {
        Self {
            start,
            end,
            period_type,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 第 index 个周期桶的起始日 (0 起), 超出计划期间返回 None
    pub fn bucket_date(&self, index: u32) -> Option<NaiveDate> {
        let date = match self.period_type {
            PeriodType::Daily => self.start.checked_add_signed(Duration::days(index as i64))?,
            PeriodType::Weekly => self
                .start
                .checked_add_signed(Duration::days(7 * index as i64))?,
            PeriodType::Monthly => self.start.checked_add_months(Months::new(index))?,
        };

        if date > self.end {
            None
        } else {
            Some(date)
        }
    }

    /// 日期在网格上的序号; 不在网格上返回 None
    pub fn bucket_index(&self, date: NaiveDate) -> Option<u32> {
        if date < self.start || date > self.end {
            return None;
        }

        let candidate = match self.period_type {
            PeriodType::Daily => (date - self.start).num_days(),
            PeriodType::Weekly => {
                let days = (date - self.start).num_days();
                if days % 7 != 0 {
                    return None;
                }
                days / 7
            }
            PeriodType::Monthly => {
                (date.year() - self.start.year()) as i64 * 12 + date.month() as i64
                    - self.start.month() as i64
            }
        };

        let index = u32::try_from(candidate).ok()?;
        match self.bucket_date(index) {
            Some(d) if d == date => Some(index),
            _ => None,
        }
    }

    pub fn is_aligned(&self, date: NaiveDate) -> bool {
        self.bucket_index(date).is_some()
    }

    /// 下一个周期桶
    pub fn next_bucket(&self, date: NaiveDate) -> Option<NaiveDate> {
        let index = self.bucket_index(date)?;
        self.bucket_date(index + 1)
    }

    /// 上一个周期桶
    pub fn previous_bucket(&self, date: NaiveDate) -> Option<NaiveDate> {
        let index = self.bucket_index(date)?;
        index.checked_sub(1).and_then(|i| self.bucket_date(i))
    }

    /// 计划期间内全部周期桶
    pub fn buckets(&self) -> Vec<NaiveDate> {
        (0..)
            .map_while(|i| self.bucket_date(i))
            .collect()
    }
}
