// ==========================================
// 主生产计划引擎 - 导入层
// ==========================================
// 职责: 外部需求预测文件 → 计划行输入
// 支持: Excel, CSV
// ==========================================

pub mod error;
pub mod file_parser;
pub mod forecast_importer;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{parse_file, CsvParser, ExcelParser, FileParser, RawRecord};
pub use forecast_importer::{ForecastImporter, ForecastRow};
