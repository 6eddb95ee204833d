// ==========================================
// 主生产计划引擎 - 导入错误
// ==========================================
// 行号为文件行号 (表头为第 1 行)
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    // ----- 文件级 -----
    #[error("找不到导入文件: {0}")]
    FileNotFound(String),

    #[error("不支持的文件类型: {0} (可用 .csv/.xlsx/.xls)")]
    UnsupportedFormat(String),

    #[error("读取文件出错: {0}")]
    FileReadError(String),

    #[error("工作簿无法解析: {0}")]
    ExcelParseError(String),

    #[error("CSV 无法解析: {0}")]
    CsvParseError(String),

    #[error("文件中没有数据行")]
    EmptyFile,

    #[error("表头缺少列: {0}")]
    MissingColumn(String),

    // ----- 行级 -----
    #[error("第 {row} 行: {message}")]
    FieldMappingError { row: usize, message: String },

    #[error("第 {row} 行 {field} 不是数值: {message}")]
    TypeConversionError {
        row: usize,
        field: String,
        message: String,
    },

    #[error("第 {row} 行 {field} 日期无法识别: {value} (YYYY-MM-DD 或 YYYYMMDD)")]
    DateFormatError {
        row: usize,
        field: String,
        value: String,
    },

    #[error("第 {row} 行 {field} 为负数: {value}")]
    NegativeValue { row: usize, field: String, value: f64 },

    #[error("第 {row} 行与第 {first_row} 行重复: {product_id} @ {period_date}")]
    DuplicateRow {
        row: usize,
        first_row: usize,
        product_id: String,
        period_date: String,
    },
}

impl ImportError {
    /// 行级错误的文件行号
    pub fn row(&self) -> Option<usize> {
        match self {
            ImportError::FieldMappingError { row, .. }
            | ImportError::TypeConversionError { row, .. }
            | ImportError::DateFormatError { row, .. }
            | ImportError::NegativeValue { row, .. }
            | ImportError::DuplicateRow { row, .. } => Some(*row),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
