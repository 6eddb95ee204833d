// ==========================================
// 主生产计划引擎 - 文件解析器
// ==========================================
// 按扩展名选择解析器: .csv / .xlsx / .xls
// 输出原始记录 (表头 → 单元格文本), 行号为源文件行号, 表头为第1行
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub row_number: usize,
    pub fields: HashMap<String, String>,
}

impl RawRecord {
    /// 按列名取值, 空白单元格视为缺失
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// 全部单元格为空时返回 None
    fn from_cells<I>(headers: &[String], cells: I, row_number: usize) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let fields: HashMap<String, String> = headers
            .iter()
            .zip(cells)
            .map(|(header, value)| (header.clone(), value.trim().to_string()))
            .collect();
        if fields.values().all(String::is_empty) {
            None
        } else {
            Some(Self { row_number, fields })
        }
    }
}

pub trait FileParser {
    /// 读取首个数据表; 调用方已确认文件存在
    fn parse(&self, path: &Path) -> ImportResult<Vec<RawRecord>>;
}

pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, path: &Path) -> ImportResult<Vec<RawRecord>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(File::open(path)?);

        // Excel 导出的 CSV 常带 BOM
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut records = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            // 带引号换行时 position 才能给出准确行号
            let line = record.position().map_or(idx + 2, |p| p.line() as usize);
            records.extend(RawRecord::from_cells(&headers, record.iter().map(str::to_string), line));
        }
        Ok(records)
    }
}

pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse(&self, path: &Path) -> ImportResult<Vec<RawRecord>> {
        let mut workbook = open_workbook_auto(path)?;
        let first_sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("工作簿中没有工作表".to_string()))?;
        let range = workbook.worksheet_range(&first_sheet)?;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .ok_or(ImportError::EmptyFile)?
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        Ok(rows
            .enumerate()
            .filter_map(|(idx, row)| {
                RawRecord::from_cells(&headers, row.iter().map(|c| c.to_string()), idx + 2)
            })
            .collect())
    }
}

/// 检查文件并按扩展名解析
pub fn parse_file(path: &Path) -> ImportResult<Vec<RawRecord>> {
    if !path.is_file() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let parser: &dyn FileParser = match ext.as_str() {
        "csv" => &CsvParser,
        "xlsx" | "xls" => &ExcelParser,
        _ => return Err(ImportError::UnsupportedFormat(ext)),
    };
    parser.parse(path)
}
