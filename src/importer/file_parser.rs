// ==========================================
// Excel 汇总工具 - 源文件解析器实现
// ==========================================
// 职责: 源文件 → DataTable（原始值在此一次性转换为 RawValue）
// 支持: Excel (.xlsx/.xlsm/.xlsb/.xls/.ods) / CSV (.csv)
// ==========================================

use crate::domain::{DataTable, RawValue};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::source_reader_trait::SourceReader;
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// calamine 支持的扩展名
const EXCEL_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// 小写扩展名（无扩展名为空串）
pub fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// 原始值转换（读表边界）
// ==========================================

/// calamine 单元格 → RawValue
///
/// 错误值（#DIV/0! 等）视为空; 日期按工作簿自身的 1900/1904 纪元换算
pub fn raw_value_from_data(data: &Data) -> RawValue {
    match data {
        Data::Empty | Data::Error(_) => RawValue::Empty,
        Data::String(s) if s.is_empty() => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Bool(b) => RawValue::Boolean(*b),
        Data::DateTime(dt) if dt.is_duration() => RawValue::Number(dt.as_f64()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(RawValue::DateTime)
            .unwrap_or(RawValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(RawValue::DateTime)
            .unwrap_or_else(|| RawValue::Text(s.clone())),
        Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// calamine Range → DataTable（Range 坐标相对于其起点,此处换算为绝对坐标）
pub fn table_from_range(range: &Range<Data>) -> DataTable {
    let mut table = DataTable::new();
    let (start_row, start_col) = match range.start() {
        Some(start) => start,
        None => return table,
    };
    for (row, col, data) in range.used_cells() {
        let value = raw_value_from_data(data);
        if !matches!(value, RawValue::Empty) {
            table.set(start_row + row as u32, start_col + col as u32, value);
        }
    }
    table
}

/// 公式 Range → (行, 列) → "=..."（绝对坐标）
pub fn formula_map(range: &Range<String>) -> HashMap<(u32, u32), String> {
    let mut formulas = HashMap::new();
    let (start_row, start_col) = match range.start() {
        Some(start) => start,
        None => return formulas,
    };
    for (row, col, formula) in range.used_cells() {
        let text = formula.trim();
        if text.is_empty() {
            continue;
        }
        let text = if text.starts_with('=') {
            text.to_string()
        } else {
            format!("={}", text)
        };
        formulas.insert((start_row + row as u32, start_col + col as u32), text);
    }
    formulas
}

/// 按名称查找工作表: 精确匹配优先,其次不区分大小写（Unicode 小写,含西里尔字母）
///
/// 返回工作簿中的实际名称
pub fn find_sheet_name(sheet_names: &[String], wanted: &str) -> Option<String> {
    if let Some(exact) = sheet_names.iter().find(|name| name.as_str() == wanted) {
        return Some(exact.clone());
    }
    let wanted = wanted.to_lowercase();
    sheet_names
        .iter()
        .find(|name| name.to_lowercase() == wanted)
        .cloned()
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct CalamineSourceReader;

impl SourceReader for CalamineSourceReader {
    fn read_sheet(&self, path: &Path, sheet_name: &str) -> ImportResult<DataTable> {
        // 检查文件存在
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        // 检查扩展名
        let ext = lowercase_extension(path);
        if !EXCEL_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        // 打开 Excel 文件
        let mut workbook = open_workbook_auto(path)?;

        let real_name = find_sheet_name(&workbook.sheet_names(), sheet_name).ok_or_else(|| {
            ImportError::SheetNotFound {
                file: path.display().to_string(),
                sheet: sheet_name.to_string(),
            }
        })?;

        let range = workbook.worksheet_range(&real_name)?;
        let mut table = table_from_range(&range);

        // 无缓存结果的公式单元格读作空值,此处以公式文本补上,交给取值器回退求值
        match workbook.worksheet_formula(&real_name) {
            Ok(formulas) => {
                for ((row, col), formula) in formula_map(&formulas) {
                    if matches!(table.get(row, col), None | Some(RawValue::Empty)) {
                        table.set(row, col, RawValue::Text(formula));
                    }
                }
            }
            Err(e) => {
                debug!(
                    file = %path.display(),
                    sheet = %real_name,
                    error = %e,
                    "公式读取失败，仅使用单元格值"
                );
            }
        }

        Ok(table)
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
// CSV 只有一张表,表名为文件名（不含扩展名）
pub struct CsvSourceReader;

impl SourceReader for CsvSourceReader {
    fn read_sheet(&self, path: &Path, sheet_name: &str) -> ImportResult<DataTable> {
        // 检查文件存在
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let ext = lowercase_extension(path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if find_sheet_name(&[stem.to_string()], sheet_name).is_none() {
            return Err(ImportError::SheetNotFound {
                file: path.display().to_string(),
                sheet: sheet_name.to_string(),
            });
        }

        // 打开 CSV 文件
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let cells = record
                .iter()
                .enumerate()
                .map(|(col_idx, field)| {
                    let field = if rows.is_empty() && col_idx == 0 {
                        field.trim_start_matches('\u{feff}')
                    } else {
                        field
                    };
                    if field.is_empty() {
                        RawValue::Empty
                    } else {
                        RawValue::Text(field.to_string())
                    }
                })
                .collect();
            rows.push(cells);
        }

        Ok(DataTable::from_rows(rows))
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalSourceReader;

impl SourceReader for UniversalSourceReader {
    fn read_sheet(&self, path: &Path, sheet_name: &str) -> ImportResult<DataTable> {
        match lowercase_extension(path).as_str() {
            "csv" => CsvSourceReader.read_sheet(path, sheet_name),
            ext if EXCEL_EXTENSIONS.contains(&ext) => {
                CalamineSourceReader.read_sheet(path, sheet_name)
            }
            ext => Err(ImportError::UnsupportedFormat(ext.to_string())),
        }
    }
}
