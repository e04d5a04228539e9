// ==========================================
// Excel 汇总工具 - 单元格取值
// ==========================================
// 职责: 数据表 + 地址 → 原始值（必要时经工作簿缓存回退取公式计算值）
// 规则:
// - 地址越界: 无数据（不是错误）
// - 原始值为 `=` 开头的文本且源文件为 xlsx/xlsm: 从缓存工作簿取计算值
//   （公式有缓存结果时取结果,否则就地求值）
// - 计算值仍是公式文本、无法求值或读取失败: 返回原始值（回退从不报错）
// ==========================================

use crate::domain::{DataTable, RawValue};
use crate::engine::address::parse_address;
use crate::engine::error::EngineResult;
use crate::engine::workbook_cache::WorkbookCache;
use crate::importer::file_parser::lowercase_extension;
use std::path::Path;
use tracing::debug;

/// 支持公式回退的扩展名
const FORMULA_CAPABLE_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];

pub fn is_formula_capable(path: &Path) -> bool {
    FORMULA_CAPABLE_EXTENSIONS.contains(&lowercase_extension(path).as_str())
}

// ==========================================
// CellValueExtractor - 单元格取值器
// ==========================================
pub struct CellValueExtractor<'a> {
    cache: &'a mut WorkbookCache,
}

impl<'a> CellValueExtractor<'a> {
    pub fn new(cache: &'a mut WorkbookCache) -> Self {
        Self { cache }
    }

    /// 取单元格原始值
    ///
    /// # 参数
    /// - table: 源工作表数据
    /// - address: 源单元格地址
    /// - source_file: 源文件路径（缓存键）
    /// - source_sheet: 源工作表名
    ///
    /// # 返回
    /// - Ok(Some(value)): 有数据
    /// - Ok(None): 越界或空
    /// - Err(MalformedAddress): 地址非法
    pub fn extract(
        &mut self,
        table: &DataTable,
        address: &str,
        source_file: &Path,
        source_sheet: &str,
    ) -> EngineResult<Option<RawValue>> {
        let position = parse_address(address)?;

        let raw = match table.get(position.row, position.col) {
            Some(value) if !matches!(value, RawValue::Empty) => value,
            _ => return Ok(None),
        };

        if raw.as_formula_text().is_none() || !is_formula_capable(source_file) {
            return Ok(Some(raw.clone()));
        }

        match self.cache.computed_value(source_file, source_sheet, position) {
            Ok(Some(computed)) if computed.as_formula_text().is_none() => Ok(Some(computed)),
            Ok(_) => {
                debug!(
                    file = %source_file.display(),
                    sheet = %source_sheet,
                    address = %address,
                    "公式无计算值，使用原始文本"
                );
                Ok(Some(raw.clone()))
            }
            Err(e) => {
                debug!(
                    file = %source_file.display(),
                    sheet = %source_sheet,
                    address = %address,
                    error = %e,
                    "公式回退失败，使用原始值"
                );
                Ok(Some(raw.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineError;
    use tempfile::TempDir;

    fn table_with(row: u32, col: u32, value: RawValue) -> DataTable {
        let mut table = DataTable::new();
        table.set(row, col, value);
        table
    }

    #[test]
    fn test_out_of_range_is_no_data() {
        let mut cache = WorkbookCache::new();
        let mut extractor = CellValueExtractor::new(&mut cache);
        let table = table_with(0, 0, RawValue::Number(1.0));

        let value = extractor.extract(&table, "Z99", Path::new("a.xlsx"), "S").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_malformed_address_is_reported() {
        let mut cache = WorkbookCache::new();
        let mut extractor = CellValueExtractor::new(&mut cache);
        let table = table_with(0, 0, RawValue::Number(1.0));

        let result = extractor.extract(&table, "1A", Path::new("a.xlsx"), "S");
        assert!(matches!(result, Err(EngineError::MalformedAddress(_))));
    }

    #[test]
    fn test_plain_value_does_not_touch_cache() {
        let mut cache = WorkbookCache::new();
        let table = table_with(1, 1, RawValue::Number(1234.5));
        {
            let mut extractor = CellValueExtractor::new(&mut cache);
            let value = extractor.extract(&table, "B2", Path::new("a.xlsx"), "Q1").unwrap();
            assert_eq!(value, Some(RawValue::Number(1234.5)));
        }
        assert_eq!(cache.opened_count(), 0);
    }

    #[test]
    fn test_formula_in_non_capable_format_returns_raw() {
        let mut cache = WorkbookCache::new();
        let table = table_with(0, 0, RawValue::Text("=A2*2".to_string()));
        {
            let mut extractor = CellValueExtractor::new(&mut cache);
            let value = extractor.extract(&table, "A1", Path::new("a.csv"), "a").unwrap();
            assert_eq!(value, Some(RawValue::Text("=A2*2".to_string())));
        }
        assert_eq!(cache.opened_count(), 0);
    }

    #[test]
    fn test_formula_fallback_failure_degrades_to_raw() {
        let mut cache = WorkbookCache::new();
        let mut extractor = CellValueExtractor::new(&mut cache);
        let table = table_with(0, 0, RawValue::Text("=SUM(B1:B5)".to_string()));

        // 文件不存在: 回退失败,返回原始文本
        let value = extractor
            .extract(&table, "A1", Path::new("/nonexistent/book.xlsx"), "Q1")
            .unwrap();
        assert_eq!(value, Some(RawValue::Text("=SUM(B1:B5)".to_string())));
    }

    #[test]
    fn test_formula_cell_without_result_is_evaluated_end_to_end() {
        use crate::importer::{CalamineSourceReader, SourceReader};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calc.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Q1").unwrap();
        worksheet.set_formula_result_default("");
        worksheet.write_number(0, 1, 40.0).unwrap();
        worksheet.write_number(1, 1, 59.0).unwrap();
        worksheet.write_formula(2, 1, "=SUM(B1:B2)").unwrap();
        worksheet.write_formula(3, 1, "=INDIRECT(\"B1\")").unwrap();
        workbook.save(&path).unwrap();

        let table = CalamineSourceReader.read_sheet(&path, "Q1").unwrap();
        let mut cache = WorkbookCache::new();
        let mut extractor = CellValueExtractor::new(&mut cache);

        assert_eq!(
            extractor.extract(&table, "B3", &path, "Q1").unwrap(),
            Some(RawValue::Number(99.0))
        );
        // 无法求值: 保留公式原文
        assert_eq!(
            extractor.extract(&table, "B4", &path, "Q1").unwrap(),
            Some(RawValue::Text("=INDIRECT(\"B1\")".to_string()))
        );
    }

    #[test]
    fn test_formula_fallback_uses_cached_workbook_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calc.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Q1").unwrap();
        worksheet.write_number(0, 0, 99.0).unwrap();
        workbook.save(&path).unwrap();

        // 快速读表给出公式文本,缓存工作簿给出值
        let table = table_with(0, 0, RawValue::Text("=40+59".to_string()));
        let mut cache = WorkbookCache::new();
        let mut extractor = CellValueExtractor::new(&mut cache);
        let value = extractor.extract(&table, "A1", &path, "Q1").unwrap();
        assert_eq!(value, Some(RawValue::Number(99.0)));
    }
}
