// ==========================================
// Excel 汇总工具 - 控制表指令解析
// ==========================================
// 职责: 控制表 → SheetConfig + 逐行扫描结果
// 表头单元格: B1 默认文件夹 / B2 小数位数 / B3 自动列宽（可选）
// 数据列: A 文件夹 / B 文件名 / C 工作表 / D 起源单元格地址
// ==========================================

use crate::config::LayoutConfig;
use crate::domain::{
    CellTarget, ControlDirective, ControlSheet, IgnoreReason, ScannedRow, SheetConfig,
    DEFAULT_DECIMAL_PRECISION,
};
use crate::engine::file_resolver::is_valid_file_name;

/// 数据列位置（0 基）
const FOLDER_COL: u32 = 0;
const FILE_NAME_COL: u32 = 1;
const SHEET_NAME_COL: u32 = 2;
const FIRST_TARGET_COL: u32 = 3;

/// 开启自动列宽的取值
const AUTOFIT_YES: [&str; 3] = ["yes", "да", "true"];

/// 解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedControlSheet {
    pub config: SheetConfig,
    pub rows: Vec<ScannedRow>,
}

impl ParsedControlSheet {
    pub fn directives(&self) -> impl Iterator<Item = &ControlDirective> {
        self.rows.iter().filter_map(|row| match row {
            ScannedRow::Directive(d) => Some(d),
            ScannedRow::Ignored { .. } => None,
        })
    }
}

// ==========================================
// DirectiveParser - 指令解析器
// ==========================================
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    layout: LayoutConfig,
}

impl DirectiveParser {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    /// 解析表头配置
    pub fn parse_config(&self, sheet: &ControlSheet) -> SheetConfig {
        let values = &sheet.values;

        let decimal_precision = values
            .text(1, 1)
            .parse::<u32>()
            .unwrap_or(DEFAULT_DECIMAL_PRECISION);

        // B3 只有位于表头区域内时才是配置单元格
        let autofit_columns = self.layout.header_rows > 2 && {
            let flag = values.text(2, 1).to_lowercase();
            AUTOFIT_YES.contains(&flag.as_str())
        };

        SheetConfig {
            default_folder: values.text(0, 1),
            decimal_precision,
            autofit_columns,
            header_rows: self.layout.header_rows,
            config_rows: self.layout.config_rows,
        }
    }

    /// 表头之后参与扫描的行数（进度总数的组成部分）
    pub fn scanned_row_count(&self, sheet: &ControlSheet) -> usize {
        sheet.used_row_count().saturating_sub(self.layout.header_rows) as usize
    }

    /// 解析整张控制表
    pub fn parse(&self, sheet: &ControlSheet) -> ParsedControlSheet {
        let config = self.parse_config(sheet);
        let last_col = sheet.last_used_column().unwrap_or(0);

        let rows = (self.layout.header_rows..sheet.used_row_count())
            .map(|row| self.scan_row(sheet, row, last_col))
            .collect();

        ParsedControlSheet { config, rows }
    }

    fn scan_row(&self, sheet: &ControlSheet, row: u32, last_col: u32) -> ScannedRow {
        let values = &sheet.values;
        let folder = values.text(row, FOLDER_COL);
        let file_name = values.text(row, FILE_NAME_COL);
        let sheet_name = values.text(row, SHEET_NAME_COL);

        let ignored = |reason| ScannedRow::Ignored {
            row_index: row,
            reason,
        };
        if file_name.is_empty() {
            return ignored(IgnoreReason::BlankFileName);
        }
        if sheet_name.is_empty() {
            return ignored(IgnoreReason::BlankSheetName);
        }
        if !is_valid_file_name(&file_name) {
            return ignored(IgnoreReason::InvalidFileName);
        }

        let targets = (FIRST_TARGET_COL..=last_col)
            .filter_map(|col| {
                let address = values.text(row, col);
                (!address.is_empty()).then_some(CellTarget {
                    column: col,
                    address,
                })
            })
            .collect();

        ScannedRow::Directive(ControlDirective {
            row_index: row,
            explicit_folder: (!folder.is_empty()).then_some(folder),
            file_name,
            sheet_name,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataTable, RawValue};

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn sample_sheet() -> ControlSheet {
        let mut values = DataTable::new();
        values.set(0, 1, text("/data"));
        values.set(1, 1, RawValue::Number(2.0));
        values.set(2, 1, text("Да"));
        // 行 4: 有效指令
        values.set(3, 1, text("sales.xlsx"));
        values.set(3, 2, text("Q1"));
        values.set(3, 3, text("B2"));
        values.set(3, 5, text(" C7 "));
        // 行 5: 缺少工作表名
        values.set(4, 1, text("other.xlsx"));
        // 行 6: 显式文件夹
        values.set(5, 0, text("/explicit"));
        values.set(5, 1, text("x.xlsx"));
        values.set(5, 2, text("S"));
        ControlSheet::new("Group", values)
    }

    #[test]
    fn test_parse_config() {
        let parser = DirectiveParser::new(LayoutConfig::default());
        let config = parser.parse_config(&sample_sheet());

        assert_eq!(config.default_folder, "/data");
        assert_eq!(config.decimal_precision, 2);
        assert!(config.autofit_columns);
        assert_eq!(config.header_rows, 3);
    }

    #[test]
    fn test_invalid_precision_defaults_to_six() {
        let parser = DirectiveParser::new(LayoutConfig::default());
        for bad in [text("abc"), text("-1"), RawValue::Number(2.5), RawValue::Empty] {
            let mut values = DataTable::new();
            values.set(1, 1, bad);
            let config = parser.parse_config(&ControlSheet::new("S", values));
            assert_eq!(config.decimal_precision, DEFAULT_DECIMAL_PRECISION);
        }
    }

    #[test]
    fn test_autofit_ignored_when_b3_is_not_a_header_cell() {
        let layout = LayoutConfig {
            header_rows: 2,
            config_rows: 2,
        };
        let config = DirectiveParser::new(layout).parse_config(&sample_sheet());
        assert!(!config.autofit_columns);
    }

    #[test]
    fn test_parse_rows() {
        let parser = DirectiveParser::new(LayoutConfig::default());
        let parsed = parser.parse(&sample_sheet());

        assert_eq!(parsed.rows.len(), 3);
        let directives: Vec<_> = parsed.directives().collect();
        assert_eq!(directives.len(), 2);

        let first = directives[0];
        assert_eq!(first.row_index, 3);
        assert_eq!(first.explicit_folder, None);
        assert_eq!(first.file_name, "sales.xlsx");
        assert_eq!(
            first.targets,
            vec![
                CellTarget { column: 3, address: "B2".to_string() },
                CellTarget { column: 5, address: "C7".to_string() },
            ]
        );

        assert_eq!(
            parsed.rows[1],
            ScannedRow::Ignored {
                row_index: 4,
                reason: IgnoreReason::BlankSheetName
            }
        );
        assert_eq!(directives[1].explicit_folder.as_deref(), Some("/explicit"));
        assert_eq!(parser.scanned_row_count(&sample_sheet()), 3);
    }

    #[test]
    fn test_invalid_file_name_is_ignored() {
        let mut values = DataTable::new();
        values.set(3, 1, text("bad\u{1}name.xlsx"));
        values.set(3, 2, text("S"));
        let parsed = DirectiveParser::new(LayoutConfig::default()).parse(&ControlSheet::new("S", values));

        assert_eq!(
            parsed.rows,
            vec![ScannedRow::Ignored {
                row_index: 3,
                reason: IgnoreReason::InvalidFileName
            }]
        );
    }

    #[test]
    fn test_sheet_with_only_header_has_no_rows() {
        let mut values = DataTable::new();
        values.set(0, 1, text("/data"));
        values.set(2, 0, text("Папка"));
        let sheet = ControlSheet::new("S", values);
        let parser = DirectiveParser::new(LayoutConfig::default());

        assert!(parser.parse(&sheet).rows.is_empty());
        assert_eq!(parser.scanned_row_count(&sheet), 0);
    }
}
