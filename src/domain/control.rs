// ==========================================
// Excel 汇总工具 - 控制表领域模型
// ==========================================
// 职责: 控制表内容 / 表头配置 / 抽取指令
// 用途: 导入层构造 ControlSheet,引擎层解析为 SheetConfig + ControlDirective
// ==========================================

use crate::domain::table::DataTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 默认小数位数（B2 缺失或非法时）
pub const DEFAULT_DECIMAL_PRECISION: u32 = 6;

// ==========================================
// ControlSheet - 控制工作表
// ==========================================
// values: 单元格值（公式单元格为其缓存值）
// formulas: (行, 列) → 公式文本（带 `=` 前缀）
#[derive(Debug, Clone, Default)]
pub struct ControlSheet {
    pub name: String,
    pub values: DataTable,
    pub formulas: HashMap<(u32, u32), String>,
}

impl ControlSheet {
    pub fn new(name: impl Into<String>, values: DataTable) -> Self {
        Self {
            name: name.into(),
            values,
            formulas: HashMap::new(),
        }
    }

    pub fn with_formula(mut self, row: u32, col: u32, formula: impl Into<String>) -> Self {
        self.formulas.insert((row, col), formula.into());
        self
    }

    pub fn formula(&self, row: u32, col: u32) -> Option<&str> {
        self.formulas.get(&(row, col)).map(String::as_str)
    }

    /// 最后使用行（0 基,值或公式）
    pub fn last_used_row(&self) -> Option<u32> {
        let formula_row = self.formulas.keys().map(|(r, _)| *r).max();
        self.values.last_used_row().max(formula_row)
    }

    /// 最后使用列（0 基,值或公式）
    pub fn last_used_column(&self) -> Option<u32> {
        let formula_col = self.formulas.keys().map(|(_, c)| *c).max();
        self.values.last_used_column().max(formula_col)
    }

    /// 已使用行数（1 基行号意义上的最后使用行）
    pub fn used_row_count(&self) -> u32 {
        self.last_used_row().map(|r| r + 1).unwrap_or(0)
    }
}

// ==========================================
// SheetConfig - 控制表表头配置
// ==========================================
// 每张控制表一份,解析后只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    /// B1: 默认源文件夹（递归搜索根目录）
    pub default_folder: String,
    /// B2: 小数位数
    pub decimal_precision: u32,
    /// B3: 是否自动调整列宽
    pub autofit_columns: bool,
    /// 表头行数（配置行 + 图例行,不参与指令扫描）
    pub header_rows: u32,
    /// 配置行数（不复制到结果表,结果行号 = 控制表行号 - config_rows）
    pub config_rows: u32,
}

impl SheetConfig {
    /// 控制表行 → 结果表行（0 基）
    pub fn result_row(&self, control_row: u32) -> Option<u32> {
        control_row.checked_sub(self.config_rows)
    }

    /// 结果表冻结的图例行数
    pub fn legend_rows(&self) -> u32 {
        self.header_rows.saturating_sub(self.config_rows)
    }
}

// ==========================================
// ControlDirective - 抽取指令
// ==========================================
// 每个数据行一条; 构造后不可变,处理完即丢弃
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDirective {
    /// 控制表中的行号（0 基）
    pub row_index: u32,
    /// A 列: 显式源文件夹（空白为 None）
    pub explicit_folder: Option<String>,
    /// B 列: 源文件名
    pub file_name: String,
    /// C 列: 源工作表名
    pub sheet_name: String,
    /// D 列起: 输出列 → 源单元格地址（按列顺序）
    pub targets: Vec<CellTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellTarget {
    /// 输出列（0 基）
    pub column: u32,
    /// 源单元格地址（如 "AB12"）
    pub address: String,
}

// ==========================================
// ScannedRow - 扫描结果
// ==========================================
// 每个表头后的行对应一个, 进度统计按行推进
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedRow {
    Directive(ControlDirective),
    Ignored { row_index: u32, reason: IgnoreReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    BlankFileName,
    BlankSheetName,
    InvalidFileName,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::BlankFileName => "BLANK_FILE_NAME",
            IgnoreReason::BlankSheetName => "BLANK_SHEET_NAME",
            IgnoreReason::InvalidFileName => "INVALID_FILE_NAME",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RawValue;

    #[test]
    fn test_result_row_offset() {
        let config = SheetConfig {
            default_folder: String::new(),
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
            autofit_columns: false,
            header_rows: 3,
            config_rows: 2,
        };
        assert_eq!(config.result_row(3), Some(1));
        assert_eq!(config.result_row(2), Some(0));
        assert_eq!(config.result_row(1), None);
        assert_eq!(config.legend_rows(), 1);
    }

    #[test]
    fn test_control_sheet_used_rows_include_formulas() {
        let mut values = DataTable::new();
        values.set(1, 0, RawValue::Text("x".to_string()));
        let sheet = ControlSheet::new("S", values).with_formula(4, 6, "=SUM(D5:D9)");

        assert_eq!(sheet.used_row_count(), 5);
        assert_eq!(sheet.last_used_column(), Some(6));
        assert_eq!(sheet.formula(4, 6), Some("=SUM(D5:D9)"));
    }
}
