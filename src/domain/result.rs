// ==========================================
// Excel 汇总工具 - 结果表领域模型
// ==========================================
// 职责: 结果工作表 / 行处理结果 / 运行汇总
// 红线: 已带公式的结果单元格不得被抽取数据覆盖
// ==========================================

use crate::domain::types::{CellValue, DisplayFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ==========================================
// ResultCell - 结果单元格
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ResultCell {
    Value {
        value: CellValue,
        format: DisplayFormat,
    },
    /// 公式文本（带 `=` 前缀）
    Formula(String),
}

// ==========================================
// ResultSheet - 结果工作表
// ==========================================
// 与控制表同名; 单元格按 (行, 列) 有序存放,坐标 0 基
#[derive(Debug, Clone, Default)]
pub struct ResultSheet {
    pub name: String,
    pub cells: BTreeMap<(u32, u32), ResultCell>,
    /// 冻结的首部行数
    pub freeze_rows: u32,
    /// 是否自动调整列宽
    pub autofit_columns: bool,
}

impl ResultSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&ResultCell> {
        self.cells.get(&(row, col))
    }

    pub fn has_formula(&self, row: u32, col: u32) -> bool {
        matches!(self.get(row, col), Some(ResultCell::Formula(_)))
    }

    /// 写入公式（表头复制阶段使用）
    pub fn set_formula(&mut self, row: u32, col: u32, formula: impl Into<String>) {
        self.cells
            .insert((row, col), ResultCell::Formula(formula.into()));
    }

    /// 写入值; 目标单元格已有公式时不写入并返回 false
    pub fn set_value(&mut self, row: u32, col: u32, value: CellValue, format: DisplayFormat) -> bool {
        if self.has_formula(row, col) {
            return false;
        }
        self.cells
            .insert((row, col), ResultCell::Value { value, format });
        true
    }

    /// 读取单元格的值（公式单元格返回 None）
    pub fn value(&self, row: u32, col: u32) -> Option<&CellValue> {
        match self.get(row, col) {
            Some(ResultCell::Value { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ==========================================
// 行处理结果
// ==========================================
// 行级隔离: 任一行的失败只影响本行
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Extracted { cells_written: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// 源文件未找到
    FileNotFound,
    /// 源文件中无此工作表
    SheetNotFound,
    /// 源文件读取失败（损坏/被锁定/格式问题）
    ReadFailure(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FileNotFound => write!(f, "源文件未找到"),
            SkipReason::SheetNotFound => write!(f, "源工作表不存在"),
            SkipReason::ReadFailure(msg) => write!(f, "源文件读取失败: {}", msg),
        }
    }
}

/// 单元格处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    Written,
    /// 地址非法
    MalformedAddress,
    /// 无数据（越界或空值）
    NoData,
    /// 目标单元格带公式,保留不动
    FormulaProtected,
}

// ==========================================
// 运行汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub rows_total: usize,
    pub rows_processed: usize,
    pub rows_extracted: usize,
    pub rows_skipped: usize,
    pub rows_ignored: usize,
    pub cells_written: usize,
}

/// 一次汇总的内存结果（尚未落盘）
#[derive(Debug, Clone, Default)]
pub struct AggregationOutput {
    pub sheets: Vec<ResultSheet>,
    pub stats: RunStats,
}

/// 一次汇总的最终报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationReport {
    pub control_path: PathBuf,
    pub output_path: PathBuf,
    pub sheet_names: Vec<String>,
    pub stats: RunStats,
}
