// ==========================================
// Excel 汇总工具 - 数据表模型
// ==========================================
// 职责: 工作表的行 × 列原始值网格（0 基绝对坐标,A1 = (0, 0)）
// ==========================================

use crate::domain::types::RawValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    rows: Vec<Vec<RawValue>>,
    width: u32,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由行数据构造（行长度可不一致）
    pub fn from_rows(rows: Vec<Vec<RawValue>>) -> Self {
        let width = rows.iter().map(|r| r.len() as u32).max().unwrap_or(0);
        Self { rows, width }
    }

    /// 行数（含末尾空行之前的所有行）
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// 列数（所有行中的最大宽度）
    pub fn column_count(&self) -> u32 {
        self.width
    }

    /// 越界返回 None
    pub fn get(&self, row: u32, col: u32) -> Option<&RawValue> {
        self.rows.get(row as usize)?.get(col as usize)
    }

    /// 写入单元格,必要时扩展网格
    pub fn set(&mut self, row: u32, col: u32, value: RawValue) {
        let (r, c) = (row as usize, col as usize);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, RawValue::Empty);
        }
        cells[c] = value;
        self.width = self.width.max(col + 1);
    }

    /// 单元格文本（去首尾空白）,越界或空值为空串
    pub fn text(&self, row: u32, col: u32) -> String {
        self.get(row, col)
            .map(|v| v.display_text().trim().to_string())
            .unwrap_or_default()
    }

    /// 最后一个非空单元格所在行（0 基）
    pub fn last_used_row(&self) -> Option<u32> {
        self.rows
            .iter()
            .rposition(|cells| cells.iter().any(|v| !matches!(v, RawValue::Empty)))
            .map(|r| r as u32)
    }

    /// 最后一个非空单元格所在列（0 基）
    pub fn last_used_column(&self) -> Option<u32> {
        self.rows
            .iter()
            .filter_map(|cells| cells.iter().rposition(|v| !matches!(v, RawValue::Empty)))
            .max()
            .map(|c| c as u32)
    }
}
