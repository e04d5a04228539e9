// ==========================================
// Excel 汇总工具 - 单元格地址解析
// ==========================================
// 职责: "AB12" ↔ (行, 列)（0 基）
// 规则: 列字母为双射 26 进制（A=1 … Z=26, AA=27）,大小写不敏感
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use std::fmt;

/// 0 基单元格坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellPosition {
    pub row: u32,
    pub col: u32,
}

impl CellPosition {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row + 1)
    }
}

/// 解析单元格地址
///
/// 地址必须是 "字母段 + 数字段",不含 `$` 与工作表前缀; 首尾空白忽略
pub fn parse_address(address: &str) -> EngineResult<CellPosition> {
    let malformed = || EngineError::MalformedAddress(address.to_string());
    let trimmed = address.trim();

    let split = trimmed
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (letters, digits) = trimmed.split_at(split);

    if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let col = column_index(letters).ok_or_else(malformed)?;
    let row_number: u32 = digits.parse().map_err(|_| malformed())?;
    if row_number == 0 {
        return Err(malformed());
    }

    Ok(CellPosition::new(row_number - 1, col))
}

/// 列字母 → 0 基列号; 溢出返回 None
pub fn column_index(letters: &str) -> Option<u32> {
    let mut sum: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        let digit = u32::from(b.to_ascii_uppercase() - b'A' + 1);
        sum = sum.checked_mul(26)?.checked_add(digit)?;
    }
    sum.checked_sub(1)
}

/// 0 基列号 → 列字母
pub fn column_letters(col: u32) -> String {
    let mut n = u64::from(col) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// 坐标 → 地址
pub fn format_address(position: CellPosition) -> String {
    position.to_string()
}
