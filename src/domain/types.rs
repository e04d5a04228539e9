// ==========================================
// Excel 汇总工具 - 领域类型定义
// ==========================================
// 职责: 单元格原始值 / 强类型值 / 显示格式
// 红线: 原始值在读表边界一次性转换为封闭枚举,下游只做模式匹配
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 原始值 (Raw Value)
// ==========================================
// 读表边界产出,未经类型推断
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum RawValue {
    #[default]
    Empty,
    Number(f64),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Text(String),
}

impl RawValue {
    /// 若为 `=` 开头的文本（忽略前导空白）,返回公式文本
    pub fn as_formula_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) if s.trim_start().starts_with('=') => Some(s.as_str()),
            _ => None,
        }
    }

    /// 单元格的字符串表示（用于读取配置单元格与地址单元格）
    pub fn display_text(&self) -> String {
        match self {
            RawValue::Empty => String::new(),
            RawValue::Number(n) => format_plain_number(*n),
            RawValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            RawValue::Boolean(true) => "TRUE".to_string(),
            RawValue::Boolean(false) => "FALSE".to_string(),
            RawValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

/// 整数值不带小数部分输出
pub(crate) fn format_plain_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ==========================================
// 强类型值 (Cell Value)
// ==========================================
// 不变式: 恰有一个标签; 数值与日期解析均失败时落入 Text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Number(f64),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Text(String),
}

impl CellValue {
    /// 原样转换（不做文本解析）,空值返回 None
    pub fn from_raw_verbatim(raw: &RawValue) -> Option<CellValue> {
        match raw {
            RawValue::Empty => None,
            RawValue::Number(n) => Some(CellValue::Number(*n)),
            RawValue::DateTime(dt) => Some(CellValue::DateTime(*dt)),
            RawValue::Boolean(b) => Some(CellValue::Boolean(*b)),
            RawValue::Text(s) => Some(CellValue::Text(s.clone())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Number(_) => "NUMBER",
            CellValue::DateTime(_) => "DATE",
            CellValue::Boolean(_) => "BOOLEAN",
            CellValue::Text(_) => "TEXT",
        }
    }
}

impl From<CellValue> for RawValue {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Number(n) => RawValue::Number(n),
            CellValue::DateTime(dt) => RawValue::DateTime(dt),
            CellValue::Boolean(b) => RawValue::Boolean(b),
            CellValue::Text(s) => RawValue::Text(s),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", format_plain_number(*n)),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// ==========================================
// 显示格式 (Display Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayFormat {
    General,
    Number { decimals: u32 },
    DateTime,
}

/// 日期时间显示格式（Excel 数字格式语法）
pub const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm";

impl DisplayFormat {
    /// Excel 数字格式字符串; General 返回 None
    ///
    /// - Number(0) → `0`
    /// - Number(2) → `0.00`
    /// - DateTime → `yyyy-mm-dd hh:mm`
    pub fn num_format(&self) -> Option<String> {
        match self {
            DisplayFormat::General => None,
            DisplayFormat::Number { decimals: 0 } => Some("0".to_string()),
            DisplayFormat::Number { decimals } => {
                Some(format!("0.{}", "0".repeat(*decimals as usize)))
            }
            DisplayFormat::DateTime => Some(DATETIME_NUM_FORMAT.to_string()),
        }
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.num_format() {
            Some(fmt) => write!(f, "{}", fmt),
            None => write!(f, "General"),
        }
    }
}
