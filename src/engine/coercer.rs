// ==========================================
// Excel 汇总工具 - 值类型推断
// ==========================================
// 职责: 原始值 → (强类型值, 显示格式)
// 判定顺序:
// 1. 空值（含空字符串）→ 不输出; 纯空白文本按文本原样写出
// 2. 数值/日期/布尔 → 原样打标签
// 3. 文本 → 数值解析（操作员区域 → 不变区域）
//         → 日期解析（同样顺序）
//         → 原样保留为文本
// ==========================================

use crate::config::locale::{LocaleProfile, INVARIANT};
use crate::domain::{CellValue, DisplayFormat, RawValue};

/// 推断结果
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedValue {
    pub value: CellValue,
    pub format: DisplayFormat,
}

// ==========================================
// ValueCoercer - 类型推断器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct ValueCoercer {
    operator_locale: &'static LocaleProfile,
    fallback_locale: &'static LocaleProfile,
}

impl Default for ValueCoercer {
    fn default() -> Self {
        Self::new(&INVARIANT)
    }
}

impl ValueCoercer {
    /// 指定操作员区域; 第二顺位固定为不变区域
    pub fn new(operator_locale: &'static LocaleProfile) -> Self {
        Self {
            operator_locale,
            fallback_locale: &INVARIANT,
        }
    }

    /// 推断类型
    ///
    /// # 参数
    /// - raw: 原始值
    /// - decimal_precision: 数值显示的小数位数
    ///
    /// # 返回
    /// - None: 空值,调用方跳过该单元格
    pub fn coerce(&self, raw: &RawValue, decimal_precision: u32) -> Option<CoercedValue> {
        let number_format = DisplayFormat::Number {
            decimals: decimal_precision,
        };

        match raw {
            RawValue::Empty => None,
            RawValue::Number(n) => Some(CoercedValue {
                value: CellValue::Number(*n),
                format: number_format,
            }),
            RawValue::DateTime(dt) => Some(CoercedValue {
                value: CellValue::DateTime(*dt),
                format: DisplayFormat::DateTime,
            }),
            RawValue::Boolean(b) => Some(CoercedValue {
                value: CellValue::Boolean(*b),
                format: DisplayFormat::General,
            }),
            RawValue::Text(text) if text.is_empty() => None,
            RawValue::Text(text) => Some(self.coerce_text(text, number_format)),
        }
    }

    fn coerce_text(&self, text: &str, number_format: DisplayFormat) -> CoercedValue {
        if let Some(n) = self.parse_number(text) {
            return CoercedValue {
                value: CellValue::Number(n),
                format: number_format,
            };
        }
        if let Some(dt) = self
            .operator_locale
            .parse_datetime(text)
            .or_else(|| self.fallback_locale.parse_datetime(text))
        {
            return CoercedValue {
                value: CellValue::DateTime(dt),
                format: DisplayFormat::DateTime,
            };
        }
        CoercedValue {
            value: CellValue::Text(text.to_string()),
            format: DisplayFormat::General,
        }
    }

    /// 数值解析（操作员区域优先）
    pub fn parse_number(&self, text: &str) -> Option<f64> {
        self.operator_locale
            .parse_number(text)
            .or_else(|| self.fallback_locale.parse_number(text))
    }
}
