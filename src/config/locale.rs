// ==========================================
// Excel 汇总工具 - 区域格式配置
// ==========================================
// 职责: 数值/日期文本解析所用的区域规则
// 说明: 先按操作员区域解析,失败后按不变区域解析
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};

// ==========================================
// LocaleProfile - 区域格式
// ==========================================
#[derive(Debug, PartialEq, Eq)]
pub struct LocaleProfile {
    pub name: &'static str,
    pub decimal_separator: char,
    pub group_separators: &'static [char],
    /// 日期时间模式（chrono 语法）,按顺序尝试
    pub datetime_patterns: &'static [&'static str],
    /// 纯日期模式,解析结果时间为 00:00
    pub date_patterns: &'static [&'static str],
}

pub const RU_RU: LocaleProfile = LocaleProfile {
    name: "ru-RU",
    decimal_separator: ',',
    group_separators: &[' ', '\u{a0}', '\u{202f}'],
    datetime_patterns: &["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"],
    date_patterns: &["%d.%m.%Y"],
};

pub const DE_DE: LocaleProfile = LocaleProfile {
    name: "de-DE",
    decimal_separator: ',',
    group_separators: &['.', '\u{a0}'],
    datetime_patterns: &["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"],
    date_patterns: &["%d.%m.%Y"],
};

pub const EN_US: LocaleProfile = LocaleProfile {
    name: "en-US",
    decimal_separator: '.',
    group_separators: &[','],
    datetime_patterns: &[
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M:%S %p",
        "%m/%d/%Y %I:%M %p",
    ],
    date_patterns: &["%m/%d/%Y"],
};

pub const INVARIANT: LocaleProfile = LocaleProfile {
    name: "invariant",
    decimal_separator: '.',
    group_separators: &[','],
    datetime_patterns: &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ],
    date_patterns: &["%Y-%m-%d", "%m/%d/%Y"],
};

const ALL_PROFILES: [&LocaleProfile; 4] = [&RU_RU, &DE_DE, &EN_US, &INVARIANT];

impl LocaleProfile {
    /// 按名称查找（大小写不敏感; "ru" 等价于 "ru-RU"）
    pub fn by_name(name: &str) -> Option<&'static LocaleProfile> {
        let wanted = name.trim();
        ALL_PROFILES.into_iter().find(|p| {
            p.name.eq_ignore_ascii_case(wanted)
                || p.name
                    .split('-')
                    .next()
                    .is_some_and(|lang| lang.eq_ignore_ascii_case(wanted))
        })
    }

    /// 解析数值文本
    ///
    /// 允许: 前后空白、正负号、千分位分隔符（仅整数部分）、小数分隔符、指数、括号负数
    pub fn parse_number(&self, text: &str) -> Option<f64> {
        let trimmed = text.trim();
        let (negated, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            Some(inner) => (true, inner.trim()),
            None => (false, trimmed),
        };
        if body.is_empty() {
            return None;
        }

        let mut normalized = String::with_capacity(body.len());
        let mut seen_digit = false;
        let mut seen_decimal = false;
        for ch in body.chars() {
            if ch.is_ascii_digit() {
                seen_digit = true;
                normalized.push(ch);
            } else if ch == self.decimal_separator {
                seen_decimal = true;
                normalized.push('.');
            } else if self.group_separators.contains(&ch) {
                if !seen_digit || seen_decimal {
                    return None;
                }
            } else if matches!(ch, '+' | '-' | 'e' | 'E') {
                normalized.push(ch);
            } else {
                return None;
            }
        }
        if !seen_digit {
            return None;
        }

        let value: f64 = normalized.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(if negated { -value } else { value })
    }

    /// 解析日期时间文本
    pub fn parse_datetime(&self, text: &str) -> Option<NaiveDateTime> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        for pattern in self.datetime_patterns {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
                return Some(dt);
            }
        }
        for pattern in self.date_patterns {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, pattern) {
                return date.and_hms_opt(0, 0, 0);
            }
        }
        None
    }
}
