// ==========================================
// Excel 汇总工具 - 公式求值器
// ==========================================
// 职责: 源工作簿中没有缓存结果的公式 → 计算值
// 范围: 常用算术/比较/文本运算与聚合函数; 其余函数报 Unsupported,
//       调用方据此保留公式原文
// 引用: A1 / $A$1 / Sheet!A1 / 'Имя листа'!A1 / A1:B5
// ==========================================

use crate::engine::address::{parse_address, CellPosition};
use std::cmp::Ordering;
use thiserror::Error;

/// 单个区域参与计算的最大单元格数
pub const MAX_RANGE_CELLS: u64 = 1_000_000;

/// 工作表行列上限（0 基）
const MAX_ROW: u32 = 1_048_575;
const MAX_COL: u32 = 16_383;

/// 求值结果（标量）
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("公式语法错误: {0}")]
    Syntax(String),

    #[error("不支持的函数: {0}")]
    Unsupported(String),

    #[error("引用无法解析: {0}")]
    Reference(String),

    #[error("循环引用: {0}")]
    Circular(String),

    #[error("#VALUE!: {0}")]
    Value(String),

    #[error("#DIV/0!")]
    DivisionByZero,

    #[error("区域过大: {0} 个单元格")]
    RangeTooLarge(u64),
}

pub type FormulaResult<T> = Result<T, FormulaError>;

/// 单元格引用（工作表为 None 时指公式所在工作表）
#[derive(Debug, Clone, PartialEq)]
pub struct CellRef {
    pub sheet: Option<String>,
    pub position: CellPosition,
}

// ==========================================
// CellResolver - 引用解析接口
// ==========================================
pub trait CellResolver {
    /// 取被引用单元格的值（必要时递归求值其公式）
    fn resolve(&mut self, cell: &CellRef) -> FormulaResult<FormulaValue>;

    /// 工作表已用区域的右下角; 区域引用按此裁剪
    fn used_end(&mut self, sheet: Option<&str>) -> FormulaResult<Option<CellPosition>>;
}

/// 解析并计算公式（前导 `=` 可有可无）
pub fn evaluate(formula: &str, resolver: &mut dyn CellResolver) -> FormulaResult<FormulaValue> {
    let expr = parse(formula)?;
    Evaluator { resolver }.scalar(&expr)
}

// ==========================================
// 词法分析
// ==========================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    QuotedSheet(String),
    Bang,
    Colon,
    Separator,
    LParen,
    RParen,
    Op(char),
    Compare(&'static str),
}

fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // 指数部分
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| FormulaError::Syntax(format!("非法数字 {}", text)))?;
                tokens.push(Token::Number(number));
            }
            '"' => {
                let (text, next) = read_quoted(&chars, i, '"')?;
                tokens.push(Token::Text(text));
                i = next;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, '\'')?;
                tokens.push(Token::QuotedSheet(text));
                i = next;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' | ';' => {
                tokens.push(Token::Separator);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' | '&' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '=' => {
                tokens.push(Token::Compare("="));
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('<', Some('=')) => "<=",
                    ('<', Some('>')) => "<>",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    _ => ">",
                };
                i += op.len();
                tokens.push(Token::Compare(op));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(FormulaError::Syntax(format!("非法字符 '{}'", other))),
        }
    }

    Ok(tokens)
}

/// 读取引号包围的文本; 连续两个引号表示引号本身
fn read_quoted(chars: &[char], open: usize, quote: char) -> FormulaResult<(String, usize)> {
    let mut text = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    Err(FormulaError::Syntax("引号未闭合".to_string()))
}

// ==========================================
// 语法分析
// ==========================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Ref(CellRef),
    Range(CellRef, CellPosition),
    Negate(Box<Expr>),
    Percent(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Compare(&'static str, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

fn parse(formula: &str) -> FormulaResult<Expr> {
    let body = formula.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(FormulaError::Syntax("空公式".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.comparison()?;
    if parser.pos != parser.tokens.len() {
        return Err(FormulaError::Syntax(format!(
            "多余的记号 {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(FormulaError::Syntax(format!("缺少 {:?}", expected)))
        }
    }

    fn comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.concat()?;
        while let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.concat()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn concat(&mut self) -> FormulaResult<Expr> {
        let mut left = self.additive()?;
        while self.eat(&Token::Op('&')) {
            let right = self.additive()?;
            left = Expr::Binary('&', Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut left = self.power()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.power()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn power(&mut self) -> FormulaResult<Expr> {
        let mut left = self.unary()?;
        while self.eat(&Token::Op('^')) {
            let right = self.unary()?;
            left = Expr::Binary('^', Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> FormulaResult<Expr> {
        if self.eat(&Token::Op('-')) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Op('+')) {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> FormulaResult<Expr> {
        let mut expr = self.primary()?;
        while self.eat(&Token::Op('%')) {
            expr = Expr::Percent(Box::new(expr));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> FormulaResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::LParen) => {
                let expr = self.comparison()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::QuotedSheet(sheet)) => {
                self.expect(&Token::Bang)?;
                self.reference(Some(sheet))
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    return self.call(name);
                }
                if self.eat(&Token::Bang) {
                    return self.reference(Some(name));
                }
                match name.to_uppercase().as_str() {
                    "TRUE" => Ok(Expr::Boolean(true)),
                    "FALSE" => Ok(Expr::Boolean(false)),
                    _ => {
                        self.pos -= 1;
                        self.reference(None)
                    }
                }
            }
            other => Err(FormulaError::Syntax(format!("意外的记号 {:?}", other))),
        }
    }

    /// 单元格或区域引用
    fn reference(&mut self, sheet: Option<String>) -> FormulaResult<Expr> {
        let start = self.cell_position()?;
        let start = CellRef { sheet, position: start };
        if self.eat(&Token::Colon) {
            let end = self.cell_position()?;
            return Ok(Expr::Range(start, end));
        }
        Ok(Expr::Ref(start))
    }

    fn cell_position(&mut self) -> FormulaResult<CellPosition> {
        match self.next() {
            Some(Token::Ident(text)) => {
                let plain: String = text.chars().filter(|c| *c != '$').collect();
                match parse_address(&plain) {
                    Ok(position) if position.row <= MAX_ROW && position.col <= MAX_COL => Ok(position),
                    // 名称（定义名、整列引用等）不在支持范围内
                    _ => Err(FormulaError::Unsupported(text)),
                }
            }
            other => Err(FormulaError::Syntax(format!("期望单元格引用, 实际 {:?}", other))),
        }
    }

    fn call(&mut self, name: String) -> FormulaResult<Expr> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(Expr::Call(name.to_uppercase(), args));
        }
        loop {
            args.push(self.comparison()?);
            if self.eat(&Token::Separator) {
                continue;
            }
            self.expect(&Token::RParen)?;
            break;
        }
        Ok(Expr::Call(name.to_uppercase(), args))
    }
}

// ==========================================
// 求值
// ==========================================

struct Evaluator<'r> {
    resolver: &'r mut dyn CellResolver,
}

impl Evaluator<'_> {
    fn scalar(&mut self, expr: &Expr) -> FormulaResult<FormulaValue> {
        match expr {
            Expr::Number(n) => Ok(FormulaValue::Number(*n)),
            Expr::Text(s) => Ok(FormulaValue::Text(s.clone())),
            Expr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
            Expr::Ref(cell) => self.resolver.resolve(cell),
            Expr::Range(..) => Err(FormulaError::Value("区域不能作为标量".to_string())),
            Expr::Negate(inner) => {
                let value = self.scalar(inner)?;
                Ok(FormulaValue::Number(-to_number(&value)?))
            }
            Expr::Percent(inner) => {
                let value = self.scalar(inner)?;
                Ok(FormulaValue::Number(to_number(&value)? / 100.0))
            }
            Expr::Binary('&', left, right) => {
                let left = to_text(&self.scalar(left)?);
                let right = to_text(&self.scalar(right)?);
                Ok(FormulaValue::Text(left + &right))
            }
            Expr::Binary(op, left, right) => {
                let left = to_number(&self.scalar(left)?)?;
                let right = to_number(&self.scalar(right)?)?;
                arithmetic(*op, left, right).map(FormulaValue::Number)
            }
            Expr::Compare(op, left, right) => {
                let left = self.scalar(left)?;
                let right = self.scalar(right)?;
                let ordering = compare(&left, &right);
                let result = match *op {
                    "=" => ordering == Ordering::Equal,
                    "<>" => ordering != Ordering::Equal,
                    "<" => ordering == Ordering::Less,
                    ">" => ordering == Ordering::Greater,
                    "<=" => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(FormulaValue::Boolean(result))
            }
            Expr::Call(name, args) => self.call(name, args),
        }
    }

    /// 展开参数: 区域展开为其中的单元格值; `from_reference` 标记值是否来自引用
    fn flatten(&mut self, args: &[Expr]) -> FormulaResult<Vec<(FormulaValue, bool)>> {
        let mut values = Vec::new();
        for arg in args {
            match arg {
                Expr::Range(start, end) => {
                    for value in self.range_values(start, *end)? {
                        values.push((value, true));
                    }
                }
                Expr::Ref(cell) => values.push((self.resolver.resolve(cell)?, true)),
                other => values.push((self.scalar(other)?, false)),
            }
        }
        Ok(values)
    }

    fn range_values(&mut self, start: &CellRef, end: CellPosition) -> FormulaResult<Vec<FormulaValue>> {
        let top = start.position.row.min(end.row);
        let left = start.position.col.min(end.col);
        let bottom = start.position.row.max(end.row);
        let right = start.position.col.max(end.col);

        // 只遍历已用区域
        let used = match self.resolver.used_end(start.sheet.as_deref())? {
            Some(used) => used,
            None => return Ok(Vec::new()),
        };
        let bottom = bottom.min(used.row);
        let right = right.min(used.col);
        if top > bottom || left > right {
            return Ok(Vec::new());
        }

        let count = u64::from(bottom - top + 1) * u64::from(right - left + 1);
        if count > MAX_RANGE_CELLS {
            return Err(FormulaError::RangeTooLarge(count));
        }

        let mut values = Vec::with_capacity(count as usize);
        for row in top..=bottom {
            for col in left..=right {
                let cell = CellRef {
                    sheet: start.sheet.clone(),
                    position: CellPosition::new(row, col),
                };
                values.push(self.resolver.resolve(&cell)?);
            }
        }
        Ok(values)
    }

    /// 聚合函数使用的数值: 引用中的文本/布尔/空被忽略, 直接参数强制转换
    fn numbers(&mut self, args: &[Expr]) -> FormulaResult<Vec<f64>> {
        let mut numbers = Vec::new();
        for (value, from_reference) in self.flatten(args)? {
            match value {
                FormulaValue::Number(n) => numbers.push(n),
                _ if from_reference => {}
                other => numbers.push(to_number(&other)?),
            }
        }
        Ok(numbers)
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> FormulaResult<FormulaValue> {
        let number = FormulaValue::Number;
        match name {
            "SUM" => Ok(number(self.numbers(args)?.iter().sum())),
            "PRODUCT" => Ok(number(self.numbers(args)?.iter().product())),
            "AVERAGE" => {
                let numbers = self.numbers(args)?;
                if numbers.is_empty() {
                    return Err(FormulaError::DivisionByZero);
                }
                Ok(number(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
            "MIN" => Ok(number(
                self.numbers(args)?.into_iter().reduce(f64::min).unwrap_or(0.0),
            )),
            "MAX" => Ok(number(
                self.numbers(args)?.into_iter().reduce(f64::max).unwrap_or(0.0),
            )),
            "COUNT" => {
                let count = self
                    .flatten(args)?
                    .iter()
                    .filter(|(v, _)| matches!(v, FormulaValue::Number(_)))
                    .count();
                Ok(number(count as f64))
            }
            "COUNTA" => {
                let count = self
                    .flatten(args)?
                    .iter()
                    .filter(|(v, _)| !matches!(v, FormulaValue::Empty))
                    .count();
                Ok(number(count as f64))
            }
            "ABS" => {
                let [arg] = fixed_args::<1>(name, args)?;
                Ok(number(to_number(&self.scalar(arg)?)?.abs()))
            }
            "ROUND" => {
                let [value, digits] = fixed_args::<2>(name, args)?;
                let value = to_number(&self.scalar(value)?)?;
                let digits = to_number(&self.scalar(digits)?)?.trunc() as i32;
                let factor = 10f64.powi(digits);
                Ok(number((value * factor).round() / factor))
            }
            "IF" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(FormulaError::Value(format!("{} 参数个数错误", name)));
                }
                if to_bool(&self.scalar(&args[0])?)? {
                    self.scalar(&args[1])
                } else if let Some(otherwise) = args.get(2) {
                    self.scalar(otherwise)
                } else {
                    Ok(FormulaValue::Boolean(false))
                }
            }
            "AND" | "OR" => {
                let mut flags = Vec::new();
                for (value, from_reference) in self.flatten(args)? {
                    match value {
                        FormulaValue::Empty | FormulaValue::Text(_) if from_reference => {}
                        other => flags.push(to_bool(&other)?),
                    }
                }
                let result = if name == "AND" {
                    flags.iter().all(|b| *b)
                } else {
                    flags.iter().any(|b| *b)
                };
                Ok(FormulaValue::Boolean(result))
            }
            "NOT" => {
                let [arg] = fixed_args::<1>(name, args)?;
                Ok(FormulaValue::Boolean(!to_bool(&self.scalar(arg)?)?))
            }
            "CONCATENATE" | "CONCAT" => {
                let mut text = String::new();
                for (value, _) in self.flatten(args)? {
                    text.push_str(&to_text(&value));
                }
                Ok(FormulaValue::Text(text))
            }
            other => Err(FormulaError::Unsupported(other.to_string())),
        }
    }
}

fn fixed_args<'e, const N: usize>(name: &str, args: &'e [Expr]) -> FormulaResult<[&'e Expr; N]> {
    if args.len() != N {
        return Err(FormulaError::Value(format!("{} 参数个数错误", name)));
    }
    let mut refs = [&args[0]; N];
    for (slot, arg) in refs.iter_mut().zip(args) {
        *slot = arg;
    }
    Ok(refs)
}

fn arithmetic(op: char, left: f64, right: f64) -> FormulaResult<f64> {
    match op {
        '+' => Ok(left + right),
        '-' => Ok(left - right),
        '*' => Ok(left * right),
        '/' if right == 0.0 => Err(FormulaError::DivisionByZero),
        '/' => Ok(left / right),
        '^' => Ok(left.powf(right)),
        other => Err(FormulaError::Syntax(format!("未知运算符 {}", other))),
    }
}

fn to_number(value: &FormulaValue) -> FormulaResult<f64> {
    match value {
        FormulaValue::Empty => Ok(0.0),
        FormulaValue::Number(n) => Ok(*n),
        FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| FormulaError::Value(format!("'{}' 不是数值", s))),
    }
}

fn to_bool(value: &FormulaValue) -> FormulaResult<bool> {
    match value {
        FormulaValue::Boolean(b) => Ok(*b),
        FormulaValue::Text(s) => match s.trim().to_uppercase().as_str() {
            "TRUE" => Ok(true),
            "FALSE" => Ok(false),
            _ => Err(FormulaError::Value(format!("'{}' 不是逻辑值", s))),
        },
        other => Ok(to_number(other)? != 0.0),
    }
}

fn to_text(value: &FormulaValue) -> String {
    match value {
        FormulaValue::Empty => String::new(),
        FormulaValue::Number(n) => crate::domain::types::format_plain_number(*n),
        FormulaValue::Text(s) => s.clone(),
        FormulaValue::Boolean(true) => "TRUE".to_string(),
        FormulaValue::Boolean(false) => "FALSE".to_string(),
    }
}

/// 比较顺序: 数值 < 文本 < 逻辑值; 文本不区分大小写; 空值按 0 或空串参与比较
fn compare(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    use FormulaValue::*;
    match (left, right) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, Text(_)) => compare(&Text(String::new()), right),
        (Text(_), Empty) => compare(left, &Text(String::new())),
        (Empty, _) => compare(&Number(0.0), right),
        (_, Empty) => compare(left, &Number(0.0)),
        (Number(a), Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Boolean(a), Boolean(b)) => a.cmp(b),
        (Number(_), _) => Ordering::Less,
        (_, Number(_)) => Ordering::Greater,
        (Text(_), Boolean(_)) => Ordering::Less,
        (Boolean(_), Text(_)) => Ordering::Greater,
    }
}
