// ==========================================
// Excel 汇总工具 - 工作簿缓存
// ==========================================
// 职责: 公式回退路径上按绝对路径缓存已打开的工作簿,同一文件只解析一次;
//       无缓存结果的公式经 formula 模块求值
// 生命周期: 每次汇总运行构造一个; 运行结束（正常/出错/中断）时全部释放
// 说明: 单线程使用,无需加锁
// ==========================================

use crate::domain::RawValue;
use crate::engine::address::CellPosition;
use crate::engine::formula::{
    self, CellRef, CellResolver, FormulaError, FormulaResult, FormulaValue,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{find_sheet_name, raw_value_from_data};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 公式嵌套求值的最大深度
const MAX_FORMULA_DEPTH: usize = 64;

struct CachedSheet {
    values: Range<Data>,
    formulas: Range<String>,
}

impl CachedSheet {
    fn formula(&self, position: CellPosition) -> Option<&str> {
        self.formulas
            .get_value((position.row, position.col))
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
    }

    fn used_end(&self) -> Option<CellPosition> {
        let ends = [self.values.end(), self.formulas.end()];
        ends.into_iter()
            .flatten()
            .map(|(row, col)| CellPosition::new(row, col))
            .reduce(|a, b| CellPosition::new(a.row.max(b.row), a.col.max(b.col)))
    }
}

struct CachedWorkbook {
    workbook: Xlsx<BufReader<File>>,
    sheet_names: Vec<String>,
    /// 实际工作表名 → 已读取的值（含公式缓存结果）与公式
    sheets: HashMap<String, CachedSheet>,
}

impl CachedWorkbook {
    /// 不区分大小写地定位工作表并在首次访问时读取,返回实际名称
    fn load_sheet(&mut self, name: &str) -> ImportResult<String> {
        let real_name = find_sheet_name(&self.sheet_names, name).ok_or_else(|| {
            ImportError::SheetNotFound {
                file: String::new(),
                sheet: name.to_string(),
            }
        })?;
        if !self.sheets.contains_key(&real_name) {
            let values = self.workbook.worksheet_range(&real_name)?;
            // 公式读取失败时按无公式处理
            let formulas = self
                .workbook
                .worksheet_formula(&real_name)
                .unwrap_or_else(|_| Range::empty());
            self.sheets.insert(real_name.clone(), CachedSheet { values, formulas });
        }
        Ok(real_name)
    }
}

// ==========================================
// SheetResolver - 在缓存工作簿内解析公式引用
// ==========================================
struct SheetResolver<'w> {
    book: &'w mut CachedWorkbook,
    /// 当前公式所在工作表（实际名称）
    current: String,
    /// 正在求值的单元格,用于发现循环引用
    visiting: Vec<(String, CellPosition)>,
}

impl SheetResolver<'_> {
    fn sheet_for(&mut self, sheet: Option<&str>) -> FormulaResult<String> {
        match sheet {
            None => Ok(self.current.clone()),
            Some(name) => self
                .book
                .load_sheet(name)
                .map_err(|e| FormulaError::Reference(format!("{}: {}", name, e))),
        }
    }

    /// 以 `sheet` 为当前工作表计算一个公式
    fn evaluate_in(
        &mut self,
        sheet: String,
        position: CellPosition,
        text: &str,
    ) -> FormulaResult<FormulaValue> {
        let key = (sheet.clone(), position);
        if self.visiting.contains(&key) {
            return Err(FormulaError::Circular(format!("{}!{}", sheet, position)));
        }
        if self.visiting.len() >= MAX_FORMULA_DEPTH {
            return Err(FormulaError::Reference(format!("嵌套超过 {} 层", MAX_FORMULA_DEPTH)));
        }

        let previous = std::mem::replace(&mut self.current, sheet);
        self.visiting.push(key);
        let result = formula::evaluate(text, self);
        self.visiting.pop();
        self.current = previous;
        result
    }
}

impl CellResolver for SheetResolver<'_> {
    fn resolve(&mut self, cell: &CellRef) -> FormulaResult<FormulaValue> {
        let sheet = self.sheet_for(cell.sheet.as_deref())?;
        let cached = &self.book.sheets[&sheet];
        let position = cell.position;

        let value = cached.values.get_value((position.row, position.col)).cloned();
        match value {
            Some(Data::Empty) | None => {}
            Some(Data::String(s)) if s.is_empty() => {}
            Some(data) => return Ok(formula_value_from_data(&data)),
        }

        let text = cached.formula(position).map(str::to_string);
        match text {
            Some(text) => self.evaluate_in(sheet, position, &text),
            None => Ok(FormulaValue::Empty),
        }
    }

    fn used_end(&mut self, sheet: Option<&str>) -> FormulaResult<Option<CellPosition>> {
        let sheet = self.sheet_for(sheet)?;
        Ok(self.book.sheets[&sheet].used_end())
    }
}

/// 公式运算使用的值: 日期参与运算时取其序列号
fn formula_value_from_data(data: &Data) -> FormulaValue {
    match data {
        Data::Empty | Data::Error(_) => FormulaValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            FormulaValue::Text(s.clone())
        }
        Data::Float(f) => FormulaValue::Number(*f),
        Data::Int(i) => FormulaValue::Number(*i as f64),
        Data::Bool(b) => FormulaValue::Boolean(*b),
        Data::DateTime(dt) => FormulaValue::Number(dt.as_f64()),
    }
}

fn raw_value_from_formula(value: FormulaValue) -> Option<RawValue> {
    match value {
        FormulaValue::Empty => None,
        FormulaValue::Text(s) if s.is_empty() => None,
        FormulaValue::Text(s) => Some(RawValue::Text(s)),
        FormulaValue::Number(n) => Some(RawValue::Number(n)),
        FormulaValue::Boolean(b) => Some(RawValue::Boolean(b)),
    }
}

// ==========================================
// WorkbookCache - 工作簿缓存
// ==========================================
#[derive(Default)]
pub struct WorkbookCache {
    entries: HashMap<PathBuf, CachedWorkbook>,
    opened: usize,
    released: usize,
}

impl WorkbookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取单元格计算值（首次访问时打开工作簿）
    ///
    /// 单元格有缓存结果时直接使用; 只有公式没有结果时就地求值
    ///
    /// # 返回
    /// - Ok(Some(value)): 单元格有值或公式求值成功
    /// - Ok(None): 单元格为空,或公式无法求值（不支持的函数、循环引用等）
    /// - Err: 打开/读取失败
    pub fn computed_value(
        &mut self,
        path: &Path,
        sheet: &str,
        position: CellPosition,
    ) -> ImportResult<Option<RawValue>> {
        let entry = match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let workbook: Xlsx<_> = open_workbook(path)?;
                self.opened += 1;
                debug!(path = %path.display(), "公式回退: 打开工作簿");
                let sheet_names = workbook.sheet_names();
                vacant.insert(CachedWorkbook {
                    workbook,
                    sheet_names,
                    sheets: HashMap::new(),
                })
            }
        };

        let real_name = entry.load_sheet(sheet).map_err(|e| match e {
            ImportError::SheetNotFound { sheet, .. } => ImportError::SheetNotFound {
                file: path.display().to_string(),
                sheet,
            },
            other => other,
        })?;

        let cached = &entry.sheets[&real_name];
        if let Some(value) = cached
            .values
            .get_value((position.row, position.col))
            .map(raw_value_from_data)
            .filter(|v| !matches!(v, RawValue::Empty))
        {
            return Ok(Some(value));
        }

        let text = match cached.formula(position) {
            Some(text) => text.to_string(),
            None => return Ok(None),
        };

        let mut resolver = SheetResolver {
            book: entry,
            current: real_name.clone(),
            visiting: Vec::new(),
        };
        match resolver.evaluate_in(real_name, position, &text) {
            Ok(value) => Ok(raw_value_from_formula(value)),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    sheet = %sheet,
                    cell = %position,
                    error = %e,
                    "公式无法求值"
                );
                Ok(None)
            }
        }
    }

    /// 当前持有的工作簿数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// 累计打开次数
    pub fn opened_count(&self) -> usize {
        self.opened
    }

    /// 累计释放次数
    pub fn released_count(&self) -> usize {
        self.released
    }

    /// 释放全部工作簿,返回本次释放数量
    pub fn release_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.released += count;
        if count > 0 {
            debug!(released = count, "工作簿缓存已释放");
        }
        count
    }
}

impl Drop for WorkbookCache {
    fn drop(&mut self) {
        self.release_all();
    }
}
