// ==========================================
// Excel 汇总工具 - 读表接口 Trait
// ==========================================
// 职责: 定义源文件与控制工作簿的读取接口（不包含实现）
// ==========================================

use crate::domain::{ControlSheet, DataTable};
use crate::importer::error::ImportResult;
use std::path::Path;

// ==========================================
// SourceReader Trait
// ==========================================
// 用途: 读取源文件中的一张工作表（快速表格读取,不求值公式）
// 实现者: CalamineSourceReader, CsvSourceReader, UniversalSourceReader
pub trait SourceReader: Send + Sync {
    /// 读取指定工作表为数据表
    ///
    /// # 参数
    /// - path: 源文件路径
    /// - sheet_name: 工作表名
    ///
    /// # 返回
    /// - Ok(DataTable): 绝对坐标的原始值网格
    /// - Err(ImportError::SheetNotFound): 文件中无此工作表
    /// - Err: 文件读取/格式错误
    fn read_sheet(&self, path: &Path, sheet_name: &str) -> ImportResult<DataTable>;
}

// ==========================================
// ControlReader Trait
// ==========================================
// 用途: 读取控制工作簿（值 + 公式）
// 实现者: ControlWorkbookReader
pub trait ControlReader: Send + Sync {
    /// 按工作表顺序读取全部控制表
    fn read_control_workbook(&self, path: &Path) -> ImportResult<Vec<ControlSheet>>;
}
