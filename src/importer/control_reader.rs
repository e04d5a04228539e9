// ==========================================
// Excel 汇总工具 - 控制工作簿读取器
// ==========================================
// 职责: 控制工作簿 → Vec<ControlSheet>（值 + 公式）
// 说明: 公式文本统一带 `=` 前缀,供结果表原样写回
// ==========================================

use crate::domain::ControlSheet;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{formula_map, table_from_range};
use crate::importer::source_reader_trait::ControlReader;
use calamine::{open_workbook_auto, Reader};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

pub struct ControlWorkbookReader;

impl ControlReader for ControlWorkbookReader {
    fn read_control_workbook(&self, path: &Path) -> ImportResult<Vec<ControlSheet>> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let mut workbook = open_workbook_auto(path)?;
        let sheet_names = workbook.sheet_names();

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            let values = table_from_range(&workbook.worksheet_range(&name)?);

            // 公式读取失败不影响值的读取
            let formulas = match workbook.worksheet_formula(&name) {
                Ok(range) => formula_map(&range),
                Err(e) => {
                    warn!(sheet = %name, error = %e, "控制表公式读取失败，按纯值处理");
                    HashMap::new()
                }
            };

            debug!(
                sheet = %name,
                rows = values.row_count(),
                formulas = formulas.len(),
                "控制表读取完成"
            );
            sheets.push(ControlSheet {
                name,
                values,
                formulas,
            });
        }

        Ok(sheets)
    }
}
