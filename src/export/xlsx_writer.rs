// ==========================================
// Excel 汇总工具 - 结果工作簿写出
// ==========================================
// 职责: ResultSheet → .xlsx（数值/日期格式、冻结图例行、自动列宽）
// ==========================================

use crate::domain::{CellValue, DisplayFormat, ResultCell, ResultSheet};
use crate::export::error::{ExportError, ExportResult};
use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;
use tracing::{debug, info};

/// 结果文件名: "yyyy.MM.dd_HH-mm <后缀>.xlsx"
pub fn result_file_name(timestamp: NaiveDateTime, suffix: &str) -> String {
    format!("{} {}.xlsx", timestamp.format("%Y.%m.%d_%H-%M"), suffix.trim())
}

/// 写出结果工作簿
///
/// # 参数
/// - sheets: 结果表（按控制表顺序）
/// - path: 输出文件路径
pub fn write_result_workbook(sheets: &[ResultSheet], path: &Path) -> ExportResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::OutputDirectoryError {
            path: parent.display().to_string(),
            message: e.to_string(),
        })?;
    }

    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (&(row, col), cell) in &sheet.cells {
            let col16 = u16::try_from(col).map_err(|_| ExportError::ColumnOutOfRange {
                sheet: sheet.name.clone(),
                col,
            })?;
            write_cell(worksheet, row, col16, cell)?;
        }

        if sheet.freeze_rows > 0 {
            worksheet.set_freeze_panes(sheet.freeze_rows, 0)?;
        }
        if sheet.autofit_columns {
            worksheet.autofit();
        }
        debug!(sheet = %sheet.name, cells = sheet.cells.len(), "结果表写出");
    }

    workbook.save(path)?;
    info!(path = %path.display(), sheets = sheets.len(), "结果工作簿已保存");
    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &ResultCell) -> ExportResult<()> {
    match cell {
        ResultCell::Formula(formula) => {
            worksheet.write_formula(row, col, formula.as_str())?;
        }
        ResultCell::Value { value, format } => {
            write_value(worksheet, row, col, value, *format)?;
        }
    }
    Ok(())
}

fn write_value(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    format: DisplayFormat,
) -> ExportResult<()> {
    let cell_format = format
        .num_format()
        .map(|num_format| Format::new().set_num_format(num_format));

    match value {
        CellValue::Number(n) => match &cell_format {
            Some(f) => worksheet.write_number_with_format(row, col, *n, f)?,
            None => worksheet.write_number(row, col, *n)?,
        },
        CellValue::DateTime(dt) => {
            let date_format = cell_format.unwrap_or_else(|| {
                Format::new().set_num_format(crate::domain::types::DATETIME_NUM_FORMAT)
            });
            worksheet.write_datetime_with_format(row, col, dt, &date_format)?
        }
        CellValue::Boolean(b) => worksheet.write_boolean(row, col, *b)?,
        CellValue::Text(s) => worksheet.write_string(row, col, s.as_str())?,
    };
    Ok(())
}
