// ==========================================
// Excel 汇总工具 - 导出层
// ==========================================
// 职责: 内存结果表 → 结果工作簿文件
// 工具: rust_xlsxwriter
// ==========================================

pub mod error;
pub mod xlsx_writer;

pub use error::{ExportError, ExportResult};
pub use xlsx_writer::{result_file_name, write_result_workbook};
