// ==========================================
// Excel 汇总工具 - 导出模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("结果工作簿写出失败: {0}")]
    XlsxWriteError(String),

    #[error("列号超出范围 (工作表 {sheet}): {col}")]
    ColumnOutOfRange { sheet: String, col: u32 },

    #[error("输出目录不可用 ({path}): {message}")]
    OutputDirectoryError { path: String, message: String },
}

// 实现 From<rust_xlsxwriter::XlsxError>
impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::XlsxWriteError(err.to_string())
    }
}

/// Result 类型别名
pub type ExportResult<T> = Result<T, ExportError>;
