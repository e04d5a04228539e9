// ==========================================
// Excel 汇总工具 - 引擎层错误类型
// ==========================================
// 说明: 只有配置级错误是致命的; 行内错误在行边界被转换为 RowOutcome::Skipped
// ==========================================

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::importer::ImportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 非致命（单元格级）=====
    #[error("单元格地址非法: {0}")]
    MalformedAddress(String),

    // ===== 致命（运行级）=====
    #[error("控制文件 {pattern} 未找到: {dir}")]
    ControlWorkbookNotFound { dir: String, pattern: String },

    #[error("控制文件读取失败 ({path}): {message}")]
    ControlWorkbookUnreadable { path: String, message: String },

    #[error("处理已被中断")]
    Interrupted,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
