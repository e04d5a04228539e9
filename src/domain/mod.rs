// ==========================================
// Excel 汇总工具 - 领域模型层
// ==========================================
// 职责: 定义单元格值、控制表、结果表等领域类型
// 红线: 不含文件读写逻辑,不含引擎逻辑
// ==========================================

pub mod control;
pub mod result;
pub mod table;
pub mod types;

// 重导出核心类型
pub use control::{
    CellTarget, ControlDirective, ControlSheet, IgnoreReason, ScannedRow, SheetConfig,
    DEFAULT_DECIMAL_PRECISION,
};
pub use result::{
    AggregationOutput, AggregationReport, CellOutcome, ResultCell, ResultSheet, RowOutcome,
    RunStats, SkipReason,
};
pub use table::DataTable;
pub use types::{CellValue, DisplayFormat, RawValue};
