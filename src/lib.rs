// ==========================================
// Excel 汇总工具 - 核心库
// ==========================================
// 系统定位: 控制表驱动的单元格抽取与汇总
// 流程: 控制表 → 指令 → 源文件定位 → 取值 → 类型推断 → 结果工作簿
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 数据类型
pub mod domain;

// 导入层 - 源文件与控制工作簿读取
pub mod importer;

// 引擎层 - 解析/定位/取值/推断/编排
pub mod engine;

// 导出层 - 结果工作簿写出
pub mod export;

// 配置层 - 部署配置与区域设置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    AggregationReport, CellValue, ControlDirective, ControlSheet, DataTable, DisplayFormat,
    RawValue, ResultCell, ResultSheet, RunStats, SheetConfig,
};

// 引擎
pub use engine::{
    AggregationOrchestrator, CellValueExtractor, DirectiveParser, EngineError, EngineResult,
    FileResolver, ProgressSink, ValueCoercer, WorkbookCache,
};

// 配置
pub use config::AggregatorConfig;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "Excel 汇总工具";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
