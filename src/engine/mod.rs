// ==========================================
// Excel 汇总工具 - 引擎层
// ==========================================
// 职责: 控制表解析、源文件定位、取值、类型推断与汇总编排
// 红线: 行级隔离,单行失败不得中断整次运行
// ==========================================

pub mod address;
pub mod coercer;
pub mod directive_parser;
pub mod error;
pub mod extractor;
pub mod file_resolver;
pub mod formula;
pub mod orchestrator;
pub mod progress;
pub mod workbook_cache;

// 重导出核心组件
pub use address::{column_index, column_letters, format_address, parse_address, CellPosition};
pub use coercer::{CoercedValue, ValueCoercer};
pub use directive_parser::{DirectiveParser, ParsedControlSheet};
pub use error::{EngineError, EngineResult};
pub use extractor::{is_formula_capable, CellValueExtractor};
pub use file_resolver::{is_valid_file_name, is_valid_path, FileResolver};
pub use formula::{evaluate, CellRef, CellResolver, FormulaError, FormulaValue};
pub use orchestrator::{locate_control_workbook, AggregationOrchestrator};
pub use progress::{percent, NoOpProgress, ProgressSink, RecordingProgress};
pub use workbook_cache::WorkbookCache;
