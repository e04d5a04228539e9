// ==========================================
// Excel 汇总工具 - 导入层
// ==========================================
// 职责: 读取控制工作簿与源文件,生成内部数据表
// 支持: Excel (calamine), CSV
// ==========================================

// 模块声明
pub mod control_reader;
pub mod error;
pub mod file_parser;
pub mod source_reader_trait;

// 重导出核心类型
pub use control_reader::ControlWorkbookReader;
pub use error::{ImportError, ImportResult};
pub use file_parser::{
    find_sheet_name, formula_map, lowercase_extension, raw_value_from_data, table_from_range,
    CalamineSourceReader, CsvSourceReader, UniversalSourceReader,
};

// 重导出 Trait 接口
pub use source_reader_trait::{ControlReader, SourceReader};
