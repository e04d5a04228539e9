// ==========================================
// Excel 汇总工具 - 配置层
// ==========================================
// 职责: 部署级配置（表头布局、控制表定位、解析区域、输出）
// 存储: JSON 文件 + 环境变量覆写
// ==========================================

pub mod aggregator_config;
pub mod locale;

// 重导出核心配置类型
pub use aggregator_config::{
    AggregatorConfig, ConfigError, ControlConfig, LayoutConfig, OutputConfig, ParsingConfig,
    CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
pub use locale::LocaleProfile;
