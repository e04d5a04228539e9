// ==========================================
// Excel 汇总工具 - 运行配置
// ==========================================
// 职责: 部署级配置的加载、默认值与校验
// 存储: JSON 文件（可缺省,缺省时全部使用默认值）
// ==========================================

use crate::config::locale::{LocaleProfile, INVARIANT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// 配置文件路径环境变量
pub const CONFIG_ENV_VAR: &str = "EXCEL_AGGREGATOR_CONFIG";

/// 工作目录下的配置文件名
pub const CONFIG_FILE_NAME: &str = "excel_aggregator.json";

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败 ({path}): {message}")]
    ReadError { path: String, message: String },

    #[error("配置文件格式错误 ({path}): {message}")]
    ParseError { path: String, message: String },

    #[error("配置值非法 (key: {key}): {message}")]
    InvalidValue { key: String, message: String },
}

// ==========================================
// AggregatorConfig - 顶层配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub layout: LayoutConfig,
    pub control: ControlConfig,
    pub parsing: ParsingConfig,
    pub output: OutputConfig,
}

/// 控制表布局
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// 表头行数（不参与指令扫描）
    pub header_rows: u32,
    /// 配置行数（不复制到结果表）
    pub config_rows: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            header_rows: 3,
            config_rows: 2,
        }
    }
}

/// 控制工作簿定位规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub file_prefix: String,
    pub file_extension: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            file_prefix: "control_".to_string(),
            file_extension: "xlsx".to_string(),
        }
    }
}

/// 文本解析区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub operator_locale: String,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            operator_locale: "ru-RU".to_string(),
        }
    }
}

/// 结果输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 输出目录（None 时使用工作目录）
    pub directory: Option<PathBuf>,
    /// 强制所有结果表自动调整列宽
    pub autofit_columns: bool,
    /// 结果文件名后缀（时间戳之后）
    pub file_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            autofit_columns: false,
            file_suffix: "EA result".to_string(),
        }
    }
}

impl AggregatorConfig {
    /// 从 JSON 文本解析并校验
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AggregatorConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载并校验
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: AggregatorConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 按查找顺序加载配置
    ///
    /// # 查找顺序
    /// 1. 环境变量 EXCEL_AGGREGATOR_CONFIG
    /// 2. <work_dir>/excel_aggregator.json
    /// 3. 用户配置目录/excel-aggregator/config.json
    /// 4. 内置默认值
    pub fn load(work_dir: &Path) -> Result<Self, ConfigError> {
        let env_value = std::env::var(CONFIG_ENV_VAR).ok();
        match resolve_config_path(work_dir, env_value.as_deref(), dirs::config_dir()) {
            Some(path) => {
                debug!(path = %path.display(), "加载配置文件");
                Self::from_file(&path)
            }
            None => {
                debug!("未找到配置文件，使用默认配置");
                Ok(Self::default())
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layout.header_rows == 0 {
            return Err(ConfigError::InvalidValue {
                key: "layout.header_rows".to_string(),
                message: "表头行数必须大于 0".to_string(),
            });
        }
        if self.layout.config_rows > self.layout.header_rows {
            return Err(ConfigError::InvalidValue {
                key: "layout.config_rows".to_string(),
                message: format!(
                    "配置行数 {} 不能超过表头行数 {}",
                    self.layout.config_rows, self.layout.header_rows
                ),
            });
        }
        if self.control.file_extension.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "control.file_extension".to_string(),
                message: "扩展名不能为空".to_string(),
            });
        }
        Ok(())
    }

    /// 操作员区域; 未知名称回退为不变区域
    pub fn operator_locale(&self) -> &'static LocaleProfile {
        match LocaleProfile::by_name(&self.parsing.operator_locale) {
            Some(profile) => profile,
            None => {
                warn!(
                    locale = %self.parsing.operator_locale,
                    "未知区域设置，回退为 invariant"
                );
                &INVARIANT
            }
        }
    }
}

/// 计算配置文件路径（只返回实际存在的文件; 环境变量指定的路径总是返回）
fn resolve_config_path(
    work_dir: &Path,
    env_value: Option<&str>,
    user_config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(value) = env_value {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let local = work_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    user_config_dir
        .map(|dir| dir.join("excel-aggregator").join("config.json"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AggregatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layout.header_rows, 3);
        assert_eq!(config.layout.config_rows, 2);
        assert_eq!(config.operator_locale().name, "ru-RU");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            AggregatorConfig::from_json_str(r#"{ "layout": { "header_rows": 6 } }"#).unwrap();
        assert_eq!(config.layout.header_rows, 6);
        assert_eq!(config.layout.config_rows, 2);
        assert_eq!(config.output.file_suffix, "EA result");
    }

    #[test]
    fn test_config_rows_exceeding_header_rows_is_rejected() {
        let result = AggregatorConfig::from_json_str(
            r#"{ "layout": { "header_rows": 2, "config_rows": 3 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_locale_falls_back_to_invariant() {
        let mut config = AggregatorConfig::default();
        config.parsing.operator_locale = "tlh-KL".to_string();
        assert_eq!(config.operator_locale().name, "invariant");
    }

    #[test]
    fn test_resolve_config_path_order() {
        let work_dir = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();

        assert_eq!(
            resolve_config_path(work_dir.path(), None, Some(user_dir.path().to_path_buf())),
            None
        );

        let user_file = user_dir.path().join("excel-aggregator").join("config.json");
        std::fs::create_dir_all(user_file.parent().unwrap()).unwrap();
        std::fs::write(&user_file, "{}").unwrap();
        assert_eq!(
            resolve_config_path(work_dir.path(), None, Some(user_dir.path().to_path_buf())),
            Some(user_file.clone())
        );

        let local_file = work_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&local_file, "{}").unwrap();
        assert_eq!(
            resolve_config_path(work_dir.path(), None, Some(user_dir.path().to_path_buf())),
            Some(local_file)
        );

        assert_eq!(
            resolve_config_path(work_dir.path(), Some("/etc/ea.json"), None),
            Some(PathBuf::from("/etc/ea.json"))
        );
    }
}
