use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;
use std::path::PathBuf;

use crate::param::MAX_INCLUDES;

/// 未通过环境变量指定配置文件时使用的默认路径
pub const DEFAULT_CONFIG_PATH: &str = "config/webscript.toml";

/// 指定配置文件路径的环境变量
pub const CONFIG_ENV_VAR: &str = "WEBSCRIPT_CONFIG";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_session_dir")]
    session_dir: String,
    #[serde(default = "default_max_includes")]
    max_includes: usize,
    #[serde(default = "default_template_extensions")]
    template_extensions: Vec<String>,
    #[serde(default = "default_log_config")]
    log_config: String,
    #[serde(default)]
    document_root: Option<String>,
}

fn default_session_dir() -> String {
    "/tmp".to_string()
}

fn default_max_includes() -> usize {
    MAX_INCLUDES
}

/// 默认按模板处理的 include 扩展名
pub fn default_template_extensions() -> Vec<String> {
    vec!["jst".to_string()]
}

fn default_log_config() -> String {
    "config/log4rs.yaml".to_string()
}

impl Config {
    pub fn new() -> Self {
        Self {
            session_dir: default_session_dir(),
            max_includes: default_max_includes(),
            template_extensions: default_template_extensions(),
            log_config: default_log_config(),
            document_root: None,
        }
    }

    /// 从 TOML 文件构建配置。
    ///
    /// CGI 进程没有机会向管理员报错，所以文件缺失或格式错误时只记录日志并退回默认配置。
    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                warn!("无法打开配置文件{}：{}，使用默认配置", filename, e);
                return Config::new();
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}失败：{}，使用默认配置", filename, e);
            return Config::new();
        }

        let mut raw_config: Config = match toml::from_str(&str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象（{}），使用默认配置", e);
                Config::new()
            }
        };
        if raw_config.max_includes == 0 {
            warn!("max_includes被设置为0，这会禁用所有include，该值将被改为{}。", MAX_INCLUDES);
            raw_config.max_includes = MAX_INCLUDES;
        }
        if raw_config.template_extensions.is_empty() {
            warn!("template_extensions为空，将使用默认值。");
            raw_config.template_extensions = default_template_extensions();
        }
        raw_config
    }

    /// 按 `WEBSCRIPT_CONFIG` 环境变量或默认路径加载配置
    pub fn load(config_path: Option<String>) -> Self {
        let path = config_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::from_toml(&path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn session_dir(&self) -> &str {
        &self.session_dir
    }

    pub fn max_includes(&self) -> usize {
        self.max_includes
    }

    pub fn template_extensions(&self) -> &[String] {
        &self.template_extensions
    }

    pub fn log_config(&self) -> &str {
        &self.log_config
    }

    pub fn document_root(&self) -> Option<PathBuf> {
        self.document_root.as_ref().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert_eq!(config.session_dir(), "/tmp");
        assert_eq!(config.max_includes(), 16);
        assert_eq!(config.template_extensions(), &["jst".to_string()]);
        assert!(config.document_root().is_none());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Config::from_toml("/nonexistent/webscript.toml");
        assert_eq!(config.session_dir(), "/tmp");
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "session_dir = \"/var/lib/webscript\"").unwrap();
        writeln!(file, "document_root = \"/srv/www\"").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap());
        assert_eq!(config.session_dir(), "/var/lib/webscript");
        assert_eq!(config.document_root(), Some(PathBuf::from("/srv/www")));
        assert_eq!(config.max_includes(), 16);
        assert_eq!(config.log_config(), "config/log4rs.yaml");
    }

    #[test]
    fn test_zero_max_includes_is_corrected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_includes = 0").unwrap();
        writeln!(file, "template_extensions = []").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap());
        assert_eq!(config.max_includes(), 16);
        assert_eq!(config.template_extensions(), &["jst".to_string()]);
    }

    #[test]
    fn test_invalid_toml_falls_back_to_default() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_includes = \"many\"").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap());
        assert_eq!(config.max_includes(), 16);
    }
}
