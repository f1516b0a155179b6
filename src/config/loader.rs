//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_settings, Settings};
use crate::error::{Result, SettingsError};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait SettingsLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Settings>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Settings>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<Settings>` - 加载的配置或错误
    async fn load_from_string(&self, content: &str) -> Result<Settings>;

    /// 验证配置
    fn validate(&self, settings: &Settings) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlSettingsLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlSettingsLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR_NAME}` 环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| SettingsError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(SettingsError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    fn parse_toml(&self, content: &str) -> Result<Settings> {
        let processed_content = self.substitute_env_vars(content)?;

        let settings: Settings = toml::from_str(&processed_content)
            .map_err(|e| SettingsError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(settings)
    }
}

impl Default for TomlSettingsLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl SettingsLoader for TomlSettingsLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Settings> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SettingsError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SettingsError::ParseError(format!("读取文件失败: {}", e)))?;

        let settings = self.parse_toml(&content)?;
        self.validate(&settings)?;

        log::info!("成功加载配置文件: {}", path.display());

        Ok(settings)
    }

    async fn load_from_string(&self, content: &str) -> Result<Settings> {
        let settings = self.parse_toml(content)?;
        self.validate(&settings)?;

        log::debug!("成功解析配置字符串");

        Ok(settings)
    }

    fn validate(&self, settings: &Settings) -> Result<()> {
        validate_settings(settings).map_err(|e| SettingsError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 `table-config.toml`，否则使用用户配置目录
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from("table-config.toml");
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("table-config").join("config.toml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    const TEST_SETTINGS_TOML: &str = r#"
[database]
host = "db.internal"
port = 3307
username = "app"
schema = "settings"
table = "app_config"

[reload]
interval_seconds = 30
"#;

    const TEST_SETTINGS_WITH_ENV_VARS: &str = r#"
[database]
password = "${TABLE_CONFIG_TEST_PASSWORD}"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlSettingsLoader::new(false);
        let settings = loader.load_from_string(TEST_SETTINGS_TOML).await.unwrap();

        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.database.port, 3307);
        assert_eq!(settings.database.table, "app_config");
        assert_eq!(settings.reload.interval_seconds, 30);
        // 未填写的部分使用默认值
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.logging.level, "info");
    }

    #[tokio::test]
    async fn test_empty_content_uses_defaults() {
        let loader = TomlSettingsLoader::new(false);
        let settings = loader.load_from_string("").await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("TABLE_CONFIG_TEST_PASSWORD", "s3cret");

        let loader = TomlSettingsLoader::new(true);
        let settings = loader
            .load_from_string(TEST_SETTINGS_WITH_ENV_VARS)
            .await
            .unwrap();
        assert_eq!(settings.database.password, "s3cret");

        env::remove_var("TABLE_CONFIG_TEST_PASSWORD");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("TABLE_CONFIG_TEST_PASSWORD");

        let loader = TomlSettingsLoader::new(true);
        let result = loader.load_from_string(TEST_SETTINGS_WITH_ENV_VARS).await;

        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("TABLE_CONFIG_TEST_PASSWORD"));
        }
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let loader = TomlSettingsLoader::new(false);
        let result = loader
            .load_from_string("[database]\ntable = \"config; --\"\n")
            .await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("无效的配置表名"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_SETTINGS_TOML.as_bytes()).unwrap();

        let loader = TomlSettingsLoader::new(false);
        let settings = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(settings.database.username, "app");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlSettingsLoader::new(false);
        let result = loader.load_from_file("/nonexistent/table-config.toml").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlSettingsLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().contains("table-config"));
    }
}
