use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// 从 TOML 文件加载配置
///
/// - 文件不存在：返回 `T::default()`
/// - 文件存在但解析失败：返回错误
pub fn load_toml_config<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("config file {} not found, use default", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path).with_context(|| format!("read config file: {}", path.display()))?;
    let config = parse_toml_config(&content).with_context(|| format!("parse config file: {}", path.display()))?;
    log::info!("load config from {}", path.display());
    Ok(config)
}

pub fn parse_toml_config<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    Ok(toml::from_str(content)?)
}

/// 读取形如 `0|1|true|false` 的环境变量
pub fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize, Default, Debug, PartialEq)]
    #[serde(default)]
    struct Demo {
        width: u32,
        title: String,
    }

    #[test]
    fn test_parse_partial_config() {
        let demo: Demo = parse_toml_config("width = 42").unwrap();
        assert_eq!(
            demo,
            Demo {
                width: 42,
                title: String::new()
            }
        );
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(parse_toml_config::<Demo>("width = \"abc\"").is_err());
    }

    #[test]
    fn test_missing_file_gives_default() {
        let demo: Demo = load_toml_config("/definitely/not/here/mesh-viewer.toml").unwrap();
        assert_eq!(demo, Demo::default());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" False "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
