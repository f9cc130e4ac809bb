//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TETHER__*` 覆盖（双下划线表示嵌套，
//! 如 `TETHER__STORAGE__BACKEND=file`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub tracking: TrackingSection,
    #[serde(default)]
    pub lifecycle: LifecycleSection,
}

/// [storage] 段：注册表落盘位置与后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// 未设置时按后端用 ./anchors.db 或 ./anchors.json
    pub path: Option<PathBuf>,
    /// "sqlite"（默认）或 "file"
    #[serde(default = "default_backend")]
    pub backend: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: None,
            backend: default_backend(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

/// [tracking] 段：对子系统等待的可选上界；不设置即跟随子系统默认
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TrackingSection {
    /// 创建确认的有界超时（秒）；属于增强行为，默认关闭
    pub creation_timeout_secs: Option<u64>,
    /// 批量解析的有界超时（秒）；属于增强行为，默认关闭
    pub resolve_timeout_secs: Option<u64>,
}

/// [lifecycle] 段：重载并发控制
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleSection {
    /// 同时在途的重定位数量上限（按标识仍是至多一次）
    #[serde(default = "default_max_concurrent_localizations")]
    pub max_concurrent_localizations: usize,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            max_concurrent_localizations: default_max_concurrent_localizations(),
        }
    }
}

fn default_max_concurrent_localizations() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageSection::default(),
            tracking: TrackingSection::default(),
            lifecycle: LifecycleSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TETHER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TETHER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TETHER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.storage.backend, "sqlite");
        assert_eq!(cfg.tracking.creation_timeout_secs, None);
        assert_eq!(cfg.lifecycle.max_concurrent_localizations, 8);
    }
}
