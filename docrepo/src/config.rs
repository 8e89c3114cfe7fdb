//! 连接配置
//!
//! 由上层在启动时提供（文件、环境变量等），核心层只负责消费。
//!
use bon::Builder;
use serde::{Deserialize, Serialize};

/// 连接配置
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// 连接串，例如 `AccountEndpoint=https://...;AccountKey=...;`
    #[builder(into)]
    pub connection_string: String,
    /// 数据库名
    #[builder(into)]
    pub database: String,
    /// 启动时预先打开并缓存的容器
    #[serde(default)]
    #[builder(default)]
    pub containers: Vec<String>,
}

/// 隐去连接串中的密钥部分，便于安全地写入日志
pub fn mask_connection_string(connection_string: &str) -> String {
    connection_string
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, _)) if key.trim().eq_ignore_ascii_case("AccountKey") => {
                format!("{key}=****")
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_containers() {
        let cfg = ConnectionConfig::builder()
            .connection_string("AccountEndpoint=memory://;")
            .database("app")
            .build();
        assert!(cfg.containers.is_empty());
    }

    #[test]
    fn deserializes_without_containers() {
        let cfg: ConnectionConfig = serde_json::from_value(serde_json::json!({
            "connection_string": "AccountEndpoint=memory://;",
            "database": "app"
        }))
        .unwrap();
        assert_eq!(cfg.database, "app");
        assert!(cfg.containers.is_empty());
    }

    #[test]
    fn masks_account_key() {
        assert_eq!(
            mask_connection_string("AccountEndpoint=https://x:443/;AccountKey=c2VjcmV0==;"),
            "AccountEndpoint=https://x:443/;AccountKey=****;"
        );
        assert_eq!(
            mask_connection_string("AccountEndpoint=memory://"),
            "AccountEndpoint=memory://"
        );
    }
}
