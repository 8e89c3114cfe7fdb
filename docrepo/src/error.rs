//! 数据访问层统一错误定义
//!
//! 区分调用方需要分别处理的几类失败：文档不存在、配置错误、参数非法、
//! 底层存储传输失败。核心层不做重试，也不吞掉任何错误。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RepoError {
    // --- 存储语义 ---
    #[error("not found: {reason}")]
    NotFound { reason: String },
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    // --- 调用方/配置 ---
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // --- 基础设施 ---
    #[error("transport failure: {reason}")]
    Transport { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// 统一 Result 类型别名
pub type RepoResult<T> = Result<T, RepoError>;

impl RepoError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// 批量删除重试时，调用方可将 NotFound 视为成功的空操作
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinct_from_transport() {
        assert!(RepoError::not_found("doc-1").is_not_found());
        assert!(!RepoError::transport("throttled").is_not_found());
    }

    #[test]
    fn display_carries_reason() {
        let err = RepoError::invalid_argument("top(0)");
        assert_eq!(err.to_string(), "invalid argument: top(0)");
    }
}
