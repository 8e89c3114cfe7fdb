//! 文档存储协议
//!
//! 核心层消费的最小存储接口：客户端、数据库、容器三级句柄，
//! 以及容器上的查询、点读、创建、替换与删除原语。
//! 具体数据库客户端由上层实现并注入；`memory` 模块提供内存实现。
//!
use crate::{
    document::Document,
    error::RepoResult as Result,
    query::{FeedOptions, SqlQuerySpec},
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// 由连接串建立客户端
pub trait Connector: Send + Sync {
    fn connect(&self, connection_string: &str) -> Result<Arc<dyn DocumentClient>>;
}

/// 已连接的客户端
pub trait DocumentClient: Send + Sync {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase>;
}

/// 数据库句柄
pub trait DocumentDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// 打开容器句柄（无状态代理，可重复调用）
    fn container(&self, name: &str) -> Arc<dyn ContainerHandle>;
}

/// 容器句柄：所有方法都是一次存储往返
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    fn name(&self) -> &str;

    /// 执行查询，完整物化结果，保持存储返回的顺序
    async fn query(&self, spec: &SqlQuerySpec, options: &FeedOptions) -> Result<Vec<Document>>;

    /// 按 id 点读，不存在时返回 `NotFound`
    async fn read(&self, id: &str) -> Result<Document>;

    /// 创建文档，返回存储补全后的文档（id、元数据等）
    async fn create(&self, document: Document) -> Result<Document>;

    /// 替换 `(id, partition)` 处的文档
    async fn replace(&self, id: &str, partition: &Value, document: Document) -> Result<Document>;

    /// 删除 `(id, partition)` 处的文档，不存在时返回 `NotFound`
    async fn delete(&self, id: &str, partition: &Value) -> Result<()>;
}
