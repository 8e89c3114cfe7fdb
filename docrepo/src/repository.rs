//! 通用仓储（Repository）
//!
//! 针对某一实体类型、绑定某一容器名的无状态中介：
//! 通过注册表解析容器句柄，发起存储调用，再用工厂方法把返回的文档包装成实体。
//! 仓储从不在调用之间持有实体实例。
//!
use crate::{
    document::Document,
    entity::DocumentEntity,
    error::{RepoError, RepoResult as Result},
    query::{FeedOptions, SqlQuerySpec},
    registry::ConnectionRegistry,
    store::ContainerHandle,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 批量删除时两次删除之间的默认间隔
pub const DEFAULT_REMOVE_DELAY: Duration = Duration::from_millis(100);

pub const ALL_QUERY: &str = "SELECT * FROM c";
pub const TOP_QUERY: &str = "SELECT TOP ? * FROM c";
pub const LAST_QUERY: &str = "SELECT TOP ? * FROM c ORDER BY c._ts DESC";

#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: DocumentEntity;

    /// 绑定的容器名
    const CONTAINER: &'static str;

    /// 共享的连接注册表
    fn registry(&self) -> &ConnectionRegistry;

    /// 实体工厂：构造绑定的实体类型，可选地以部分文档作为初始数据
    fn new_entity(&self, data: Option<&Document>) -> Result<Self::Entity>;

    fn container(&self) -> Result<Arc<dyn ContainerHandle>> {
        self.registry().container(Self::CONTAINER)
    }

    /// 将存储返回的文档包装为实体
    fn wrap(&self, document: &Document) -> Result<Self::Entity> {
        let mut entity = self.new_entity(None)?;
        entity.hydrate_document(document)?;
        Ok(entity)
    }

    /// 执行查询；给出位置参数时，`?` 按出现顺序绑定为命名参数
    async fn query(&self, query: &str, parameters: Option<&[Value]>) -> Result<Vec<Self::Entity>> {
        let spec = match parameters {
            Some(values) => SqlQuerySpec::positional(query, values)?,
            None => SqlQuerySpec::new(query),
        };

        let container = self.container()?;
        debug!(
            container = Self::CONTAINER,
            query = %spec.query,
            parameters = spec.parameters.len(),
            "Executing query"
        );

        let documents = container.query(&spec, &FeedOptions::optimized()).await?;
        documents.iter().map(|doc| self.wrap(doc)).collect()
    }

    async fn all(&self) -> Result<Vec<Self::Entity>> {
        self.query(ALL_QUERY, None).await
    }

    async fn top(&self, n: i64) -> Result<Vec<Self::Entity>> {
        ensure_positive(n)?;
        let parameters = [Value::from(n)];
        self.query(TOP_QUERY, Some(parameters.as_slice())).await
    }

    /// 按存储的修改序列倒序取最近 n 条
    async fn last(&self, n: i64) -> Result<Vec<Self::Entity>> {
        ensure_positive(n)?;
        let parameters = [Value::from(n)];
        self.query(LAST_QUERY, Some(parameters.as_slice())).await
    }

    async fn top_one(&self) -> Result<Option<Self::Entity>> {
        Ok(self.top(1).await?.into_iter().next())
    }

    async fn last_one(&self) -> Result<Option<Self::Entity>> {
        Ok(self.last(1).await?.into_iter().next())
    }

    /// 按 id 点读；不存在时返回 `NotFound`
    async fn find(&self, id: &str) -> Result<Self::Entity> {
        let container = self.container()?;
        let document = container.read(id).await?;
        self.wrap(&document)
    }

    /// 以 `data` 构造实体并创建文档；标识与时间戳以存储返回为准
    async fn create(&self, data: &Document) -> Result<Self::Entity> {
        let mut entity = self.new_entity(Some(data))?;
        let stored = self.create_document(entity.export_document()?).await?;
        entity.hydrate_document(&stored)?;
        Ok(entity)
    }

    /// 创建原语：提交新文档并返回存储补全后的文档
    async fn create_document(&self, document: Document) -> Result<Document> {
        let container = self.container()?;
        debug!(container = Self::CONTAINER, "Creating document");
        container.create(document).await
    }

    /// 吸收 `data` 后整体替换存储中的文档
    ///
    /// 分区值在吸收之后读取：若 `data` 修改了分区字段，替换使用新值。
    /// 成功后 `entity` 即为存储中的最新状态，因此不再另行返回实体。
    async fn update(&self, entity: &mut Self::Entity, data: &Document) -> Result<()> {
        entity.absorb_document(data)?;

        let id = require_id(entity, "update")?;
        let partition = entity.partition_value()?;
        let document = entity.export_document()?;

        let container = self.container()?;
        debug!(container = Self::CONTAINER, id = %id, "Replacing document");
        let stored = container.replace(&id, &partition, document).await?;
        entity.hydrate_document(&stored)
    }

    /// 删除文档，并将实体清为空状态
    async fn remove(&self, entity: &mut Self::Entity) -> Result<()> {
        let id = require_id(entity, "remove")?;
        let partition = entity.partition_value()?;

        let container = self.container()?;
        debug!(container = Self::CONTAINER, id = %id, "Deleting document");
        container.delete(&id, &partition).await?;
        entity.reset_to_empty();
        Ok(())
    }

    /// 逐条删除容器中的全部文档，每两次删除之间暂停 `delay`
    ///
    /// 非事务：遇到第一个失败即中止并返回该错误，已删除的不会回滚。
    async fn remove_all(&self, delay: Duration) -> Result<usize> {
        let entities = self.all().await?;
        let total = entities.len();
        let mut removed = 0;

        for mut entity in entities {
            debug!(
                container = Self::CONTAINER,
                id = entity.id().unwrap_or_default(),
                "Removing document"
            );
            self.remove(&mut entity).await?;
            removed += 1;
            if removed < total {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(removed)
    }
}

fn ensure_positive(n: i64) -> Result<()> {
    if n < 1 {
        return Err(RepoError::invalid_argument(format!(
            "expected a positive item count, got {n}"
        )));
    }
    Ok(())
}

fn require_id<E: DocumentEntity>(entity: &E, operation: &str) -> Result<String> {
    entity.id().map(str::to_string).ok_or_else(|| {
        RepoError::invalid_argument(format!(
            "cannot {operation} an entity that has no id; persist it first"
        ))
    })
}
