//! 连接注册表（ConnectionRegistry）
//!
//! 持有一个客户端句柄、一个数据库句柄，以及按容器名缓存的容器句柄。
//! 在启动时构造并 `configure` 一次，以 `Arc<ConnectionRegistry>` 的形式
//! 显式传入每个仓储；不使用隐藏的全局单例。
//!
//! 缓存的“查不到就打开”由 `DashMap::entry` 保证原子性：
//! 并发首次访问同一容器名时只会打开一次，所有调用方拿到同一个句柄。

use crate::{
    config::{ConnectionConfig, mask_connection_string},
    error::{RepoError, RepoResult as Result},
    store::{ContainerHandle, Connector, DocumentClient, DocumentDatabase},
};
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

struct Connection {
    client: Arc<dyn DocumentClient>,
    database: Arc<dyn DocumentDatabase>,
}

/// 连接与容器句柄注册表
#[derive(Default)]
pub struct ConnectionRegistry {
    connection: RwLock<Option<Connection>>,
    containers: DashMap<String, Arc<dyn ContainerHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构造并立即完成配置
    pub fn configured(config: &ConnectionConfig, connector: &dyn Connector) -> Result<Arc<Self>> {
        let registry = Self::new();
        registry.configure(config, connector)?;
        Ok(Arc::new(registry))
    }

    /// 打开客户端与数据库句柄，并预先打开配置中列出的容器
    ///
    /// 重复调用会替换句柄并清空旧数据库的容器缓存。
    pub fn configure(&self, config: &ConnectionConfig, connector: &dyn Connector) -> Result<()> {
        info!(
            connection = %mask_connection_string(&config.connection_string),
            database = %config.database,
            "Configuring document store connection"
        );

        let client = connector.connect(&config.connection_string)?;
        let database = client.database(&config.database);

        {
            let mut slot = self
                .connection
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                warn!(
                    database = %config.database,
                    cached = self.containers.len(),
                    "Connection registry reconfigured; dropping cached containers"
                );
            }
            *slot = Some(Connection { client, database });
            self.containers.clear();
        }

        for name in &config.containers {
            self.container(name)?;
        }

        Ok(())
    }

    /// 取缓存的容器句柄，首次访问时打开并缓存
    pub fn container(&self, name: &str) -> Result<Arc<dyn ContainerHandle>> {
        if let Some(handle) = self.containers.get(name) {
            return Ok(Arc::clone(handle.value()));
        }

        let database = self.database()?;
        let handle = self
            .containers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(container = name, database = database.name(), "Opening container");
                database.container(name)
            });

        Ok(Arc::clone(handle.value()))
    }

    pub fn client(&self) -> Result<Arc<dyn DocumentClient>> {
        self.with_connection(|c| Arc::clone(&c.client))
    }

    pub fn database(&self) -> Result<Arc<dyn DocumentDatabase>> {
        self.with_connection(|c| Arc::clone(&c.database))
    }

    pub fn is_configured(&self) -> bool {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 已缓存的容器名（只读视图）
    pub fn cached_containers(&self) -> Vec<String> {
        self.containers.iter().map(|e| e.key().clone()).collect()
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> Result<T> {
        let slot = self
            .connection
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(f).ok_or_else(|| {
            RepoError::configuration("connection registry used before configure() was called")
        })
    }
}
