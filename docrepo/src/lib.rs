//! 文档存储数据访问层（docrepo）
//!
//! 在分区键、无模式的文档存储之上提供实体/仓储抽象，使应用无需为每种实体
//! 编写持久化代码：
//! - 实体（`entity`）：标识、时间戳、分区键，以及与文档之间的导出/吸收；
//! - 仓储（`repository`）：增删改查、参数化查询与批量删除；
//! - 连接注册表（`registry`）：一次配置、全局共享的客户端与容器句柄缓存；
//! - 查询参数转换（`query`）：位置参数到命名参数的改写；
//! - 存储协议（`store`）与内存实现（`memory`）。
//!
//! 典型用法：
//! 1. 用 `#[document_entity(partition_key = "...")]` 声明实体；
//! 2. 为实体实现 `Repository`（容器名与工厂方法）与 `Persist`；
//! 3. 启动时构造 `ConnectionRegistry` 并 `configure` 一次，以 `Arc` 传入各仓储。
//!
//! 这不是 ORM：不提供联表、事务、迁移或模式校验，也不做乐观并发控制。
//!
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod memory;
pub mod query;
pub mod registry;
pub mod repository;
pub mod store;

pub use config::ConnectionConfig;
pub use document::Document;
pub use entity::{DocumentEntity, EntityMeta, Persist};
pub use error::{RepoError, RepoResult};
pub use registry::ConnectionRegistry;
pub use repository::{DEFAULT_REMOVE_DELAY, Repository};

// 允许在本 crate 内部通过 ::docrepo 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::docrepo 路径。
extern crate self as docrepo;
