//! 实体（Entity）基础抽象
//!
//! 一个实体对应存储中的一篇文档，按能力拆分为两个 trait：
//! - `DocumentEntity`：可导出、可吸收、带分区键（exportable / absorbable / partitioned）；
//! - `Persist`：可持久化，知道自己归属的仓储（persistable）。
//!
//! 字段列表在编译期由 `#[document_entity]` 宏生成（`FIELDS`），
//! 标识、时间戳与最近一次存储快照等簿记信息集中在 `EntityMeta` 中，永不作为业务字段导出。
//!
use crate::{
    document::{
        CREATED_KEY, Document, ID_KEY, UPDATED_KEY, format_timestamp, parse_timestamp, str_field,
    },
    error::{RepoError, RepoResult as Result},
    registry::ConnectionRegistry,
    repository::Repository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// 实体簿记信息：标识、时间戳、最近一次存储快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMeta {
    id: Option<String>,
    create_datetime: Option<String>,
    update_datetime: Option<String>,
    raw: Option<Document>,
}

impl EntityMeta {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn create_datetime(&self) -> Option<&str> {
        self.create_datetime.as_deref()
    }

    pub fn update_datetime(&self) -> Option<&str> {
        self.update_datetime.as_deref()
    }

    pub fn raw(&self) -> Option<&Document> {
        self.raw.as_ref()
    }

    /// 首次触碰时写入创建时间，每次都刷新更新时间
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let stamp = format_timestamp(now);
        if self.create_datetime.is_none() {
            self.create_datetime = Some(stamp.clone());
        }
        self.update_datetime = Some(stamp);
    }

    // 来值优先，其次保留现值，否则保持未设置；快照整体替换
    fn merge(&mut self, document: &Document) {
        if let Some(id) = str_field(document, ID_KEY) {
            self.id = Some(id.to_string());
        }
        if let Some(at) = str_field(document, CREATED_KEY) {
            self.create_datetime = Some(at.to_string());
        }
        if let Some(at) = str_field(document, UPDATED_KEY) {
            self.update_datetime = Some(at.to_string());
        }
        self.raw = Some(document.clone());
    }

    fn write(&self, document: &mut Document) {
        if let Some(id) = &self.id {
            document.insert(ID_KEY.to_string(), Value::String(id.clone()));
        }
        if let Some(at) = &self.create_datetime {
            document.insert(CREATED_KEY.to_string(), Value::String(at.clone()));
        }
        if let Some(at) = &self.update_datetime {
            document.insert(UPDATED_KEY.to_string(), Value::String(at.clone()));
        }
    }
}

/// 可与文档互相转换、带分区键的实体
///
/// 通常由 `#[document_entity(partition_key = "...")]` 生成实现；手写实现时需保证
/// `merge_fields` 要么全部成功、要么不修改任何字段。
pub trait DocumentEntity: Default + Send + Sync + 'static {
    /// 分区键字段名（`"id"` 表示以标识分区）
    const PARTITION_KEY: &'static str;

    /// 导出的业务字段名（不含簿记字段）
    const FIELDS: &'static [&'static str];

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// 读取业务字段的文档值；名称不是业务字段时返回 None
    fn field_value(&self, name: &str) -> Option<Result<Value>>;

    /// 将业务字段写入文档（空值不写）
    fn write_fields(&self, document: &mut Document) -> Result<()>;

    /// 按三段回退合并业务字段：来值（非空）→ 现值 → 未设置
    fn merge_fields(&mut self, document: &Document) -> Result<()>;

    fn id(&self) -> Option<&str> {
        self.meta().id()
    }

    /// 最近一次从存储得到的完整文档
    fn raw(&self) -> Option<&Document> {
        self.meta().raw()
    }

    /// 分区键字段的当前值；字段不存在于实体上时返回 `Configuration` 错误
    fn partition_value(&self) -> Result<Value> {
        if Self::PARTITION_KEY == ID_KEY {
            return Ok(self.id().map_or(Value::Null, |id| Value::String(id.to_string())));
        }
        self.field_value(Self::PARTITION_KEY).unwrap_or_else(|| {
            Err(RepoError::configuration(format!(
                "partition key field '{}' is not a field of {}",
                Self::PARTITION_KEY,
                std::any::type_name::<Self>()
            )))
        })
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.meta().create_datetime().and_then(parse_timestamp)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.meta().update_datetime().and_then(parse_timestamp)
    }

    fn touch_timestamps(&mut self) {
        self.meta_mut().touch(Utc::now());
    }

    /// 导出为独立的文档值（非实时视图）
    fn export_document(&self) -> Result<Document> {
        let mut document = Document::new();
        self.meta().write(&mut document);
        self.write_fields(&mut document)?;
        Ok(document)
    }

    /// 吸收一篇文档并刷新时间戳
    fn absorb_document(&mut self, document: &Document) -> Result<()> {
        self.hydrate_document(document)?;
        self.touch_timestamps();
        Ok(())
    }

    /// 吸收存储返回的文档：合并语义与 `absorb_document` 相同，但不刷新时间戳，
    /// 使标识与时间戳完全以存储的响应为准
    fn hydrate_document(&mut self, document: &Document) -> Result<()> {
        self.merge_fields(document)?;
        self.meta_mut().merge(document);
        Ok(())
    }

    /// 默认值起步，可选地吸收一份部分数据
    fn from_partial(data: Option<&Document>) -> Result<Self> {
        let mut entity = Self::default();
        if let Some(data) = data {
            entity.absorb_document(data)?;
        }
        Ok(entity)
    }

    /// 删除后的状态：仍可使用的空实体，快照为空文档
    fn reset_to_empty(&mut self) {
        *self = Self::default();
        self.meta_mut().raw = Some(Document::new());
    }
}

/// 可持久化的实体：知道如何找到自己的仓储
#[async_trait]
pub trait Persist: DocumentEntity {
    type Repository: Repository<Entity = Self>;

    /// 由共享的注册表构造归属仓储
    fn repository(registry: &Arc<ConnectionRegistry>) -> Self::Repository;

    /// 有标识则更新，否则刷新时间戳、创建并吸收存储返回的文档
    ///
    /// 创建失败时标识与快照保持不变（时间戳已刷新）。
    /// 若存储已创建成功而吸收响应失败（`Serde`），文档已存在但实体仍无标识。
    async fn persist(&mut self, registry: &Arc<ConnectionRegistry>) -> Result<()> {
        let repository = Self::repository(registry);

        if self.id().is_some() {
            let document = self.export_document()?;
            return repository.update(self, &document).await;
        }

        self.touch_timestamps();
        let document = self.export_document()?;
        let stored = repository.create_document(document).await?;
        self.hydrate_document(&stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 手写实现，覆盖宏之外的路径
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        meta: EntityMeta,
        title: Option<String>,
        region: Option<String>,
    }

    impl DocumentEntity for Note {
        const PARTITION_KEY: &'static str = "region";
        const FIELDS: &'static [&'static str] = &["title", "region"];

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn field_value(&self, name: &str) -> Option<Result<Value>> {
            match name {
                "title" => Some(serde_json::to_value(&self.title).map_err(Into::into)),
                "region" => Some(serde_json::to_value(&self.region).map_err(Into::into)),
                _ => None,
            }
        }

        fn write_fields(&self, document: &mut Document) -> Result<()> {
            for name in Self::FIELDS {
                if let Some(value) = self.field_value(name).transpose()? {
                    if !value.is_null() {
                        document.insert(name.to_string(), value);
                    }
                }
            }
            Ok(())
        }

        fn merge_fields(&mut self, document: &Document) -> Result<()> {
            let take = |key: &str| -> Result<Option<Option<String>>> {
                match document.get(key) {
                    Some(v) if !v.is_null() => Ok(Some(serde_json::from_value(v.clone())?)),
                    _ => Ok(None),
                }
            };
            let title = take("title")?;
            let region = take("region")?;
            if let Some(v) = title {
                self.title = v;
            }
            if let Some(v) = region {
                self.region = v;
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Misconfigured {
        meta: EntityMeta,
    }

    impl DocumentEntity for Misconfigured {
        const PARTITION_KEY: &'static str = "tenant";
        const FIELDS: &'static [&'static str] = &[];

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn field_value(&self, _name: &str) -> Option<Result<Value>> {
            None
        }

        fn write_fields(&self, _document: &mut Document) -> Result<()> {
            Ok(())
        }

        fn merge_fields(&mut self, _document: &Document) -> Result<()> {
            Ok(())
        }
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn fresh_entity_has_no_identity_or_timestamps() {
        let note = Note::default();
        assert_eq!(note.id(), None);
        assert_eq!(note.created_at(), None);
        assert_eq!(note.updated_at(), None);
        assert_eq!(note.raw(), None);
    }

    #[test]
    fn touch_sets_created_once() {
        let mut meta = EntityMeta::default();
        let t0 = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let t1 = DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z").unwrap().with_timezone(&Utc);

        meta.touch(t0);
        assert_eq!(meta.create_datetime(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(meta.update_datetime(), Some("2024-01-01T00:00:00.000Z"));

        meta.touch(t1);
        assert_eq!(meta.create_datetime(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(meta.update_datetime(), Some("2024-01-02T00:00:00.000Z"));
    }

    #[test]
    fn updated_at_reads_the_update_stamp() {
        let mut note = Note::default();
        note.hydrate_document(&doc(json!({
            "create_datetime": "2024-01-01T00:00:00.000Z",
            "update_datetime": "2024-02-01T00:00:00.000Z"
        })))
        .unwrap();
        assert_eq!(note.created_at().unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(note.updated_at().unwrap().to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn absorb_applies_three_way_fallback() {
        let mut note = Note {
            title: Some("kept".into()),
            ..Default::default()
        };
        note.absorb_document(&doc(json!({ "title": null, "region": "eu", "_ts": 7 })))
            .unwrap();

        assert_eq!(note.title.as_deref(), Some("kept"));
        assert_eq!(note.region.as_deref(), Some("eu"));
        // 非业务键只保留在快照中
        assert_eq!(note.raw().unwrap().get("_ts"), Some(&json!(7)));
        assert!(!note.export_document().unwrap().contains_key("_ts"));
    }

    #[test]
    fn absorb_overwrites_id_only_when_present() {
        let mut note = Note::default();
        note.absorb_document(&doc(json!({ "id": "n-1" }))).unwrap();
        assert_eq!(note.id(), Some("n-1"));

        note.absorb_document(&doc(json!({ "title": "x" }))).unwrap();
        assert_eq!(note.id(), Some("n-1"));
        assert_eq!(note.raw(), Some(&doc(json!({ "title": "x" }))));
    }

    #[test]
    fn failed_absorb_leaves_entity_untouched() {
        let mut note = Note::default();
        note.absorb_document(&doc(json!({ "id": "n-1", "title": "a" })))
            .unwrap();
        let before = note.clone();

        let err = note
            .absorb_document(&doc(json!({ "id": "n-2", "title": "b", "region": 42 })))
            .unwrap_err();
        assert!(matches!(err, RepoError::Serde { .. }));
        assert_eq!(note, before);
    }

    #[test]
    fn export_contains_identity_timestamps_and_fields() {
        let mut note = Note::default();
        note.absorb_document(&doc(json!({ "id": "n-1", "title": "a" })))
            .unwrap();
        let exported = note.export_document().unwrap();

        assert_eq!(exported["id"], json!("n-1"));
        assert_eq!(exported["title"], json!("a"));
        assert!(exported.contains_key("create_datetime"));
        assert!(exported.contains_key("update_datetime"));
        // 未设置的字段不导出
        assert!(!exported.contains_key("region"));
    }

    #[test]
    fn round_trip_keeps_fields_and_advances_updated() {
        let mut note = Note::default();
        note.hydrate_document(&doc(json!({
            "id": "n-1",
            "title": "a",
            "region": "eu",
            "create_datetime": "2024-01-01T00:00:00.000Z",
            "update_datetime": "2024-01-01T00:00:00.000Z"
        })))
        .unwrap();
        let exported = note.export_document().unwrap();

        let mut copy = Note::default();
        copy.absorb_document(&exported).unwrap();

        assert_eq!(copy.id(), note.id());
        assert_eq!(copy.title, note.title);
        assert_eq!(copy.region, note.region);
        assert_eq!(copy.created_at(), note.created_at());
        assert!(copy.updated_at() > note.updated_at());
    }

    #[test]
    fn partition_value_reads_designated_field() {
        let mut note = Note::default();
        assert_eq!(note.partition_value().unwrap(), Value::Null);
        note.region = Some("eu".into());
        assert_eq!(note.partition_value().unwrap(), json!("eu"));
    }

    #[test]
    fn unknown_partition_field_is_configuration_error() {
        let err = Misconfigured::default().partition_value().unwrap_err();
        assert!(matches!(err, RepoError::Configuration { .. }));
    }

    #[test]
    fn reset_leaves_usable_empty_entity() {
        let mut note = Note::from_partial(Some(&doc(json!({ "id": "n-1", "title": "a" })))).unwrap();
        note.reset_to_empty();
        assert_eq!(note.id(), None);
        assert_eq!(note.title, None);
        assert_eq!(note.raw(), Some(&Document::new()));
    }
}
