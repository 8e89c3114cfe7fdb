mod entity;
mod utils;

use proc_macro::TokenStream;

/// 文档实体宏
/// - 追加字段：`meta: ::docrepo::entity::EntityMeta`（若缺失）并置于字段最前
/// - 自动为目标结构体实现 `::docrepo::entity::DocumentEntity`（字段列表、导出、合并）
/// - 支持参数：`#[document_entity(partition_key = "...", debug = true|false)]`，
///   `partition_key` 默认 `"id"`
/// - 字段属性：`#[document(skip)]`、`#[document(rename = "...")]`
///
/// 业务字段不得占用簿记键：`id`、`_id`、`__doc__`、`__meta__`、`partitionKey`、
/// `create_datetime`、`update_datetime`。
#[proc_macro_attribute]
pub fn document_entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity::expand(attr, item)
}
