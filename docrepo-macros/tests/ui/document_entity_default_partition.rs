use docrepo::{DocumentEntity, EntityMeta};
use docrepo_macros::document_entity;
use serde_json::json;

// 显式声明 meta 时复用原定义，并移至最前
#[document_entity]
#[derive(Clone)]
struct Tag {
    label: String,
    meta: EntityMeta,
}

fn main() {
    assert_eq!(Tag::PARTITION_KEY, "id");
    assert_eq!(Tag::FIELDS, &["label"]);

    let mut tag = Tag::default();
    assert_eq!(tag.partition_value().unwrap(), json!(null));

    tag.hydrate_document(json!({ "id": "t-1", "label": "x" }).as_object().unwrap())
        .unwrap();
    let copy = tag.clone();
    assert_eq!(copy.partition_value().unwrap(), json!("t-1"));
    assert_eq!(copy.label, "x");
}
