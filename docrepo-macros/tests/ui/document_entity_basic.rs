use docrepo::DocumentEntity;
use docrepo_macros::document_entity;
use serde_json::json;

#[document_entity(partition_key = "region")]
struct Customer {
    name: Option<String>,
    region: Option<String>,
    visits: u32,
}

fn main() {
    assert_eq!(Customer::PARTITION_KEY, "region");
    assert_eq!(Customer::FIELDS, &["name", "region", "visits"]);

    let mut customer = Customer::default();
    let _ = format!("{:?}", customer); // 默认启用 Debug

    let data = json!({ "id": "c-1", "name": "Ada", "region": "eu", "visits": 3 });
    customer.absorb_document(data.as_object().unwrap()).unwrap();

    assert_eq!(customer.id(), Some("c-1"));
    assert_eq!(customer.name.as_deref(), Some("Ada"));
    assert_eq!(customer.visits, 3);
    assert_eq!(customer.partition_value().unwrap(), json!("eu"));

    let exported = customer.export_document().unwrap();
    assert_eq!(exported["id"], json!("c-1"));
    assert!(exported.contains_key("create_datetime"));
    assert!(!exported.contains_key("meta"));
}
