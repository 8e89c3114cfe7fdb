use docrepo::DocumentEntity;
use docrepo_macros::document_entity;
use serde_json::json;

#[document_entity(partition_key = "tenant", debug = false)]
struct Invoice {
    #[document(rename = "tenant")]
    tenant_id: Option<String>,
    amount: Option<f64>,
    #[document(skip)]
    cached_total: Option<f64>,
}

impl std::fmt::Debug for Invoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invoice(..)")
    }
}

fn main() {
    assert_eq!(Invoice::FIELDS, &["tenant", "amount"]);

    let mut invoice = Invoice {
        cached_total: Some(1.0),
        ..Default::default()
    };
    let _ = format!("{:?}", invoice); // 使用手写 Debug，可编译说明未自动派生

    invoice
        .absorb_document(json!({ "tenant": "acme", "amount": 12.5, "cached_total": 99.0 }).as_object().unwrap())
        .unwrap();

    assert_eq!(invoice.tenant_id.as_deref(), Some("acme"));
    assert_eq!(invoice.cached_total, Some(1.0));
    assert_eq!(invoice.partition_value().unwrap(), json!("acme"));

    let exported = invoice.export_document().unwrap();
    assert_eq!(exported["tenant"], json!("acme"));
    assert!(!exported.contains_key("tenant_id"));
    assert!(!exported.contains_key("cached_total"));
}
