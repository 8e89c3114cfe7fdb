mod settings;

use anyhow::Result;
use async_trait::async_trait;
use docrepo::memory::MemoryStore;
use docrepo::{
    ConnectionRegistry, DEFAULT_REMOVE_DELAY, Document, DocumentEntity, Persist, RepoResult,
    Repository,
};
use docrepo_macros::document_entity;
use serde_json::json;
use settings::Settings;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[document_entity]
struct Customer {
    name: Option<String>,
    tier: Option<String>,
}

#[document_entity(partition_key = "customer")]
struct Order {
    customer: Option<String>,
    item: Option<String>,
    quantity: u32,
}

struct CustomerRepository {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl Repository for CustomerRepository {
    type Entity = Customer;
    const CONTAINER: &'static str = "customers";

    fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn new_entity(&self, data: Option<&Document>) -> RepoResult<Customer> {
        Customer::from_partial(data)
    }
}

impl Persist for Customer {
    type Repository = CustomerRepository;

    fn repository(registry: &Arc<ConnectionRegistry>) -> CustomerRepository {
        CustomerRepository {
            registry: Arc::clone(registry),
        }
    }
}

struct OrderRepository {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl Repository for OrderRepository {
    type Entity = Order;
    const CONTAINER: &'static str = "orders";

    fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn new_entity(&self, data: Option<&Document>) -> RepoResult<Order> {
        Order::from_partial(data)
    }
}

impl Persist for Order {
    type Repository = OrderRepository;

    fn repository(registry: &Arc<ConnectionRegistry>) -> OrderRepository {
        OrderRepository {
            registry: Arc::clone(registry),
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.as_str() {
        "json" => fmt().json().with_env_filter(filter).with_target(true).init(),
        _ => fmt().with_env_filter(filter).with_target(true).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings);

    let store = MemoryStore::new().with_partition_key("orders", "/customer");
    let registry = ConnectionRegistry::configured(&settings.connection, &store)?;

    // 创建：实体自行持久化，标识与时间戳来自存储
    let mut customer = Customer {
        name: Some("Ada".into()),
        tier: Some("gold".into()),
        ..Default::default()
    };
    customer.persist(&registry).await?;
    let customer_id = customer.id().unwrap_or_default().to_string();
    info!(id = %customer_id, created_at = ?customer.created_at(), "Customer created");

    let orders = Order::repository(&registry);
    for (item, quantity) in [("pen", 3), ("notebook", 1), ("ink", 2)] {
        orders
            .create(&json!({ "customer": customer_id, "item": item, "quantity": quantity })
                .as_object()
                .cloned()
                .unwrap_or_default())
            .await?;
    }

    let bulk = orders
        .query(
            "SELECT * FROM c WHERE c.customer = ? AND c.quantity > ?",
            Some(&[json!(customer_id), json!(1)][..]),
        )
        .await?;
    info!(count = bulk.len(), "Orders with more than one item");

    if let Some(mut latest) = orders.last_one().await? {
        let mut change = Document::new();
        change.insert("quantity".to_string(), json!(latest.quantity + 1));
        orders.update(&mut latest, &change).await?;
        info!(item = ?latest.item, quantity = latest.quantity, "Latest order bumped");
    }

    // 更新：已有标识时 persist 走整体替换
    customer.tier = Some("platinum".into());
    customer.persist(&registry).await?;
    let reloaded = Customer::repository(&registry).find(&customer_id).await?;
    info!(tier = ?reloaded.tier, updated_at = ?reloaded.updated_at(), "Customer reloaded");

    let removed = orders.remove_all(DEFAULT_REMOVE_DELAY).await?;
    info!(removed, "Orders cleared");

    let mut reloaded = reloaded;
    Customer::repository(&registry).remove(&mut reloaded).await?;
    info!(
        cached = ?registry.cached_containers(),
        opened = store.open_count(),
        "Demo finished"
    );

    Ok(())
}
