//! Shared fixtures for in-module tests.

use std::sync::Arc;

use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;

use crate::config::Config;
use crate::db::models::{CreateNotification, NotificationType};
use crate::routes;
use crate::services::notifiers::Dispatcher;
use crate::services::push::{PushGateway, PushService};
use crate::services::realtime::ChangeFeed;
use crate::services::store::NotificationStore;
use crate::AppState;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// A fresh in-memory database with every migration applied. One connection,
/// so every query sees the same memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub async fn test_store() -> NotificationStore {
    NotificationStore::new(test_pool().await, ChangeFeed::default())
}

pub fn new_notification(user_id: &str, notification_type: NotificationType) -> CreateNotification {
    CreateNotification {
        user_id: user_id.to_string(),
        title: "Title".to_string(),
        message: "Message".to_string(),
        notification_type,
        order_id: None,
        return_id: None,
        reference_url: None,
    }
}

async fn exec(pool: &SqlitePool, sql: &str, binds: &[Option<String>]) {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(value.clone());
    }
    query.execute(pool).await.expect("fixture insert");
}

fn s(value: &str) -> Option<String> {
    Some(value.to_string())
}

pub async fn insert_user(pool: &SqlitePool, id: &str, full_name: &str, role: &str) {
    exec(
        pool,
        "INSERT INTO users (id, email, full_name, role) VALUES (?, ?, ?, ?)",
        &[s(id), Some(format!("{}@example.com", id)), s(full_name), s(role)],
    )
    .await;
}

/// Inserts a user with role `customer` plus its customer profile.
pub async fn insert_customer(pool: &SqlitePool, customer_id: &str, user_id: &str, name: &str) {
    insert_user(pool, user_id, name, "customer").await;
    exec(
        pool,
        "INSERT INTO customers (id, user_id, full_name) VALUES (?, ?, ?)",
        &[s(customer_id), s(user_id), s(name)],
    )
    .await;
}

pub async fn insert_vendor(pool: &SqlitePool, vendor_id: &str, user_id: &str, business: &str) {
    insert_user(pool, user_id, business, "vendor").await;
    exec(
        pool,
        "INSERT INTO vendors (id, user_id, business_name) VALUES (?, ?, ?)",
        &[s(vendor_id), s(user_id), s(business)],
    )
    .await;
}

pub async fn insert_agent(pool: &SqlitePool, agent_id: &str, user_id: &str, name: &str) {
    insert_user(pool, user_id, name, "agent").await;
    exec(
        pool,
        "INSERT INTO agents (id, user_id, full_name) VALUES (?, ?, ?)",
        &[s(agent_id), s(user_id), s(name)],
    )
    .await;
}

pub async fn insert_product(pool: &SqlitePool, id: &str, vendor_id: &str, name: &str, stock: i64) {
    sqlx::query(
        "INSERT INTO products (id, vendor_id, name, stock_quantity, status) VALUES (?, ?, ?, ?, 'pending')",
    )
    .bind(id)
    .bind(vendor_id)
    .bind(name)
    .bind(stock)
    .execute(pool)
    .await
    .expect("fixture product");
}

pub async fn insert_order(
    pool: &SqlitePool,
    id: &str,
    customer_id: &str,
    agent_id: Option<&str>,
    total: f64,
) {
    sqlx::query(
        "INSERT INTO orders (id, customer_id, agent_id, status, total_amount, payment_reference) \
         VALUES (?, ?, ?, 'pending', ?, ?)",
    )
    .bind(id)
    .bind(customer_id)
    .bind(agent_id)
    .bind(total)
    .bind(format!("PAY-{}", id))
    .execute(pool)
    .await
    .expect("fixture order");
}

pub async fn insert_order_item(
    pool: &SqlitePool,
    order_id: &str,
    product_id: &str,
    vendor_id: &str,
    quantity: i64,
    unit_price: f64,
) {
    sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, vendor_id, quantity, unit_price) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(order_id)
    .bind(product_id)
    .bind(vendor_id)
    .bind(quantity)
    .bind(unit_price)
    .execute(pool)
    .await
    .expect("fixture order item");
}

pub async fn insert_payout(pool: &SqlitePool, id: &str, vendor_id: &str, amount: f64) {
    sqlx::query(
        "INSERT INTO payouts (id, vendor_id, amount, status, reference) VALUES (?, ?, ?, 'pending', ?)",
    )
    .bind(id)
    .bind(vendor_id)
    .bind(amount)
    .bind(format!("PO-{}", id))
    .execute(pool)
    .await
    .expect("fixture payout");
}

pub async fn insert_return(
    pool: &SqlitePool,
    id: &str,
    order_id: &str,
    customer_id: &str,
    amount: f64,
    reason: &str,
) {
    sqlx::query(
        "INSERT INTO returns (id, order_id, customer_id, amount, reason, status) \
         VALUES (?, ?, ?, ?, ?, 'requested')",
    )
    .bind(id)
    .bind(order_id)
    .bind(customer_id)
    .bind(amount)
    .bind(reason)
    .execute(pool)
    .await
    .expect("fixture return");
}

pub async fn insert_coupon(
    pool: &SqlitePool,
    id: &str,
    vendor_id: &str,
    code: &str,
    usage_count: i64,
    usage_limit: Option<i64>,
    expires_at: Option<NaiveDateTime>,
) {
    sqlx::query(
        "INSERT INTO coupons (id, vendor_id, code, usage_count, usage_limit, expires_at, is_active) \
         VALUES (?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(id)
    .bind(vendor_id)
    .bind(code)
    .bind(usage_count)
    .bind(usage_limit)
    .bind(expires_at)
    .execute(pool)
    .await
    .expect("fixture coupon");
}

pub async fn test_dispatcher() -> Dispatcher {
    let store = test_store().await;
    let push = PushService::new(store.pool().clone(), None, None, 4);
    let config = Config::default();
    Dispatcher::new(store, push, config.dispatch, config.sweeps)
}

pub async fn test_dispatcher_with_push(gateway: Arc<dyn PushGateway>) -> Dispatcher {
    let store = test_store().await;
    let push = PushService::new(store.pool().clone(), Some(gateway), Some("test-key".into()), 4);
    let config = Config::default();
    Dispatcher::new(store, push, config.dispatch, config.sweeps)
}

pub const ORDER_ID: &str = "ord-7f3a9c21-0001";

/// One customer, two vendors, one agent, two admins and an order `ORDER_ID`
/// with two units from vendor `v1` at 1,500 and one unit from `v2` at 4,000.
pub async fn seed_marketplace(pool: &SqlitePool) {
    insert_customer(pool, "c1", "cust-user", "Ada Obi").await;
    insert_vendor(pool, "v1", "vendor-1-user", "Acme Goods").await;
    insert_vendor(pool, "v2", "vendor-2-user", "Bolt Supplies").await;
    insert_agent(pool, "a1", "agent-user", "Sam Rider").await;
    insert_user(pool, "admin-1", "First Admin", "admin").await;
    insert_user(pool, "admin-2", "Second Admin", "admin").await;

    insert_product(pool, "p1", "v1", "Red Kettle", 25).await;
    insert_product(pool, "p2", "v2", "Blue Mug", 25).await;

    insert_order(pool, ORDER_ID, "c1", Some("a1"), 7000.0).await;
    insert_order_item(pool, ORDER_ID, "p1", "v1", 2, 1500.0).await;
    insert_order_item(pool, ORDER_ID, "p2", "v2", 1, 4000.0).await;
}

pub async fn test_state() -> Arc<AppState> {
    let mut config = Config::default();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.webhook.signing_secret = WEBHOOK_SECRET.to_string();

    let store = test_store().await;
    let pool = store.pool().clone();
    let push = PushService::new(pool.clone(), None, None, config.push.concurrency);
    let dispatcher = Dispatcher::new(
        store.clone(),
        push.clone(),
        config.dispatch.clone(),
        config.sweeps.clone(),
    );

    Arc::new(AppState {
        db: pool,
        config,
        store,
        push,
        dispatcher,
    })
}

/// The full router without rate limiting, which needs a peer address.
pub fn test_app(state: Arc<AppState>) -> Router {
    routes::api_router()
        .nest("/webhooks", routes::webhooks::router())
        .with_state(state)
}

pub fn token_for(user_id: &str) -> String {
    routes::auth::create_jwt(JWT_SECRET, user_id)
}

pub async fn body_json(res: Response) -> serde_json::Value {
    let bytes = res
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
