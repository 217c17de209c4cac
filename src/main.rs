//! NadHub Delivery - local delivery marketplace service

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use nadhub_delivery::domain::aggregates::cart::ProductSnapshot;
use nadhub_delivery::domain::aggregates::order::{
    Order, Party, PaymentMethod, RiderContact, RiderLiveLocation,
};
use nadhub_delivery::domain::value_objects::{GeoPoint, PinSide};
use nadhub_delivery::services::{
    geocode::{navigation_url, MapPlatform},
    CartService, CheckoutDetails, NoopGeocoder, OrderService, PinAddressResolver,
};
use nadhub_delivery::storage::MemoryStore;
use nadhub_delivery::Error;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub carts: Arc<CartService>,
    pub resolver: Arc<PinAddressResolver>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(MemoryStore::new());
    let orders = Arc::new(OrderService::new(store)?);
    let carts = Arc::new(CartService::new());
    // Drop-in point for a real provider; until then pins stay coordinate-only.
    let settle = env_ms("GEOCODE_SETTLE_MS", 800);
    let lookup_timeout = env_ms("GEOCODE_TIMEOUT_MS", 5_000);
    let resolver = Arc::new(
        PinAddressResolver::new(Arc::new(NoopGeocoder), Arc::clone(&orders))
            .with_timing(settle, lookup_timeout),
    );
    let state = AppState { orders, carts, resolver };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "nadhub-delivery"})) }))
        .route("/api/v1/statuses", get(list_statuses))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/available", get(available_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/confirm", post(confirm_order))
        .route("/api/v1/orders/:id/waiting-rider", post(set_waiting_rider))
        .route("/api/v1/orders/:id/assign", post(assign_rider))
        .route("/api/v1/orders/:id/pickup", post(confirm_pickup))
        .route("/api/v1/orders/:id/deliver", post(confirm_delivery))
        .route("/api/v1/orders/:id/complete", post(complete_order))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/orders/:id/location", post(update_location))
        .route("/api/v1/orders/:id/rider-rating", post(rate_rider))
        .route("/api/v1/orders/:id/buyer-review", post(add_buyer_review))
        .route("/api/v1/orders/:id/pins/:side", put(set_pin))
        .route("/api/v1/riders/:id/stats", get(rider_stats))
        .route("/api/v1/riders/:id/reviews", get(rider_reviews))
        .route("/api/v1/cart/:session", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/lines/:line", put(update_quantity))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/navigation", get(navigation_link))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8084".to_string());
    tracing::info!("nadhub-delivery listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

fn env_ms(key: &str, default: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

type Reply<T> = std::result::Result<Json<T>, (StatusCode, String)>;

fn reject(e: Error) -> (StatusCode, String) {
    let code = match &e {
        Error::OrderNotFound | Error::CartLineNotFound => StatusCode::NOT_FOUND,
        Error::EmptyCart | Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}

fn invalid(e: validator::ValidationErrors) -> (StatusCode, String) {
    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
}

// ---------------------------------------------------------------------------
// Status vocabulary
// ---------------------------------------------------------------------------

/// The UI's lookup table: value, label, badge color, ongoing-vs-history flag.
async fn list_statuses() -> Json<Vec<serde_json::Value>> {
    Json(
        nadhub_delivery::OrderStatus::ALL
            .iter()
            .map(|s| {
                serde_json::json!({
                    "value": s.as_str(),
                    "label": s.label(),
                    "color": s.color(),
                    "is_active": s.is_active(),
                })
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub customer_id: Option<String>,
    pub rider_id: Option<String>,
    pub active: Option<bool>,
}

async fn list_orders(State(s): State<AppState>, Query(p): Query<ListParams>) -> Json<Vec<Order>> {
    let orders = if let Some(customer) = p.customer_id {
        s.orders.by_customer(&customer, p.active).await
    } else if let Some(rider) = p.rider_id {
        s.orders.by_rider(&rider).await
    } else {
        s.orders.list().await
    };
    Json(orders)
}

async fn available_orders(State(s): State<AppState>) -> Json<Vec<Order>> {
    Json(s.orders.available_for_rider().await)
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Reply<Order> {
    s.orders.get(&id).await.map(Json).map_err(reject)
}

async fn confirm_order(State(s): State<AppState>, Path(id): Path<String>) -> Reply<Order> {
    s.orders.confirm(&id).await.map(Json).map_err(reject)
}

async fn set_waiting_rider(State(s): State<AppState>, Path(id): Path<String>) -> Reply<Order> {
    s.orders.set_waiting_rider(&id).await.map(Json).map_err(reject)
}

async fn assign_rider(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(rider): Json<RiderContact>,
) -> Reply<Order> {
    s.orders.assign_rider(&id, rider).await.map(Json).map_err(reject)
}

#[derive(Debug, Deserialize)]
pub struct PickupRequest {
    pub rider_id: String,
}

async fn confirm_pickup(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<PickupRequest>,
) -> Reply<Order> {
    s.orders.confirm_pickup(&id, &r.rider_id).await.map(Json).map_err(reject)
}

async fn confirm_delivery(State(s): State<AppState>, Path(id): Path<String>) -> Reply<Order> {
    s.orders.confirm_delivery(&id).await.map(Json).map_err(reject)
}

async fn complete_order(State(s): State<AppState>, Path(id): Path<String>) -> Reply<Order> {
    s.orders.complete(&id).await.map(Json).map_err(reject)
}

async fn cancel_order(State(s): State<AppState>, Path(id): Path<String>) -> Reply<Order> {
    s.orders.cancel(&id).await.map(Json).map_err(reject)
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

async fn update_location(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<LocationRequest>,
) -> Reply<Order> {
    let location = RiderLiveLocation {
        lat: r.lat,
        lng: r.lng,
        updated_at: r.updated_at.unwrap_or_else(Utc::now),
    };
    s.orders.update_rider_location(&id, location).await.map(Json).map_err(reject)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RateRequest {
    #[validate(range(min = 1, max = 5))]
    pub stars: u8,
    pub review: String,
}

async fn rate_rider(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<RateRequest>,
) -> Reply<Order> {
    r.validate().map_err(invalid)?;
    s.orders.rate_rider(&id, r.stars, r.review).await.map(Json).map_err(reject)
}

#[derive(Debug, Deserialize, Validate)]
pub struct BuyerReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    pub comment: String,
}

async fn add_buyer_review(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<BuyerReviewRequest>,
) -> Reply<Order> {
    r.validate().map_err(invalid)?;
    s.orders.add_buyer_review(&id, r.rating, r.comment).await.map(Json).map_err(reject)
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    pub note: Option<String>,
}

async fn set_pin(
    State(s): State<AppState>,
    Path((id, side)): Path<(String, String)>,
    Json(r): Json<PinRequest>,
) -> Reply<Order> {
    let side = PinSide::parse(&side)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown pin side: {side}")))?;
    let coord = GeoPoint::new(r.lat, r.lng);
    let order = s.orders.set_pin(&id, side, coord, r.note).await.map_err(reject)?;
    // Address resolution is background work; the pin is already confirmed.
    s.resolver.schedule(id, side, coord);
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// Riders
// ---------------------------------------------------------------------------

async fn rider_stats(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Json<nadhub_delivery::services::RiderStats> {
    Json(s.orders.rider_stats(&id).await)
}

async fn rider_reviews(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<nadhub_delivery::services::RiderReview>> {
    Json(s.orders.reviews_by_rider(&id).await)
}

// ---------------------------------------------------------------------------
// Cart & checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: String,
    pub product_name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub merchant_id: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn get_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
) -> Json<serde_json::Value> {
    let cart = s.carts.get(&session).await;
    Json(serde_json::json!({"lines": cart.lines(), "items_total": cart.items_total()}))
}

async fn add_to_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<AddToCartRequest>,
) -> Reply<serde_json::Value> {
    r.validate().map_err(invalid)?;
    let cart = s
        .carts
        .add(
            &session,
            ProductSnapshot {
                id: r.product_id,
                name: r.product_name,
                price: r.price,
                image_url: r.image_url,
                merchant_id: r.merchant_id,
            },
            r.quantity,
        )
        .await;
    Ok(Json(serde_json::json!({"lines": cart.lines(), "items_total": cart.items_total()})))
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

async fn update_quantity(
    State(s): State<AppState>,
    Path((session, line)): Path<(String, String)>,
    Json(r): Json<QuantityRequest>,
) -> Reply<serde_json::Value> {
    let cart = s
        .carts
        .update_quantity(&session, &line, r.quantity)
        .await
        .map_err(reject)?;
    Ok(Json(serde_json::json!({"lines": cart.lines(), "items_total": cart.items_total()})))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> StatusCode {
    s.carts.clear(&session).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub session_id: String,
    pub customer: Party,
    pub store: Party,
    #[validate(range(min = 0.0))]
    pub distance_km: f64,
    pub discount_code: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub buyer_note: Option<String>,
}

async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Reply<Order> {
    r.validate().map_err(invalid)?;
    let order = s
        .carts
        .checkout(
            &r.session_id,
            CheckoutDetails {
                customer: r.customer,
                store: r.store,
                distance_km: r.distance_km,
                discount_code: r.discount_code,
                payment_method: r.payment_method,
                buyer_note: r.buyer_note,
            },
            &s.orders,
        )
        .await
        .map_err(reject)?;
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// Navigation deep link
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NavigationParams {
    pub platform: String,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    pub label: Option<String>,
}

async fn navigation_link(Query(p): Query<NavigationParams>) -> Reply<serde_json::Value> {
    let platform = match p.platform.as_str() {
        "ios" => MapPlatform::Ios,
        "android" => MapPlatform::Android,
        other => {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("unknown platform: {other}"),
            ))
        }
    };
    let label = p.label.as_deref().unwrap_or("Destination");
    let url = navigation_url(platform, GeoPoint::new(p.lat, p.lng), label);
    Ok(Json(serde_json::json!({"url": url})))
}
