//! Order service: owns the shared order set and funnels every mutation
//! through the aggregate's transition operations.
//!
//! All mutations run under one write lock, which is what makes the rider
//! claim a real conditional update: two concurrent claims serialize here and
//! the loser gets `AlreadyClaimed` instead of overwriting the winner.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::aggregates::order::{NewOrder, Order, RiderContact, RiderLiveLocation};
use crate::domain::events::OrderEvent;
use crate::domain::status::OrderStatus;
use crate::domain::value_objects::{GeoPoint, PinSide};
use crate::storage::{keys, KeyValueStore};
use crate::{Error, Result};

/// Derived rider statistics; recomputed from the order set on demand, never
/// cached.
#[derive(Clone, Debug, Serialize)]
pub struct RiderStats {
    pub rider_id: String,
    pub average_rating: f64,
    pub review_count: usize,
    pub completed_jobs: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RiderReview {
    pub rating: u8,
    pub comment: String,
    pub date: DateTime<Utc>,
    pub customer_name: String,
}

pub struct OrderService {
    orders: RwLock<HashMap<String, Order>>,
    store: Arc<dyn KeyValueStore>,
}

impl OrderService {
    /// Loads the persisted order list. Legacy status strings and coordinate
    /// spellings are normalized right here, at the deserialization boundary.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let orders = match store.get(keys::ORDERS)? {
            Some(bytes) => {
                let list: Vec<Order> = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Storage(format!("corrupt order list: {e}")))?;
                tracing::info!(count = list.len(), "loaded persisted orders");
                list.into_iter().map(|o| (o.id.clone(), o)).collect()
            }
            None => HashMap::new(),
        };
        Ok(Self {
            orders: RwLock::new(orders),
            store,
        })
    }

    pub async fn create_order(&self, new: NewOrder) -> Result<Order> {
        let mut order = Order::create(new)?;
        let events = order.take_events();
        let snapshot = order.clone();
        {
            let mut orders = self.orders.write().await;
            orders.insert(order.id.clone(), order);
            if let Err(e) = self.persist(&orders) {
                orders.remove(&snapshot.id);
                return Err(e);
            }
        }
        emit_all(&events);
        Ok(snapshot)
    }

    /// Applies one transition under the write lock and persists the result.
    /// A persistence failure rolls the in-memory order back to its
    /// pre-transition state, so a failed call can simply be retried.
    async fn mutate<F>(&self, id: &str, f: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> Result<()>,
    {
        let mut orders = self.orders.write().await;
        let mut updated = orders.get(id).cloned().ok_or(Error::OrderNotFound)?;
        f(&mut updated)?;
        let events = updated.take_events();
        let snapshot = updated.clone();
        let previous = orders.insert(id.to_string(), updated);
        if let Err(e) = self.persist(&orders) {
            if let Some(previous) = previous {
                orders.insert(id.to_string(), previous);
            }
            return Err(e);
        }
        drop(orders);
        emit_all(&events);
        Ok(snapshot)
    }

    pub async fn confirm(&self, id: &str) -> Result<Order> {
        self.mutate(id, |o| o.confirm()).await
    }

    pub async fn set_waiting_rider(&self, id: &str) -> Result<Order> {
        self.mutate(id, |o| o.set_waiting_rider()).await
    }

    pub async fn assign_rider(&self, id: &str, rider: RiderContact) -> Result<Order> {
        self.mutate(id, |o| o.assign_rider(rider)).await
    }

    pub async fn confirm_pickup(&self, id: &str, rider_id: &str) -> Result<Order> {
        self.mutate(id, |o| o.confirm_pickup(rider_id)).await
    }

    pub async fn confirm_delivery(&self, id: &str) -> Result<Order> {
        self.mutate(id, |o| o.confirm_delivery()).await
    }

    pub async fn complete(&self, id: &str) -> Result<Order> {
        self.mutate(id, |o| o.complete()).await
    }

    pub async fn cancel(&self, id: &str) -> Result<Order> {
        self.mutate(id, |o| o.cancel()).await
    }

    pub async fn rate_rider(&self, id: &str, stars: u8, review: String) -> Result<Order> {
        self.mutate(id, |o| o.rate_rider(stars, review)).await
    }

    pub async fn add_buyer_review(&self, id: &str, rating: u8, comment: String) -> Result<Order> {
        self.mutate(id, |o| o.add_buyer_review(rating, comment)).await
    }

    pub async fn update_rider_location(
        &self,
        id: &str,
        location: RiderLiveLocation,
    ) -> Result<Order> {
        self.mutate(id, |o| {
            o.update_live_location(location);
            Ok(())
        })
        .await
    }

    pub async fn set_pin(
        &self,
        id: &str,
        side: PinSide,
        coord: GeoPoint,
        note: Option<String>,
    ) -> Result<Order> {
        self.mutate(id, |o| o.set_pin(side, coord, note)).await
    }

    /// Applies a resolved address to a pin if it still sits at `coord`.
    /// Returns false when the result arrived for a superseded coordinate.
    pub async fn merge_pin_address(
        &self,
        id: &str,
        side: PinSide,
        coord: GeoPoint,
        address: String,
    ) -> Result<bool> {
        let mut applied = false;
        self.mutate(id, |o| {
            applied = o.merge_pin_address(side, coord, address);
            Ok(())
        })
        .await?;
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get(&self, id: &str) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(Error::OrderNotFound)
    }

    pub async fn list(&self) -> Vec<Order> {
        let mut all: Vec<Order> = self.orders.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// The rider job feed: waiting for a rider and not yet claimed.
    pub async fn available_for_rider(&self) -> Vec<Order> {
        let mut jobs: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.is_claimable())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn by_customer(&self, customer_id: &str, active: Option<bool>) -> Vec<Order> {
        self.filtered(|o| {
            o.customer.id == customer_id
                && active.map_or(true, |want| o.status.is_active() == want)
        })
        .await
    }

    pub async fn by_rider(&self, rider_id: &str) -> Vec<Order> {
        self.filtered(|o| o.rider.as_ref().is_some_and(|r| r.id == rider_id))
            .await
    }

    async fn filtered<F>(&self, pred: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let mut matched: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| pred(o))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
    }

    /// Scans the rider's completed and rated orders. Derived each call.
    pub async fn rider_stats(&self, rider_id: &str) -> RiderStats {
        let orders = self.orders.read().await;
        let mut completed_jobs = 0;
        let mut star_sum = 0u32;
        let mut review_count = 0;
        for o in orders.values() {
            if !o.rider.as_ref().is_some_and(|r| r.id == rider_id) {
                continue;
            }
            if o.status == OrderStatus::Completed {
                completed_jobs += 1;
            }
            if let Some(feedback) = &o.rider_rating {
                star_sum += u32::from(feedback.stars.stars());
                review_count += 1;
            }
        }
        let average_rating = if review_count > 0 {
            f64::from(star_sum) / review_count as f64
        } else {
            0.0
        };
        RiderStats {
            rider_id: rider_id.to_string(),
            average_rating,
            review_count,
            completed_jobs,
        }
    }

    pub async fn reviews_by_rider(&self, rider_id: &str) -> Vec<RiderReview> {
        let orders = self.orders.read().await;
        let mut reviews: Vec<RiderReview> = orders
            .values()
            .filter(|o| o.rider.as_ref().is_some_and(|r| r.id == rider_id))
            .filter_map(|o| {
                let feedback = o.rider_rating.as_ref()?;
                Some(RiderReview {
                    rating: feedback.stars.stars(),
                    comment: feedback.review.clone(),
                    date: o.completed_at.or(o.delivered_at).unwrap_or(o.created_at),
                    customer_name: o.customer.name.clone(),
                })
            })
            .collect();
        reviews.sort_by(|a, b| b.date.cmp(&a.date));
        reviews
    }

    fn persist(&self, orders: &HashMap<String, Order>) -> Result<()> {
        let list: Vec<&Order> = orders.values().collect();
        let bytes = serde_json::to_vec(&list).map_err(|e| Error::Storage(e.to_string()))?;
        self.store.set(keys::ORDERS, bytes)
    }
}

fn emit_all(events: &[OrderEvent]) {
    for event in events {
        match event {
            OrderEvent::Created {
                order_id,
                customer_id,
                grand_total,
            } => tracing::info!(%order_id, %customer_id, %grand_total, "order created"),
            OrderEvent::Confirmed { order_id } => tracing::info!(%order_id, "order confirmed"),
            OrderEvent::WaitingRider { order_id } => {
                tracing::info!(%order_id, "order waiting for rider")
            }
            OrderEvent::RiderAssigned { order_id, rider_id } => {
                tracing::info!(%order_id, %rider_id, "rider assigned")
            }
            OrderEvent::PickedUp { order_id } => tracing::info!(%order_id, "order picked up"),
            OrderEvent::Delivered { order_id } => tracing::info!(%order_id, "order delivered"),
            OrderEvent::Completed { order_id } => tracing::info!(%order_id, "order completed"),
            OrderEvent::Cancelled { order_id } => tracing::info!(%order_id, "order cancelled"),
            OrderEvent::RiderRated { order_id, stars } => {
                tracing::info!(%order_id, stars, "rider rated")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::{LineItem, Party, PaymentMethod};
    use crate::storage::MemoryStore;
    use rust_decimal::Decimal;

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    fn new_order(price: i64, qty: u32, discount: Option<&str>) -> NewOrder {
        NewOrder {
            customer: Party {
                id: "buyer-1".into(),
                name: "สมหญิง".into(),
                phone: None,
                address: Some("99 หมู่ 1".into()),
                location: Some(GeoPoint::new(16.4, 102.8)),
            },
            store: Party {
                id: "store-1".into(),
                name: "ร้านป้าแดง".into(),
                phone: None,
                address: None,
                location: None,
            },
            items: vec![LineItem {
                product_id: "p1".into(),
                product_name: "ส้มตำ".into(),
                price: Decimal::from(price),
                quantity: qty,
                image_url: None,
            }],
            distance_km: 5.0,
            discount_code: discount.map(String::from),
            payment_method: PaymentMethod::Cod,
            buyer_note: None,
        }
    }

    fn rider(id: &str) -> RiderContact {
        RiderContact {
            id: id.into(),
            name: format!("rider {id}"),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_lifecycle() {
        let svc = OrderService::new(store()).unwrap();
        // 200 subtotal, 30 fee, NADHUB30 flat 30 (min 150) => 200 grand total.
        let order = svc
            .create_order(new_order(200, 1, Some("NADHUB30")))
            .await
            .unwrap();
        assert_eq!(order.grand_total, Decimal::from(200));
        assert_eq!(order.discount_code.as_deref(), Some("NADHUB30"));

        let id = order.id.clone();
        svc.confirm(&id).await.unwrap();
        svc.set_waiting_rider(&id).await.unwrap();
        svc.assign_rider(&id, rider("riderA")).await.unwrap();
        assert!(matches!(
            svc.assign_rider(&id, rider("riderB")).await,
            Err(Error::AlreadyClaimed)
        ));
        svc.confirm_pickup(&id, "riderA").await.unwrap();
        svc.confirm_delivery(&id).await.unwrap();
        let done = svc.complete(&id).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);

        svc.rate_rider(&id, 5, "great".into()).await.unwrap();
        assert!(matches!(
            svc.rate_rider(&id, 4, "again".into()).await,
            Err(Error::AlreadyRated)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_claims_exactly_one_wins() {
        let svc = Arc::new(OrderService::new(store()).unwrap());
        let order = svc.create_order(new_order(100, 1, None)).await.unwrap();
        let id = order.id.clone();
        svc.confirm(&id).await.unwrap();
        svc.set_waiting_rider(&id).await.unwrap();

        let a = {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            tokio::spawn(async move { svc.assign_rider(&id, rider("r1")).await })
        };
        let b = {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            tokio::spawn(async move { svc.assign_rider(&id, rider("r2")).await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(a.is_ok() != b.is_ok(), "exactly one claim must win");
        let winner = if a.is_ok() { "r1" } else { "r2" };
        let loser_err = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
        assert!(matches!(loser_err, Error::AlreadyClaimed));
        let final_order = svc.get(&id).await.unwrap();
        assert_eq!(final_order.rider.unwrap().id, winner);
    }

    #[tokio::test]
    async fn test_rider_feed_excludes_claimed_and_pending() {
        let svc = OrderService::new(store()).unwrap();
        let waiting = svc.create_order(new_order(100, 1, None)).await.unwrap();
        let _pending = svc.create_order(new_order(50, 1, None)).await.unwrap();
        svc.confirm(&waiting.id).await.unwrap();
        svc.set_waiting_rider(&waiting.id).await.unwrap();

        let feed = svc.available_for_rider().await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, waiting.id);

        svc.assign_rider(&waiting.id, rider("r1")).await.unwrap();
        assert!(svc.available_for_rider().await.is_empty());
    }

    #[tokio::test]
    async fn test_rider_stats_derived_from_orders() {
        let svc = OrderService::new(store()).unwrap();
        for stars in [5u8, 4u8] {
            let o = svc.create_order(new_order(100, 1, None)).await.unwrap();
            svc.confirm(&o.id).await.unwrap();
            svc.set_waiting_rider(&o.id).await.unwrap();
            svc.assign_rider(&o.id, rider("r1")).await.unwrap();
            svc.confirm_pickup(&o.id, "r1").await.unwrap();
            svc.confirm_delivery(&o.id).await.unwrap();
            svc.complete(&o.id).await.unwrap();
            svc.rate_rider(&o.id, stars, "ok".into()).await.unwrap();
        }

        let stats = svc.rider_stats("r1").await;
        assert_eq!(stats.completed_jobs, 2);
        assert_eq!(stats.review_count, 2);
        assert!((stats.average_rating - 4.5).abs() < f64::EPSILON);

        let reviews = svc.reviews_by_rider("r1").await;
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].customer_name, "สมหญิง");

        let none = svc.rider_stats("r9").await;
        assert_eq!(none.review_count, 0);
        assert_eq!(none.average_rating, 0.0);
    }

    #[tokio::test]
    async fn test_live_location_update_and_missing_state() {
        let svc = OrderService::new(store()).unwrap();
        let order = svc.create_order(new_order(100, 1, None)).await.unwrap();
        assert!(svc.get(&order.id).await.unwrap().rider_live_location.is_none());

        let loc = RiderLiveLocation {
            lat: 16.41,
            lng: 102.81,
            updated_at: Utc::now(),
        };
        svc.update_rider_location(&order.id, loc).await.unwrap();
        assert_eq!(
            svc.get(&order.id).await.unwrap().rider_live_location,
            Some(loc)
        );
    }

    #[tokio::test]
    async fn test_orders_survive_reload() {
        let store = store();
        let id = {
            let svc = OrderService::new(Arc::clone(&store)).unwrap();
            let order = svc.create_order(new_order(100, 2, None)).await.unwrap();
            svc.confirm(&order.id).await.unwrap();
            order.id
        };

        let reloaded = OrderService::new(store).unwrap();
        let order = reloaded.get(&id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.items_total, Decimal::from(200));
    }

    /// Fails every `set` while `failing` is flipped on; reads always work.
    struct FlakyStore {
        inner: MemoryStore,
        failing: std::sync::atomic::AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> crate::Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Vec<u8>) -> crate::Result<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.set(key, value)
        }
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back_transition() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
        });
        let svc = OrderService::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).unwrap();
        let order = svc.create_order(new_order(100, 1, None)).await.unwrap();

        store.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            svc.confirm(&order.id).await,
            Err(Error::Storage(_))
        ));
        // The failed transition must not stick in memory.
        assert_eq!(
            svc.get(&order.id).await.unwrap().status,
            OrderStatus::Pending
        );

        // Once the store recovers, the retry goes through.
        store.failing.store(false, std::sync::atomic::Ordering::SeqCst);
        let confirmed = svc.confirm(&order.id).await.unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_persist_failure_discards_created_order() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failing: std::sync::atomic::AtomicBool::new(true),
        });
        let svc = OrderService::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).unwrap();
        assert!(matches!(
            svc.create_order(new_order(100, 1, None)).await,
            Err(Error::Storage(_))
        ));
        assert!(svc.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_records_normalized_on_load() {
        let store = store();
        // A record written by an old app build: lowercase status, long
        // coordinate spellings.
        let legacy = serde_json::json!([{
            "id": "ORD-legacy-1",
            "customer": {"id": "b1", "name": "ลูกค้า", "location": {"latitude": 13.75, "longitude": 100.5}},
            "store": {"id": "s1", "name": "ร้าน"},
            "items": [{"product_id": "p1", "product_name": "x", "price": 100, "quantity": 1}],
            "items_total": 100,
            "delivery_fee": 30,
            "grand_total": 130,
            "payment_method": "COD",
            "status": "picked_up",
            "created_at": "2025-01-01T00:00:00Z",
            "pickup_pin": {"latitude": 13.7, "longitude": 100.4, "updated_at": "2025-01-01T00:00:00Z"}
        }]);
        store
            .set(keys::ORDERS, serde_json::to_vec(&legacy).unwrap())
            .unwrap();

        let svc = OrderService::new(store).unwrap();
        let order = svc.get("ORD-legacy-1").await.unwrap();
        assert_eq!(order.status, OrderStatus::PickedUp);
        assert_eq!(
            order.customer.location.unwrap(),
            GeoPoint::new(13.75, 100.5)
        );
        assert_eq!(
            order.pickup_pin.unwrap().coord(),
            GeoPoint::new(13.7, 100.4)
        );
    }
}
