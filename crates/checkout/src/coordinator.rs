//! Checkout coordinator: turns a cart, or a single product, into an order.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, RequestToken, UserId};
use domain::{CartService, Catalog, Order, OrderItem, OrderRepository, Product, Sequence};
use record_store::{Collection, RecordKey, RecordStore, RecordStoreExt, Version, WriteOp};
use serde::{Deserialize, Serialize};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::ledger::{InventoryLedger, Reservation};
use crate::state::CheckoutState;

/// Stored under `checkouts/<token>` in the same batch as the order and its
/// stock decrement.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckoutRecord {
    order_id: OrderId,
    user_id: UserId,
    created_at: DateTime<Utc>,
}

impl CheckoutRecord {
    fn key(token: RequestToken) -> RecordKey {
        RecordKey::new(Collection::Checkouts, token)
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// True when the token had already produced this order.
    pub replayed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Cart,
    Direct {
        product_id: ProductId,
        quantity: u32,
    },
}

impl Source {
    fn label(&self) -> &'static str {
        match self {
            Source::Cart => "cart",
            Source::Direct { .. } => "direct_buy",
        }
    }

    fn is_direct(&self) -> bool {
        matches!(self, Source::Direct { .. })
    }
}

enum Persisted {
    Created(Order),
    /// Another request with the same token wrote its order first.
    Duplicate(Order),
}

fn transition(state: &mut CheckoutState, next: CheckoutState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid checkout transition {state} -> {next}"
    );
    tracing::Span::current().record("state", next.as_str());
    tracing::debug!(from = %state, to = %next, "checkout state changed");
    metrics::counter!("checkout_state_transitions_total", "state" => next.as_str()).increment(1);
    *state = next;
}

/// Orchestrates checkouts over a shared record store.
///
/// Each attempt runs `Validating → Reserving → Persisting → Committed`.
/// The order, its token record, the pending cart clear and the stock
/// decrement are written in a single batch, so an abort at any point leaves
/// stock, carts, orders and tokens untouched.
pub struct CheckoutCoordinator<S: RecordStore> {
    store: S,
    catalog: Catalog<S>,
    carts: CartService<S>,
    orders: OrderRepository<S>,
    ledger: InventoryLedger<S>,
    config: CheckoutConfig,
}

impl<S> CheckoutCoordinator<S>
where
    S: RecordStore + Clone,
{
    /// Creates a coordinator with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CheckoutConfig::default())
    }

    /// Creates a coordinator with the given configuration.
    pub fn with_config(store: S, config: CheckoutConfig) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            carts: CartService::new(store.clone()),
            orders: OrderRepository::new(store.clone()),
            ledger: InventoryLedger::new(store.clone(), config.lock_timeout),
            store,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog<S> {
        &self.catalog
    }

    pub fn carts(&self) -> &CartService<S> {
        &self.carts
    }

    pub fn orders(&self) -> &OrderRepository<S> {
        &self.orders
    }

    pub fn ledger(&self) -> &InventoryLedger<S> {
        &self.ledger
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Places an order for everything in the user's cart.
    ///
    /// Repeating a call with the same token returns the first order with
    /// `replayed` set and changes nothing.
    #[tracing::instrument(skip(self), fields(path = "cart", state = tracing::field::Empty))]
    pub async fn checkout(&self, user_id: UserId, token: RequestToken) -> Result<CheckoutOutcome> {
        self.run(user_id, Source::Cart, token).await
    }

    /// Places an order for a single product without reading or touching
    /// the user's cart.
    #[tracing::instrument(skip(self), fields(path = "direct_buy", state = tracing::field::Empty))]
    pub async fn direct_buy(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        token: RequestToken,
    ) -> Result<CheckoutOutcome> {
        self.run(
            user_id,
            Source::Direct {
                product_id,
                quantity,
            },
            token,
        )
        .await
    }

    async fn run(
        &self,
        user_id: UserId,
        source: Source,
        token: RequestToken,
    ) -> Result<CheckoutOutcome> {
        let path = source.label();
        metrics::counter!("checkout_attempts_total", "path" => path).increment(1);
        let started = std::time::Instant::now();

        let result = self.run_with_retry(user_id, source, token).await;

        metrics::histogram!("checkout_duration_seconds", "path" => path)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) if outcome.replayed => {
                metrics::counter!("checkout_replays_total", "path" => path).increment(1);
                tracing::info!(order_id = %outcome.order.id, "checkout replayed");
            }
            Ok(outcome) => {
                metrics::counter!("checkout_committed_total", "path" => path).increment(1);
                tracing::info!(
                    order_id = %outcome.order.id,
                    total = %outcome.order.total,
                    "checkout committed"
                );
            }
            Err(e) => {
                metrics::counter!(
                    "checkout_aborted_total",
                    "path" => path,
                    "reason" => e.reason()
                )
                .increment(1);
                tracing::warn!(error = %e, reason = e.reason(), "checkout aborted");
            }
        }
        result
    }

    /// Retries whole attempts that lost a race or timed out on a lock.
    async fn run_with_retry(
        &self,
        user_id: UserId,
        source: Source,
        token: RequestToken,
    ) -> Result<CheckoutOutcome> {
        let retry = self.config.retry;
        let mut attempt = 1;
        loop {
            match self.attempt(user_id, source, token).await {
                Err(CheckoutError::ConcurrencyConflict(reason)) if retry.should_retry(attempt) => {
                    let delay = retry.backoff(attempt);
                    tracing::debug!(attempt, ?delay, %reason, "checkout conflicted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn attempt(
        &self,
        user_id: UserId,
        source: Source,
        token: RequestToken,
    ) -> Result<CheckoutOutcome> {
        if let Some(order) = self.find_replay(user_id, token).await? {
            return Ok(CheckoutOutcome {
                order,
                replayed: true,
            });
        }

        let mut state = CheckoutState::Validating;
        tracing::Span::current().record("state", state.as_str());
        let result = self.process(&mut state, user_id, source, token).await;
        if result.is_err() && state.can_transition_to(CheckoutState::Aborted) {
            transition(&mut state, CheckoutState::Aborted);
        }

        // A concurrent request with the same token may have committed and
        // cleared the cart while this one was failing.
        if result.is_err()
            && let Some(order) = self.find_replay(user_id, token).await?
        {
            return Ok(CheckoutOutcome {
                order,
                replayed: true,
            });
        }
        result
    }

    async fn process(
        &self,
        state: &mut CheckoutState,
        user_id: UserId,
        source: Source,
        token: RequestToken,
    ) -> Result<CheckoutOutcome> {
        let lines = self.resolve_lines(user_id, source).await?;

        transition(state, CheckoutState::Reserving);
        let request: Vec<(ProductId, u32)> = lines
            .iter()
            .map(|(product, quantity)| (product.id, *quantity))
            .collect();
        let reservation = self.ledger.reserve_all(&request).await?;

        transition(state, CheckoutState::Persisting);
        let items: Vec<OrderItem> = lines
            .into_iter()
            .map(|(product, quantity)| OrderItem {
                product_id: product.id,
                name: product.name,
                image: product.image,
                quantity,
                unit_price: product.price,
            })
            .collect();

        let order = match self
            .persist_order(&reservation, user_id, items, source, token)
            .await
        {
            Ok(Persisted::Created(order)) => order,
            Ok(Persisted::Duplicate(order)) => {
                self.ledger.release(&reservation);
                transition(state, CheckoutState::Aborted);
                tracing::info!(order_id = %order.id, "concurrent request with the same token won");
                return Ok(CheckoutOutcome {
                    order,
                    replayed: true,
                });
            }
            Err(e) => {
                self.ledger.release(&reservation);
                return Err(e);
            }
        };
        transition(state, CheckoutState::Committed);

        if !source.is_direct() {
            self.clear_cart(user_id, order.id).await;
        }

        Ok(CheckoutOutcome {
            order,
            replayed: false,
        })
    }

    /// Resolves every requested line to its current catalog product.
    async fn resolve_lines(&self, user_id: UserId, source: Source) -> Result<Vec<(Product, u32)>> {
        let requested: Vec<(ProductId, u32)> = match source {
            Source::Cart => {
                let cart = self.carts.get_cart(user_id).await?;
                if cart.is_empty() {
                    return Err(CheckoutError::Validation("cart is empty".to_string()));
                }
                cart.items()
                    .iter()
                    .map(|item| (item.product_id, item.quantity))
                    .collect()
            }
            Source::Direct {
                product_id,
                quantity,
            } => vec![(product_id, quantity)],
        };

        let mut lines = Vec::with_capacity(requested.len());
        for (product_id, quantity) in requested {
            if quantity == 0 {
                return Err(CheckoutError::Validation(format!(
                    "quantity for product {product_id} must be at least 1"
                )));
            }
            let product = self
                .catalog
                .get_product(product_id)
                .await?
                .ok_or(CheckoutError::NotFound { product_id })?;
            lines.push((product, quantity));
        }
        Ok(lines)
    }

    /// Commits the reservation together with the order, its token record
    /// and (for carts) the pending cart clear, under the next order id.
    ///
    /// Conflicts and store failures are retried with backoff. When retries
    /// run out the reservation is still held and nothing has been written.
    async fn persist_order(
        &self,
        reservation: &Reservation,
        user_id: UserId,
        items: Vec<OrderItem>,
        source: Source,
        token: RequestToken,
    ) -> Result<Persisted> {
        let retry = self.config.retry;
        let mut attempt = 1;
        loop {
            let claim = Sequence::ORDERS.claim(&self.store).await?;
            let order = Order::pending(
                OrderId::new(claim.id),
                user_id,
                items.clone(),
                source.is_direct(),
                Utc::now(),
            );
            let record = CheckoutRecord {
                order_id: order.id,
                user_id,
                created_at: order.created_at,
            };

            let mut ops = vec![
                claim.op,
                WriteOp::upsert_as(Order::key(order.id), Version::initial(), &order)?,
                WriteOp::upsert_as(CheckoutRecord::key(token), Version::initial(), &record)?,
            ];
            if !source.is_direct() {
                ops.push(self.carts.pending_clear_op(user_id, order.id).await?);
            }

            match self.ledger.commit_with(reservation, ops).await {
                Ok(()) => {
                    tracing::info!(order_id = %order.id, "order persisted");
                    return Ok(Persisted::Created(order));
                }
                Err(e) if e.is_transient() => {
                    if matches!(e, CheckoutError::ConcurrencyConflict(_))
                        && let Some(existing) = self.find_replay(user_id, token).await?
                    {
                        return Ok(Persisted::Duplicate(existing));
                    }
                    if !retry.should_retry(attempt) {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt, "order commit failed, retrying");
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Looks up the order a token already produced.
    async fn find_replay(&self, user_id: UserId, token: RequestToken) -> Result<Option<Order>> {
        let Some(record) = self
            .store
            .get_as::<CheckoutRecord>(&CheckoutRecord::key(token))
            .await?
        else {
            return Ok(None);
        };

        let record = record.value;
        if record.user_id != user_id {
            return Err(CheckoutError::Validation(format!(
                "request token {token} was issued for another user"
            )));
        }

        let order = self
            .orders
            .get_order(record.order_id)
            .await?
            .ok_or_else(|| {
                CheckoutError::Persistence(format!(
                    "checkout {token} references missing order {}",
                    record.order_id
                ))
            })?;
        Ok(Some(order))
    }

    /// Takes the ordered lines out of the cart. Failures are left to the
    /// reconciliation on the next cart read.
    async fn clear_cart(&self, user_id: UserId, order_id: OrderId) {
        let retry = self.config.retry;
        for attempt in 1..=retry.max_attempts {
            match self.carts.remove_committed(user_id, order_id).await {
                Ok(_) => return,
                Err(e) => {
                    metrics::counter!("cart_clear_retries_total").increment(1);
                    tracing::warn!(%user_id, %order_id, attempt, error = %e, "cart clear failed");
                    if retry.should_retry(attempt) {
                        tokio::time::sleep(retry.backoff(attempt)).await;
                    }
                }
            }
        }
        tracing::warn!(%user_id, %order_id, "cart clear deferred to next cart read");
    }
}
