//! Integration tests for the storefront services.
//!
//! These tests exercise the catalog, cart and order services together over a
//! shared store, the way the checkout core uses them.

use chrono::Utc;
use common::{OrderId, ProductId, UserId};
use domain::{
    CartService, Catalog, DomainError, Money, NewProduct, Order, OrderItem, OrderRepository,
    OrderStatus, Sequence,
};
use record_store::{InMemoryRecordStore, RecordStore, Version, WriteOp};

struct Storefront {
    store: InMemoryRecordStore,
    catalog: Catalog<InMemoryRecordStore>,
    carts: CartService<InMemoryRecordStore>,
    orders: OrderRepository<InMemoryRecordStore>,
}

async fn storefront() -> Storefront {
    let store = InMemoryRecordStore::new();
    let catalog = Catalog::new(store.clone());
    catalog
        .register_product(NewProduct::new("Widget", Money::from_cents(1000), 10).category("tools"))
        .await
        .unwrap();
    catalog
        .register_product(NewProduct::new("Gadget", Money::from_cents(500), 3))
        .await
        .unwrap();

    Storefront {
        carts: CartService::new(store.clone()),
        orders: OrderRepository::new(store.clone()),
        catalog,
        store,
    }
}

/// Writes an order built from the user's cart the way checkout does: order
/// id claim, order document and pending cart clear in one batch.
async fn place_order(shop: &Storefront, user: UserId) -> Order {
    let cart = shop.carts.get_cart(user).await.unwrap();
    let claim = Sequence::ORDERS.claim(&shop.store).await.unwrap();
    let items = cart
        .items()
        .iter()
        .map(|line| OrderItem {
            product_id: line.product_id,
            name: line.name.clone(),
            image: line.image.clone(),
            quantity: line.quantity,
            unit_price: line.price,
        })
        .collect();
    let order = Order::pending(OrderId::new(claim.id), user, items, false, Utc::now());

    let ops = vec![
        claim.op,
        WriteOp::upsert_as(Order::key(order.id), Version::initial(), &order).unwrap(),
        shop.carts.pending_clear_op(user, order.id).await.unwrap(),
    ];
    shop.store.write_batch(ops).await.unwrap();
    order
}

mod cart_lifecycle {
    use super::*;

    #[tokio::test]
    async fn cart_totals_follow_captured_prices() {
        let shop = storefront().await;
        let user = UserId::new(1);

        shop.carts.add_item(user, ProductId::new(1), 2).await.unwrap();
        let cart = shop.carts.add_item(user, ProductId::new(2), 1).await.unwrap();

        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.total(), Money::from_dollars(25));
    }

    #[tokio::test]
    async fn carts_are_per_user() {
        let shop = storefront().await;

        shop.carts
            .add_item(UserId::new(1), ProductId::new(1), 1)
            .await
            .unwrap();

        assert!(shop.carts.get_cart(UserId::new(2)).await.unwrap().is_empty());
        assert_eq!(
            shop.carts
                .get_cart(UserId::new(1))
                .await
                .unwrap()
                .total_quantity(),
            1
        );
    }

    #[tokio::test]
    async fn adding_does_not_check_stock() {
        let shop = storefront().await;
        let cart = shop
            .carts
            .add_item(UserId::new(1), ProductId::new(2), 50)
            .await
            .unwrap();
        assert_eq!(cart.total_quantity(), 50);

        let product = shop.catalog.get_product(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(product.stock, 3);
    }
}

mod order_placement {
    use super::*;

    #[tokio::test]
    async fn placed_order_clears_cart_and_is_listed() {
        let shop = storefront().await;
        let user = UserId::new(7);
        shop.carts.add_item(user, ProductId::new(1), 2).await.unwrap();
        shop.carts.add_item(user, ProductId::new(2), 1).await.unwrap();

        let order = place_order(&shop, user).await;
        assert_eq!(order.id, OrderId::new(1));
        assert_eq!(order.total, Money::from_dollars(25));

        assert!(shop.carts.get_cart(user).await.unwrap().is_empty());
        let listed = shop.orders.list_orders(Some(user)).await.unwrap();
        assert_eq!(listed, vec![order]);
    }

    #[tokio::test]
    async fn order_snapshot_survives_cart_changes() {
        let shop = storefront().await;
        let user = UserId::new(1);
        shop.carts.add_item(user, ProductId::new(1), 1).await.unwrap();

        let order = place_order(&shop, user).await;
        shop.carts.add_item(user, ProductId::new(2), 2).await.unwrap();

        let stored = shop.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].name, "Widget");

        let cart = shop.carts.get_cart(user).await.unwrap();
        assert_eq!(cart.total_quantity(), 2);
    }

    #[tokio::test]
    async fn order_ids_increase() {
        let shop = storefront().await;
        let user = UserId::new(1);

        shop.carts.add_item(user, ProductId::new(1), 1).await.unwrap();
        let first = place_order(&shop, user).await;
        shop.carts.add_item(user, ProductId::new(1), 1).await.unwrap();
        let second = place_order(&shop, user).await;

        assert!(second.id > first.id);
        assert_eq!(shop.orders.list_orders(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_order_cannot_progress() {
        let shop = storefront().await;
        let user = UserId::new(1);
        shop.carts.add_item(user, ProductId::new(1), 1).await.unwrap();
        let order = place_order(&shop, user).await;

        shop.orders
            .update_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        let result = shop
            .orders
            .update_status(order.id, OrderStatus::Processing)
            .await;

        assert!(matches!(result, Err(DomainError::Order(_))));
    }
}
