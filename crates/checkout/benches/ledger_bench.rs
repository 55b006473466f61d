use std::time::Duration;

use checkout::{CheckoutCoordinator, InventoryLedger};
use common::{ProductId, RequestToken, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Catalog, Money, NewProduct};
use record_store::InMemoryRecordStore;

fn seeded_store(rt: &tokio::runtime::Runtime, products: u32) -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    let catalog = Catalog::new(store.clone());
    rt.block_on(async {
        for i in 0..products {
            catalog
                .register_product(NewProduct::new(
                    format!("product-{i}"),
                    Money::from_cents(100),
                    u32::MAX,
                ))
                .await
                .unwrap();
        }
    });
    store
}

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InventoryLedger::new(seeded_store(&rt, 5), Duration::from_secs(1));
    let items: Vec<_> = (1..=5).map(|id| (ProductId::new(id), 1)).collect();

    c.bench_function("ledger/reserve_release_5_products", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = ledger.reserve_all(&items).await.unwrap();
                ledger.release(&reservation);
            });
        });
    });
}

fn bench_reserve_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InventoryLedger::new(seeded_store(&rt, 5), Duration::from_secs(1));
    let items: Vec<_> = (1..=5).map(|id| (ProductId::new(id), 1)).collect();

    c.bench_function("ledger/reserve_commit_5_products", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = ledger.reserve_all(&items).await.unwrap();
                ledger.commit(&reservation).await.unwrap();
            });
        });
    });
}

fn bench_direct_buy(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = CheckoutCoordinator::new(seeded_store(&rt, 1));

    c.bench_function("checkout/direct_buy", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .direct_buy(UserId::new(1), ProductId::new(1), 1, RequestToken::new())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_reserve_commit,
    bench_direct_buy
);
criterion_main!(benches);
