use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cart_orders::config::{AppConfig, StoreBackend};
use cart_orders::domain::coupon::{CouponLedger, DiscountKind, NewCouponDefinition};
use cart_orders::domain::{CartItemId, CouponId, MemberId};
use cart_orders::metrics::{self, Metrics};
use cart_orders::storage::{MemoryStore, PgStore, Store};
use cart_orders::{CouponService, OrderService};

const DEMO_MEMBER: MemberId = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cart_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting cart orders service");

    // === 1. Load configuration ===
    let config = AppConfig::from_env()?;
    tracing::info!(backend = ?config.backend, "Configuration loaded");

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    if config.metrics.enabled {
        // Start metrics HTTP server in background thread
        let metrics_registry = Arc::new(metrics.registry().clone());
        let port = config.metrics.port;
        std::thread::spawn(move || {
            actix_web::rt::System::new().block_on(async move {
                if let Err(e) = metrics::start_metrics_server(metrics_registry, port).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            });
        });
    }

    let ledger = CouponLedger::new(config.bonus_coupon.definition());

    // === 3. Build the store ===
    match config.backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = PgStore::connect(&config.database).await?;
            store.migrate().await?;
            tracing::info!("✅ Schema ready");

            let coupons = CouponService::new(store, ledger).with_metrics(metrics);
            let issuable = coupons.list_issuable_coupons(DEMO_MEMBER).await?;
            tracing::info!(definitions = issuable.len(), "Coupon catalog reachable");
        }
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            let (cart, coupon_id) = seed_demo(&store).await;

            let orders =
                OrderService::new(store.clone(), ledger.clone()).with_metrics(metrics.clone());
            let coupons = CouponService::new(store, ledger).with_metrics(metrics);

            // === 4. Demonstrate the order lifecycle ===
            run_demo(&orders, &coupons, &cart, coupon_id).await?;
        }
    }

    tracing::info!("🎉 Demo complete!");

    Ok(())
}

/// Products, a four-line cart and a 10% coupon definition for the demo member.
async fn seed_demo(store: &MemoryStore) -> (Vec<CartItemId>, CouponId) {
    let mut cart = Vec::new();
    for (name, price, quantity) in [
        ("Pour-over kettle", 3000, 1),
        ("Paper filters", 500, 4),
        ("Hand grinder", 4500, 1),
        ("Mug", 1200, 2),
    ] {
        let product = store.add_product(name, price).await;
        cart.push(store.add_cart_item(DEMO_MEMBER, product, quantity).await);
    }

    let coupon = store
        .add_coupon(NewCouponDefinition {
            name: "10% off over 5000".to_string(),
            kind: DiscountKind::Rate,
            minimum_price: 5000,
            discount_price: 0,
            discount_rate: 0.1,
        })
        .await;

    (cart, coupon.id)
}

async fn run_demo<S: Store>(
    orders: &OrderService<S>,
    coupons: &CouponService<S>,
    cart: &[CartItemId],
    coupon_id: CouponId,
) -> anyhow::Result<()> {
    tracing::info!("📝 Demonstrating order lifecycle");

    let grant = coupons.issue_coupon(DEMO_MEMBER, coupon_id).await?;
    tracing::info!(grant_id = grant.id, name = %grant.name, "Coupon issued to member");

    // Place an order with the coupon and confirm it
    let first = orders
        .place_order(DEMO_MEMBER, &cart[..2], Some(grant.id))
        .await?;
    let bonus = orders.confirm_order(DEMO_MEMBER, first).await?;
    tracing::info!(order_id = first, bonus = %bonus.name, "Order confirmed with bonus coupon");

    // Place a second order with the bonus and cancel it
    let second = orders
        .place_order(DEMO_MEMBER, &cart[2..], Some(bonus.id))
        .await?;
    let detail = orders.get_order(DEMO_MEMBER, second).await?;
    tracing::info!(
        order_id = second,
        original_price = detail.original_price,
        discount_price = detail.discount_price,
        final_price = detail.final_price,
        "Second order placed"
    );
    orders.cancel_order(DEMO_MEMBER, second).await?;

    for summary in orders.list_orders(DEMO_MEMBER).await? {
        tracing::info!(
            order_id = summary.id,
            first_product = ?summary.first_product_name,
            final_price = summary.final_price,
            state = ?summary.confirm_state,
            "Order on record"
        );
    }

    let held = coupons.list_member_coupons(DEMO_MEMBER).await?;
    tracing::info!(coupons = held.len(), "Coupons available to member");

    Ok(())
}
