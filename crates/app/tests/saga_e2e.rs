//! End-to-end saga runs: every participant subscribed on one in-memory
//! bus, driven only by published events.

use std::sync::Arc;
use std::time::Duration;

use app::Services;
use common::{Money, OrderId, ProductId, UserId};
use contract::{OrderEvent, OrderLine, PaymentStatus, publish, topics};
use event_bus::{DEAD_LETTER_TOPIC, EventBus, InMemoryEventBus, RetryPolicy};
use notification::RecordingNotifier;
use order::{Order, OrderRepository, OrderStatus};
use payment::PaymentRepository;
use product::StockLedger;

struct World {
    services: Services,
    notifier: Arc<RecordingNotifier>,
    shirt: ProductId,
    mug: ProductId,
}

/// Two seeded products: 5 shirts, 3 mugs.
async fn world() -> World {
    let bus = InMemoryEventBus::with_options(4, RetryPolicy::new(2, Duration::from_millis(5)));
    let notifier = Arc::new(RecordingNotifier::new());
    let services = Services::start(bus, notifier.clone() as _)
        .await
        .expect("subscribe participants");

    let shirt = ProductId::new();
    let mug = ProductId::new();
    services.stock.set(shirt, 5).await.unwrap();
    services.stock.set(mug, 3).await.unwrap();

    World {
        services,
        notifier,
        shirt,
        mug,
    }
}

async fn available(world: &World, product: ProductId) -> i64 {
    world
        .services
        .stock
        .get(product)
        .await
        .unwrap()
        .unwrap()
        .available
}

fn order_lines(world: &World) -> Vec<OrderLine> {
    vec![
        OrderLine::new(world.shirt, 2, Money::from_cents(2000)),
        OrderLine::new(world.mug, 1, Money::from_cents(500)),
    ]
}

#[tokio::test]
async fn happy_path_confirms_order_and_captures_payment() {
    let world = world().await;

    let order = world
        .services
        .saga
        .create_order_saga(UserId::new(), order_lines(&world), Money::from_cents(4500))
        .await
        .unwrap();
    world.services.bus.wait_until_idle().await;

    let settled = world.services.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(settled.status, OrderStatus::Confirmed);

    // Stock decremented, one COMPLETED payment for the full amount.
    assert_eq!(available(&world, world.shirt).await, 3);
    assert_eq!(available(&world, world.mug).await, 2);

    let payments = world.services.payments.find_by_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Completed);
    assert_eq!(payments[0].amount, Money::from_cents(4500));

    // Exactly one of each lifecycle event.
    for event_type in [
        "order-created",
        "order-products-reserved",
        "order-confirmed",
    ] {
        assert_eq!(
            world
                .services
                .bus
                .published_count(topics::ORDER_EVENTS, event_type),
            1,
            "expected exactly one {event_type}"
        );
    }
    assert_eq!(
        world
            .services
            .bus
            .published_count(topics::PAYMENT_EVENTS, "payment-processed"),
        1
    );

    let messages = world.notifier.messages_for(order.id);
    assert!(messages.iter().any(|m| m.contains("confirmed")));
    assert!(world
        .services
        .bus
        .published_on(DEAD_LETTER_TOPIC)
        .is_empty());
}

#[tokio::test]
async fn partial_reservation_failure_rolls_back_and_fails_order() {
    let world = world().await;
    // Mugs are sold out; shirts get reserved first and must come back.
    world.services.stock.set(world.mug, 0).await.unwrap();

    let order = world
        .services
        .saga
        .create_order_saga(UserId::new(), order_lines(&world), Money::from_cents(4500))
        .await
        .unwrap();
    world.services.bus.wait_until_idle().await;

    let settled = world.services.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(settled.status, OrderStatus::Failed);

    // Item-by-item rollback restored the shirts.
    assert_eq!(available(&world, world.shirt).await, 5);
    assert_eq!(available(&world, world.mug).await, 0);

    assert_eq!(
        world
            .services
            .bus
            .published_count(topics::PRODUCT_EVENTS, "product-reservation-failed"),
        1
    );
    // Payment is never attempted.
    assert!(world
        .services
        .payments
        .find_by_order(order.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(world.services.gateway.capture_count(), 0);
}

#[tokio::test]
async fn payment_decline_compensates_stock_and_cancels_order() {
    let world = world().await;
    world.services.gateway.decline("card declined");

    let order = world
        .services
        .saga
        .create_order_saga(UserId::new(), order_lines(&world), Money::from_cents(4500))
        .await
        .unwrap();
    world.services.bus.wait_until_idle().await;

    // Failed on the decline, then cancelled once stock came back.
    let settled = world.services.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(settled.status, OrderStatus::Cancelled);

    assert_eq!(available(&world, world.shirt).await, 5);
    assert_eq!(available(&world, world.mug).await, 3);

    let payments = world.services.payments.find_by_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);

    assert_eq!(
        world
            .services
            .bus
            .published_count(topics::ORDER_EVENTS, "order-payment-failed"),
        1
    );
    assert_eq!(
        world
            .services
            .bus
            .published_count(topics::PRODUCT_EVENTS, "product-stock-released"),
        1
    );
    assert_eq!(
        world
            .services
            .bus
            .published_count(topics::ORDER_EVENTS, "order-confirmed"),
        0
    );
}

#[tokio::test]
async fn redelivered_order_created_reserves_stock_once() {
    let world = world().await;

    let order = world
        .services
        .saga
        .create_order_saga(UserId::new(), order_lines(&world), Money::from_cents(4500))
        .await
        .unwrap();
    world.services.bus.wait_until_idle().await;

    // Simulate at-least-once delivery replaying the saga start.
    let replay = OrderEvent::OrderCreated {
        order_id: order.id,
        user_id: order.user_id,
        items: order.items.clone(),
        total_amount: order.total_amount,
    };
    publish(&world.services.bus, &replay).await.unwrap();
    world.services.bus.wait_until_idle().await;

    // No double reservation, no second capture, order still confirmed.
    assert_eq!(available(&world, world.shirt).await, 3);
    assert_eq!(available(&world, world.mug).await, 2);
    assert_eq!(world.services.gateway.capture_count(), 1);
    assert_eq!(
        world.services.orders.get(order.id).await.unwrap().unwrap().status,
        OrderStatus::Confirmed
    );
}

#[tokio::test]
async fn reaper_fails_order_stranded_in_pending() {
    let world = world().await;

    // An order whose order-created event was lost: the row exists but no
    // participant ever heard about it.
    let mut stranded = Order::new(
        UserId::new(),
        vec![OrderLine::new(world.shirt, 1, Money::from_cents(2000))],
        Money::from_cents(2000),
    );
    stranded.created_at = chrono::Utc::now() - chrono::Duration::seconds(120);
    world.services.orders.insert(&stranded).await.unwrap();

    let reaper = world
        .services
        .reaper(Duration::from_secs(30), Duration::from_secs(5));
    let reaped = reaper.sweep().await.unwrap();
    world.services.bus.wait_until_idle().await;

    assert_eq!(reaped, 1);
    let settled = world
        .services
        .orders
        .get(stranded.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Failed);
    assert_eq!(
        world
            .services
            .bus
            .published_count(topics::ORDER_EVENTS, "order-failed"),
        1
    );
    // Nothing was reserved, so nothing is released.
    assert_eq!(available(&world, world.shirt).await, 5);
    let timeout_messages = world.notifier.messages_for(stranded.id);
    assert!(timeout_messages.iter().any(|m| m.contains("timed out")));
}

#[tokio::test]
async fn concurrent_orders_share_limited_stock_without_oversell() {
    let world = world().await;
    // 5 shirts, three orders wanting 2 each: exactly one must fail.
    let mut ids: Vec<OrderId> = Vec::new();
    for _ in 0..3 {
        let order = world
            .services
            .saga
            .create_order_saga(
                UserId::new(),
                vec![OrderLine::new(world.shirt, 2, Money::from_cents(2000))],
                Money::from_cents(4000),
            )
            .await
            .unwrap();
        ids.push(order.id);
    }
    world.services.bus.wait_until_idle().await;

    let mut confirmed = 0;
    let mut failed = 0;
    for id in ids {
        match world.services.orders.get(id).await.unwrap().unwrap().status {
            OrderStatus::Confirmed => confirmed += 1,
            OrderStatus::Failed => failed += 1,
            other => panic!("order settled in unexpected status {other}"),
        }
    }
    assert_eq!(confirmed, 2);
    assert_eq!(failed, 1);
    assert_eq!(available(&world, world.shirt).await, 1);
}

#[tokio::test]
async fn unknown_order_event_goes_to_dead_letter() {
    let world = world().await;

    world
        .services
        .bus
        .publish(
            topics::ORDER_EVENTS,
            "bad-key",
            "order-exploded",
            serde_json::json!({"orderId": "not-a-uuid"}),
        )
        .await
        .unwrap();
    world.services.bus.wait_until_idle().await;

    // The product and payment participants each reject it as malformed;
    // the notification dispatcher drops it silently.
    let dead = world.services.bus.published_on(DEAD_LETTER_TOPIC);
    assert_eq!(dead.len(), 2);
    for entry in &dead {
        assert_eq!(entry.payload["sourceTopic"], topics::ORDER_EVENTS);
    }
}
