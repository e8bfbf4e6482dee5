//! # Example: order_flow
//!
//! Demonstrates typed fan-out with priorities and filters: every order
//! is audited, only big totals reach the fraud desk, and only
//! high-priority orders page the on-call.
//!
//! ## Flow
//! ```text
//! register_type(42, "OrderPlaced")
//!   ├─► subscribe("audit")                        — no filter
//!   ├─► subscribe("fraud", filter total > 900_00) — payload filter
//!   └─► subscribe("pager", min_priority = High)   — priority floor
//!
//! publish(order #1,  120_00, Normal)   → audit
//! publish(order #2,  950_00, Normal)   → audit, fraud
//! publish(order #3, 1999_00, Critical) → audit, fraud, pager
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example order_flow --features logging
//! ```

use std::sync::Arc;

use busbar::{
    BusConfig, HandlerError, HandlerFn, LogWriter, Message, MessageBus, Priority, SubscribeOptions,
};

#[derive(Debug)]
struct Order {
    number: u32,
    total_cents: u64,
}

const ORDER_PLACED: u16 = 42;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Build the bus with the stdout logger (feature = "logging").
    let bus = MessageBus::builder(BusConfig::default())
        .with_logger(Arc::new(LogWriter::default()))
        .build()?;

    // 2. Register the message type once; duplicate codes or names fail.
    bus.register_type(ORDER_PLACED, "OrderPlaced")?;

    // 3. Audit sees everything, in subscription order (first).
    bus.subscribe(
        ORDER_PLACED,
        HandlerFn::arc("audit", |msg: Message| async move {
            let order = msg
                .payload_as::<Order>()
                .ok_or_else(|| HandlerError::fatal("expected an Order payload"))?;
            println!("[audit] order #{} ({} cents)", order.number, order.total_cents);
            Ok(())
        }),
    );

    // 4. Fraud only looks at big totals.
    bus.subscribe_with(
        ORDER_PLACED,
        HandlerFn::arc("fraud", |msg: Message| async move {
            let order = msg
                .payload_as::<Order>()
                .ok_or_else(|| HandlerError::fatal("expected an Order payload"))?;
            println!("[fraud] reviewing order #{}", order.number);
            Ok::<_, HandlerError>(())
        }),
        SubscribeOptions::new().with_filter(|msg| {
            msg.payload_as::<Order>()
                .is_some_and(|order| order.total_cents > 900_00)
        }),
    );

    // 5. The pager fires only for High and Critical messages.
    bus.subscribe_with(
        ORDER_PLACED,
        HandlerFn::arc("pager", |msg: Message| async move {
            println!("[pager] paging on-call for {}", msg.id());
            Ok::<_, HandlerError>(())
        }),
        SubscribeOptions::new().with_min_priority(Priority::High),
    );

    // 6. Publish three orders with different totals and priorities.
    let orders = vec![
        Message::new(ORDER_PLACED, Order { number: 1, total_cents: 120_00 })
            .with_source("checkout")
            .with_correlation("req-0001"),
        Message::new(ORDER_PLACED, Order { number: 2, total_cents: 950_00 })
            .with_source("checkout")
            .with_correlation("req-0002"),
        Message::new(ORDER_PLACED, Order { number: 3, total_cents: 1999_00 })
            .with_source("checkout")
            .with_correlation("req-0003")
            .with_priority(Priority::Critical),
    ];

    for message in orders {
        let receipt = bus.publish(message).await?;
        println!(
            "[main] receipt: delivered={} filtered={} of {} subscribers",
            receipt.delivered, receipt.filtered, receipt.subscribers
        );
    }

    // 7. The statistics reflect the whole run.
    let stats = bus.statistics();
    println!(
        "[main] published={} delivered={} filtered={}",
        stats.published, stats.delivered, stats.filtered
    );
    Ok(())
}
