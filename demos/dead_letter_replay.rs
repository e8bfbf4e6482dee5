//! # Example: dead_letter_replay
//!
//! Demonstrates retry exhaustion, dead letter capture, and operator
//! replay. A payment handler fails while its downstream is "down"; the
//! message is retried with backoff, then dead-lettered with its attempt
//! count. Once the outage ends, the operator replays it.
//!
//! ## Flow
//! ```text
//! publish(payment)
//!   ├─► attempt 1 → Err(retryable "gateway 503")
//!   ├─► sleep(backoff), attempt 2 → Err
//!   ├─► sleep(backoff), attempt 3 → Err
//!   └─► dead letter { handler: "payments", attempts: 3 }
//!
//! operator:
//!   ├─► dead_letters(type, 10)        — inspect newest first
//!   ├─► replay_dead_letter(type, id)  — removes entry, returns message
//!   └─► publish(message)              — resubmit after the fix
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example dead_letter_replay --features logging
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use busbar::{
    BackoffPolicy, BusConfig, HandlerError, HandlerFn, JitterPolicy, LogWriter, Message,
    MessageBus,
};

const PAYMENT_DUE: u16 = 7;

static GATEWAY_DOWN: AtomicBool = AtomicBool::new(true);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Short backoff so the demo finishes quickly.
    let mut config = BusConfig::default();
    config.retry.backoff = BackoffPolicy {
        first: Duration::from_millis(50),
        max: Duration::from_millis(200),
        factor: 2.0,
        jitter: JitterPolicy::None,
    };

    let bus = MessageBus::builder(config)
        .with_logger(Arc::new(LogWriter::default()))
        .build()?;

    bus.register_type(PAYMENT_DUE, "PaymentDue")?;

    // 2. The handler fails with a retryable error while the gateway is down.
    bus.subscribe(
        PAYMENT_DUE,
        HandlerFn::arc("payments", |msg: Message| async move {
            if GATEWAY_DOWN.load(Ordering::Relaxed) {
                println!("[payments] gateway unreachable for {}", msg.id());
                return Err(HandlerError::retryable("gateway 503"));
            }
            println!("[payments] charged for {}", msg.id());
            Ok(())
        }),
    );

    // 3. All three attempts fail; the message lands in the dead letter store.
    let receipt = bus
        .publish(Message::new(PAYMENT_DUE, "invoice #553").with_correlation("req-0553"))
        .await?;
    println!(
        "[main] publish done: delivered={} failed={}",
        receipt.delivered, receipt.failed
    );

    for letter in bus.dead_letters(PAYMENT_DUE, 10) {
        println!(
            "[main] dead letter: id={} handler={} attempts={} error={:?}",
            letter.message().id(),
            letter.handler(),
            letter.attempts(),
            letter.error()
        );
    }

    // 4. The outage ends; replay hands the message back for resubmission.
    GATEWAY_DOWN.store(false, Ordering::Relaxed);

    let id = bus.dead_letters(PAYMENT_DUE, 1)[0].message().id();
    let recovered = bus.replay_dead_letter(PAYMENT_DUE, id)?;
    let receipt = bus.publish(recovered).await?;
    println!(
        "[main] replayed: delivered={} dead letters left={}",
        receipt.delivered,
        bus.dead_letter_count(PAYMENT_DUE)
    );
    Ok(())
}
