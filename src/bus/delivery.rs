//! # Retry-wrapped delivery of one message to one subscriber.
//!
//! [`deliver_with_retry`] is the single-subscriber leg of a publish: it
//! runs attempts sequentially, feeds every attempt's outcome into the
//! circuit breaker, sleeps the backoff delay between attempts, and honors
//! cooperative cancellation at safe points.
//!
//! ## Attempt flow
//! ```text
//! loop {
//!   ├─► cancelled? ───────────────► Cancelled
//!   ├─► handler.handle(msg)
//!   │       ├─ Ok          ──► breaker.record_success ──► Delivered
//!   │       ├─ Err(fatal)  ──► breaker.record_failure ──► Fatal
//!   │       ├─ panic       ──► (caught, treated as fatal)
//!   │       └─ Err(retryable) ─► breaker.record_failure
//!   │               ├─ budget left ──► sleep(backoff) ──► next attempt
//!   │               │                     └─ cancelled ──► Cancelled
//!   │               └─ exhausted   ──► Exhausted
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially**; one subscriber never sees two
//!   attempts of the same message in parallel.
//! - Every attempt is an individual breaker signal, so a retry storm
//!   trips the breaker as fast as distinct publishes would.
//! - A panicking handler is caught (`catch_unwind`) and mapped to a
//!   fatal error: retrying a panic burns attempts for nothing.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::breakers::CircuitBreakers;
use crate::clock::Clock;
use crate::error::HandlerError;
use crate::message::Message;
use crate::policies::RetryPolicy;
use crate::subscriptions::HandlerRef;

/// Terminal result of one subscriber's delivery.
#[derive(Debug)]
pub(crate) enum DeliveryOutcome {
    /// An attempt succeeded. `elapsed` is the successful attempt's
    /// duration (not the total including failed attempts).
    Delivered { attempts: u32, elapsed: Duration },
    /// Every attempt in the budget failed with a retryable error.
    Exhausted { attempts: u32, error: HandlerError },
    /// A fatal error (or panic) ended delivery early.
    Fatal { attempts: u32, error: HandlerError },
    /// Cancellation stopped delivery between attempts.
    Cancelled { attempts: u32 },
}

impl DeliveryOutcome {
    /// Attempts actually started.
    pub(crate) fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts, .. }
            | DeliveryOutcome::Exhausted { attempts, .. }
            | DeliveryOutcome::Fatal { attempts, .. }
            | DeliveryOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// Shared pieces the delivery leg needs from the orchestrator.
pub(crate) struct DeliveryContext<'a> {
    pub(crate) retry: RetryPolicy,
    pub(crate) breakers: &'a CircuitBreakers,
    pub(crate) clock: &'a dyn Clock,
}

/// Delivers `message` to one handler with retries and backoff.
pub(crate) async fn deliver_with_retry(
    ctx: DeliveryContext<'_>,
    handler: &HandlerRef,
    message: &Message,
    cancel: Option<&CancellationToken>,
) -> DeliveryOutcome {
    let code = message.type_code();
    let mut attempt: u32 = 0;

    loop {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return DeliveryOutcome::Cancelled { attempts: attempt };
            }
        }
        attempt += 1;

        let started = ctx.clock.now();
        match attempt_once(handler, message).await {
            Ok(()) => {
                ctx.breakers.record_success(code);
                return DeliveryOutcome::Delivered {
                    attempts: attempt,
                    elapsed: ctx.clock.now().duration_since(started),
                };
            }
            Err(error) => {
                ctx.breakers.record_failure(code);

                if !error.is_retryable() {
                    return DeliveryOutcome::Fatal {
                        attempts: attempt,
                        error,
                    };
                }
                let Some(delay) = ctx.retry.delay_after(attempt) else {
                    return DeliveryOutcome::Exhausted {
                        attempts: attempt,
                        error,
                    };
                };

                match cancel {
                    None => time::sleep(delay).await,
                    Some(token) => {
                        let sleep = time::sleep(delay);
                        tokio::pin!(sleep);
                        select! {
                            _ = &mut sleep => {}
                            _ = token.cancelled() => {
                                return DeliveryOutcome::Cancelled { attempts: attempt };
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Runs one attempt, converting a panic into a fatal error.
async fn attempt_once(handler: &HandlerRef, message: &Message) -> Result<(), HandlerError> {
    let fut = handler.handle(message);
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic_err) => {
            let info = {
                let any = &*panic_err;
                if let Some(msg) = any.downcast_ref::<&'static str>() {
                    (*msg).to_string()
                } else if let Some(msg) = any.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "unknown panic".to_string()
                }
            };
            Err(HandlerError::fatal(format!("handler panicked: {info}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::observe::TransitionHub;
    use crate::policies::{BackoffPolicy, BreakerPolicy, JitterPolicy};
    use crate::subscriptions::HandlerFn;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_ctx<'a>(breakers: &'a CircuitBreakers, clock: &'a ManualClock) -> DeliveryContext<'a> {
        DeliveryContext {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: BackoffPolicy {
                    first: Duration::from_millis(1),
                    max: Duration::from_millis(4),
                    factor: 2.0,
                    jitter: JitterPolicy::None,
                },
            },
            breakers,
            clock,
        }
    }

    fn test_breakers(clock: Arc<ManualClock>) -> CircuitBreakers {
        CircuitBreakers::new(
            BreakerPolicy::default(),
            HashMap::new(),
            clock,
            Arc::new(TransitionHub::new()),
        )
    }

    fn failing_until(successes_after: u32) -> (HandlerRef, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = Arc::clone(&calls);
        let handler: HandlerRef = HandlerFn::arc("flaky", move |_msg: Message| {
            let calls = Arc::clone(&calls_inner);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n > successes_after {
                    Ok(())
                } else {
                    Err(HandlerError::retryable("not yet"))
                }
            }
        });
        (handler, calls)
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let (handler, calls) = failing_until(0);

        let outcome = deliver_with_retry(
            test_ctx(&breakers, &clock),
            &handler,
            &Message::new(1, ()),
            None,
        )
        .await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered { attempts: 1, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let (handler, calls) = failing_until(2);

        let outcome = deliver_with_retry(
            test_ctx(&breakers, &clock),
            &handler,
            &Message::new(1, ()),
            None,
        )
        .await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered { attempts: 3, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_last_error() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let (handler, calls) = failing_until(u32::MAX);

        let outcome = deliver_with_retry(
            test_ctx(&breakers, &clock),
            &handler,
            &Message::new(1, ()),
            None,
        )
        .await;

        match outcome {
            DeliveryOutcome::Exhausted { attempts, error } => {
                assert_eq!(attempts, 3);
                assert!(error.is_retryable());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_skips_remaining_attempts() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let handler: HandlerRef = HandlerFn::arc("strict", |_msg: Message| async {
            Err(HandlerError::fatal("schema mismatch"))
        });

        let outcome = deliver_with_retry(
            test_ctx(&breakers, &clock),
            &handler,
            &Message::new(1, ()),
            None,
        )
        .await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Fatal { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_panic_maps_to_fatal() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let handler: HandlerRef =
            HandlerFn::arc("bomb", |_msg: Message| async { panic!("kaboom") });

        let outcome = deliver_with_retry(
            test_ctx(&breakers, &clock),
            &handler,
            &Message::new(1, ()),
            None,
        )
        .await;

        match outcome {
            DeliveryOutcome::Fatal { attempts, error } => {
                assert_eq!(attempts, 1);
                assert!(error.to_string().contains("kaboom"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_attempts_feed_the_breaker() {
        let clock = Arc::new(ManualClock::default());
        let breakers = CircuitBreakers::new(
            BreakerPolicy {
                failure_threshold: 2,
                ..BreakerPolicy::default()
            },
            HashMap::new(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(TransitionHub::new()),
        );
        let (handler, _calls) = failing_until(u32::MAX);

        let ctx = DeliveryContext {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: BackoffPolicy {
                    first: Duration::from_millis(1),
                    max: Duration::from_millis(1),
                    factor: 1.0,
                    jitter: JitterPolicy::None,
                },
            },
            breakers: &breakers,
            clock: clock.as_ref(),
        };
        deliver_with_retry(ctx, &handler, &Message::new(1, ()), None).await;

        // Two retryable failures of one delivery tripped it.
        assert!(breakers.is_open(1));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_stops_before_first_attempt() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let (handler, calls) = failing_until(0);

        let token = CancellationToken::new();
        token.cancel();

        let outcome = deliver_with_retry(
            test_ctx(&breakers, &clock),
            &handler,
            &Message::new(1, ()),
            Some(&token),
        )
        .await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Cancelled { attempts: 0 }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff_sleep() {
        let clock = Arc::new(ManualClock::default());
        let breakers = test_breakers(Arc::clone(&clock));
        let (handler, calls) = failing_until(u32::MAX);

        let ctx = DeliveryContext {
            retry: RetryPolicy {
                max_attempts: 5,
                backoff: BackoffPolicy {
                    first: Duration::from_secs(60),
                    max: Duration::from_secs(60),
                    factor: 1.0,
                    jitter: JitterPolicy::None,
                },
            },
            breakers: &breakers,
            clock: clock.as_ref(),
        };

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome =
            deliver_with_retry(ctx, &handler, &Message::new(1, ()), Some(&token)).await;

        // One attempt ran, then cancellation beat the 60s backoff.
        assert!(matches!(
            outcome,
            DeliveryOutcome::Cancelled { attempts: 1 }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
