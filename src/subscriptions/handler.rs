//! # Handler trait and function-backed handlers.
//!
//! [`Handler`] is the extension point for message consumers. Handlers run
//! on the publisher's task during fan-out; slow work should move to its
//! own task inside the handler.
//!
//! ## Contract
//! - Return `Ok(())` when the message is fully processed.
//! - Return [`HandlerError::retryable`] for transient failures — the bus
//!   retries with backoff up to the retry budget.
//! - Return [`HandlerError::fatal`] to skip retries and go straight to the
//!   dead letter store.
//! - A panic is caught and treated as fatal; it never unwinds the bus.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::message::Message;

/// Shared handler handle used throughout the bus.
pub type HandlerRef = Arc<dyn Handler>;

/// Contract for message handlers.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use busbar::{Handler, HandlerError, Message};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Handler for Audit {
///     async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
///         println!("audit: {}", message.id());
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "audit"
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles a single message.
    ///
    /// # Parameters
    /// - `message`: Reference to the message (does not transfer ownership)
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;

    /// Human-readable name (for logs and dead-letter records).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed handler implementation.
///
/// Wraps a closure that *creates* a new future per delivery, so no shared
/// mutable state is required. Shared state should be moved into the
/// closure explicitly via `Arc<...>`.
///
/// # Example
/// ```
/// use busbar::{HandlerError, HandlerFn, HandlerRef, Message};
///
/// let h: HandlerRef = HandlerFn::arc("billing", |msg: Message| async move {
///     let _ = msg.id();
///     Ok::<_, HandlerError>(())
/// });
///
/// assert_eq!(h.name(), "billing");
/// ```
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        (self.f)(message.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_handler_fn_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_inner = Arc::clone(&calls);

        let h = HandlerFn::new("counter", move |_msg: Message| {
            let calls = Arc::clone(&calls_inner);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let msg = Message::new(1, "payload");
        h.handle(&msg).await.unwrap();
        h.handle(&msg).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.name(), "counter");
    }

    #[tokio::test]
    async fn test_handler_fn_propagates_errors() {
        let h = HandlerFn::new("flaky", |_msg: Message| async {
            Err(HandlerError::retryable("downstream timeout"))
        });

        let msg = Message::new(1, ());
        let err = h.handle(&msg).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_default_name_is_type_name() {
        struct Named;

        #[async_trait]
        impl Handler for Named {
            async fn handle(&self, _message: &Message) -> Result<(), HandlerError> {
                Ok(())
            }
        }

        assert!(Named.name().contains("Named"));
    }
}
