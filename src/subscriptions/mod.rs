//! # Subscriptions: handlers, options, handles, and the table.
//!
//! One subscription ties a [`Handler`] to a message type, optionally
//! narrowed by a predicate filter and a minimum priority, optionally owned
//! by a scope for bulk cancellation. The [`SubscriptionTable`] holds them
//! all and hands the delivery path an ordered snapshot per publish.

mod handle;
mod handler;
mod options;
mod table;

pub use handle::{ScopeId, SubscriptionHandle};
pub use handler::{Handler, HandlerFn, HandlerRef};
pub use options::{FilterFn, SubscribeOptions};

pub(crate) use table::{ActiveSubscription, SubscriptionTable};
