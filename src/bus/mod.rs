//! # Bus assembly: builder, orchestrator, delivery, receipts.
//!
//! ## Components
//! - **[`BusBuilder`]** config validation and component wiring.
//! - **[`MessageBus`]** the public API: registry, subscriptions,
//!   publish, breakers, dead letters, statistics, health.
//! - **delivery** per-subscriber retry loop feeding breaker signals.
//! - **[`PublishReceipt`]** per-publish outcome summary.

mod builder;
mod core;
mod delivery;
mod receipt;

pub use builder::BusBuilder;
pub use core::MessageBus;
pub use receipt::PublishReceipt;
