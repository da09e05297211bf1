pub mod alerts;
pub mod allocator;
pub mod engine;
pub mod metrics;
pub mod pennying;
pub mod price_model;
pub mod reconciler;
pub mod spread;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_util;

pub use alerts::AlertManager;
pub use allocator::CapitalAllocator;
pub use engine::{filter_markets, Engine, EngineContext, QuoteSnapshot};
pub use metrics::{Metrics, MetricsSnapshot};
pub use price_model::{FairPrice, PriceModel};
pub use reconciler::{diff, DiffTolerance, ReconcilePlan};
pub use spread::{SpreadCalculator, SpreadInputs};
pub use worker::Trigger;
