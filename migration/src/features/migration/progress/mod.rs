pub mod events;
pub mod metrics;

pub use events::*;
pub use metrics::*;
