pub mod control;
pub mod error;
pub mod index;
pub mod registry;
pub mod state;

pub use control::ControlSurface;
pub use error::{Result, StoreError};
pub use index::{IndexStats, IndexStore, PendingSpan, SpanDelta};
pub use registry::Registry;
pub use state::StateStore;
