//! Pipeline events and the bus that distributes them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::{Event, ExportEvent};
pub use in_memory_bus::InMemoryEventBus;
