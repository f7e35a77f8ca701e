pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod partition;

pub use bus::{EventBus, Subscription};
pub use event::{EventDecodeError, EventType, TransactionEvent};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use partition::{Partitioned, shard_for};
