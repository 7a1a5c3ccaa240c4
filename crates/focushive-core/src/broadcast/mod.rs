//! Broadcast bus: delivers deltas to subscribers filtered by topic with
//! per-subscriber backpressure and multi-instance fan-out.

pub mod bus;
pub mod queue;

pub use bus::{BroadcastBus, ClusterChannel, NoCluster, Subscription};
pub use queue::{BusMessage, SubscriberQueue};
