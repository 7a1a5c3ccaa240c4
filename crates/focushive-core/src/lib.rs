//! # FocusHive Core
//!
//! Core library for FocusHive's hardest-engineering subsystems: the auth
//! gateway, the resilience fabric wrapping outbound dependency calls, the
//! real-time presence core, the focus-timer synchronization core, and the
//! broadcast bus that routes deltas to subscribers. Persistence, HTTP
//! transport, and notification delivery are collaborator concerns this
//! crate only exposes narrow interfaces for (`KeyValueStore`, `TxnalStore`,
//! `DeltaPublisher`).
//!
//! The partnership & accountability engine lives in the sibling
//! `focushive-buddy` crate, which depends on this one only for its shared
//! kernel, error taxonomy, and resilience fabric.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod delta;
pub mod error;
pub mod kernel;
pub mod presence;
pub mod resilience;
pub mod timer;

pub use auth::{AuthGateway, Claims, Role, UserRef, VerifiedToken};
pub use broadcast::{BroadcastBus, ClusterChannel, NoCluster, Subscription};
pub use config::Config;
pub use delta::{Delta, DeltaEvent, DeltaPublisher, NullPublisher, Topic};
pub use error::{
    AuthenticationFailure, AuthorizationFailure, ConflictError, CoreError, DependencyUnavailableError,
    NotFoundError, TransientFailure, ValidationFailure,
};
pub use kernel::{
    Clock, FakeClock, Identifier, InMemoryKvStore, InMemoryTxnalStore, KeyValueStore, KvError, Scheduler,
    SystemClock, TaskHandle, TokioScheduler, TxnalStore, VersionedValue,
};
pub use presence::{DeviceSession, PresenceCore, PresenceRecord, PresenceStatus, RosterEntry};
pub use resilience::{CircuitBreaker, CircuitState, DependencyFabric, FabricRegistry};
pub use timer::{FocusSession, SessionState, SessionType, TimerCore, TimerTemplate};
