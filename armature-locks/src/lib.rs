//! Armature Locks
//!
//! Process-local named locking for resource handlers.
//!
//! Cloud APIs frequently reject concurrent mutations against a shared parent
//! resource (e.g., two subnets being attached to the same virtual network).
//! Handlers serialize those mutations by acquiring a lock named after the
//! shared resource before issuing the request:
//!
//! ```ignore
//! let _vnet = registry.acquire("virtual_network", "vnet1").await;
//! // critical section: mutate the virtual network or its children
//! // lock released when _vnet goes out of scope, on every exit path
//! ```
//!
//! Locking is process-local only. It does not protect against concurrent
//! mutation from other processes; that is a known limitation, not a bug.

pub mod key;
pub mod registry;

pub use key::LockKey;
pub use registry::{LockGuard, LockRegistry};
