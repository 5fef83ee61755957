//! Stateless Coordination
//!
//! Lets many replicas of the service cooperate without shared memory by
//! pushing every correctness-relevant fact into a shared cache:
//! - Operation idempotency (atomic set-if-absent, local fallback)
//! - Instance heartbeats
//! - Instance-scoped temporary data
//! - Advisory checks for operations that lean on hidden local state

mod cache;
mod coordinator;
mod idempotent;
mod keys;
mod registry;
mod validation;

pub use cache::{CacheError, MemoryCache, SharedCache};
pub use coordinator::{
    generate_instance_id, CoordinatorConfig, IdempotencyOutcome, IdempotencyScope,
    InstanceHeartbeat, OperationRecord, StatelessCoordinator,
};
pub use idempotent::{run_idempotent, Idempotent};
pub use keys::operation_key;
pub use validation::{validate_stateless_operation, StatelessValidation};
