//! External KDC adapter and identity lifecycle engine.
//!
//! The planner only plans; the server-action tasks it emits are executed by
//! the engine in this crate, which talks to the KDC through the async
//! [`KdcOperationHandler`] trait. Implementations: an MIT `kadmin` shell-out
//! handler and an in-memory KDC for tests and dry-runs.
//!
//! The engine is idempotent: a persisted principal store records every
//! principal created, and "ensure identities" skips anything already
//! recorded, so a partially failed pass can be safely re-run.

pub mod credential;
pub mod data_file;
pub mod engine;
pub mod memory;
pub mod mit;
pub mod operations;
pub mod store;

pub use credential::{CredentialStore, PrincipalKeyCredential};
pub use data_file::{IdentityDataFileReader, IdentityDataFileWriter, IdentityRecord, DATA_FILE_NAME};
pub use engine::{
    cleanup_data_directory, delete_identities, ensure_identities, validate_admin_credentials,
    EnsureIdentitiesOutcome,
};
pub use memory::InMemoryKdc;
pub use mit::MitKdcHandler;
pub use operations::{KdcError, KdcOperationHandler};
pub use store::{PrincipalRecord, PrincipalStore};
