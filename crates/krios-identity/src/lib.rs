//! Identity resolution engine.
//!
//! Turns the declarative Kerberos descriptor tree into the concrete,
//! host-resolved set of identities that must exist (or be removed) for a
//! cluster, and renders the supporting artifacts: merged configuration
//! snapshots, `${type/property}` variable substitution, per-realm
//! auth-to-local rule text, and the per-operation Kerberos details.

pub mod auth_to_local;
pub mod calculator;
pub mod details;
pub mod resolver;
pub mod variables;

pub use auth_to_local::{generate_auth_to_local_property_updates, AuthToLocalBuilder};
pub use calculator::{calculate_configurations, merged_configurations};
pub use details::{KdcType, KerberosDetails};
pub use resolver::{
    get_active_identities, resolve_active_identities, ResolvedIdentity, ResolvedKeytab,
};
pub use variables::{replace_variables, replace_variables_strict};
