//! Core types shared across all Krios crates.
//!
//! This crate holds the in-memory cluster model the planner operates on, the
//! security state machine, the Kerberos descriptor tree (identity templates
//! with principal/keytab expressions and conditional `when` predicates), the
//! request-level directives, and the shared error taxonomy.
//!
//! Entity persistence, REST resources and agent transport are out of scope;
//! everything here is a plain snapshot constructed by the caller.

pub mod cluster;
pub mod descriptor;
pub mod directives;
pub mod error;
pub mod state;

pub use cluster::{
    ClusterSnapshot, Component, Host, MaintenanceState, SchState, Service, ServiceComponentHost,
};
pub use descriptor::{
    ComponentDescriptor, IdentityDescriptor, KerberosDescriptor, KeytabAcl, KeytabDescriptor,
    Predicate, PredicateContext, PrincipalDescriptor, PrincipalType, ServiceDescriptor,
};
pub use directives::{Directives, RegenerateMode};
pub use error::{CredentialError, CredentialErrorKind, KriosError};
pub use state::{SecurityState, SecurityType};
