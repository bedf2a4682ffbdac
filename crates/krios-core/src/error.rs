//! Shared error taxonomy.
//!
//! Configuration errors, credential errors and validation errors are fatal
//! to the current operation and surface immediately; they are distinct kinds
//! because remediation differs. Partial-data conditions (maintenance-
//! suppressed hosts, missing repository info) are logged warnings, never
//! errors. Cleanup failures are logged and swallowed at the call site.

use std::fmt;

/// Error raised by planning and identity-lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum KriosError {
    /// Missing or malformed configuration (absent `krb5-conf`/`kerberos-env`,
    /// unresolvable variable, invalid KDC type). Planning does not proceed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// KDC administrator credential problems; carries a sub-kind so callers
    /// can render actionable guidance.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A single request failed validation (bad action name, bad filter,
    /// unknown host); independent of other in-flight requests.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl KriosError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        KriosError::InvalidConfiguration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        KriosError::Validation(message.into())
    }
}

/// Categories of credential failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialErrorKind {
    /// No KDC administrator credential has been provided.
    MissingCredential,
    /// The KDC rejected the administrator credential.
    AuthenticationFailed,
    /// The KDC could not be reached.
    KdcUnreachable,
    /// No KDC was found for the specified realm.
    RealmNotFound,
    /// The principal container (AD-style deployments) is not configured.
    PrincipalContainerNotSet,
}

/// Error type for KDC administrator credential failures.
#[derive(Debug, Clone)]
pub struct CredentialError {
    pub kind: CredentialErrorKind,
    pub message: String,
}

impl CredentialError {
    pub fn new(kind: CredentialErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_credential() -> Self {
        Self::new(
            CredentialErrorKind::MissingCredential,
            "Missing KDC administrator credential. \
             Set the kdc.admin.credential resource before managing identities",
        )
    }

    pub fn authentication_failed(principal: &str) -> Self {
        Self::new(
            CredentialErrorKind::AuthenticationFailed,
            format!(
                "Invalid KDC administrator credential for principal '{}'; \
                 the KDC rejected the authentication attempt",
                principal
            ),
        )
    }

    pub fn kdc_unreachable(detail: &str) -> Self {
        Self::new(
            CredentialErrorKind::KdcUnreachable,
            format!("Failed to connect to the KDC: {}", detail),
        )
    }

    pub fn realm_not_found(realm: &str) -> Self {
        Self::new(
            CredentialErrorKind::RealmNotFound,
            format!("Failed to find a KDC for the specified realm '{}'", realm),
        )
    }

    pub fn principal_container_not_set() -> Self {
        Self::new(
            CredentialErrorKind::PrincipalContainerNotSet,
            "The principal container was not specified; \
             set kerberos-env/container_dn for directory-backed KDC types",
        )
    }
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CredentialError {}
