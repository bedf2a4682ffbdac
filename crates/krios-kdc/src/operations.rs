//! The async boundary to an external KDC.

use crate::credential::PrincipalKeyCredential;
use async_trait::async_trait;
use krios_core::{CredentialError, KriosError};
use std::collections::BTreeMap;
use std::path::Path;

/// Error raised by KDC operations.
#[derive(Debug, thiserror::Error)]
pub enum KdcError {
    #[error("the KDC rejected the administrator credential for '{0}'")]
    AuthenticationFailed(String),

    #[error("failed to connect to the KDC: {0}")]
    KdcUnreachable(String),

    #[error("failed to find a KDC for realm '{0}'")]
    RealmNotFound(String),

    #[error("the principal container is not configured")]
    PrincipalContainerNotSet,

    #[error("principal '{0}' does not exist")]
    PrincipalNotFound(String),

    #[error("the KDC operation handler is not open")]
    NotOpen,

    #[error("KDC operation failed: {0}")]
    OperationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KdcError {
    /// Map a failure seen while validating administrator credentials into
    /// the credential error taxonomy surfaced to callers.
    pub fn into_credential_error(self, principal: &str) -> KriosError {
        let credential_error = match self {
            KdcError::AuthenticationFailed(_) => CredentialError::authentication_failed(principal),
            KdcError::KdcUnreachable(detail) => CredentialError::kdc_unreachable(&detail),
            KdcError::RealmNotFound(realm) => CredentialError::realm_not_found(&realm),
            KdcError::PrincipalContainerNotSet => CredentialError::principal_container_not_set(),
            other => {
                return KriosError::validation(format!(
                    "KDC administrator credential validation failed: {}",
                    other
                ));
            }
        };
        KriosError::Credential(credential_error)
    }
}

/// Handle to an external KDC, scoped by `open`/`close`.
///
/// A handler is opened once per pass with the administrator credential, used
/// for a bounded sequence of operations, and closed on every exit path. No
/// operation may proceed on a handle that failed to open.
#[async_trait]
pub trait KdcOperationHandler: Send + Sync {
    /// Open the handle with the administrator credential. Implementations
    /// must reject subsequent operations until opened.
    async fn open(
        &mut self,
        credential: &PrincipalKeyCredential,
        realm: &str,
        kerberos_env: &BTreeMap<String, String>,
    ) -> Result<(), KdcError>;

    /// Close the handle. Close-time failures are best-effort cleanup; the
    /// caller logs and swallows them.
    async fn close(&mut self) -> Result<(), KdcError>;

    /// Verify that the administrator credential is accepted by the KDC.
    async fn test_administrator_credentials(&self) -> Result<bool, KdcError>;

    async fn principal_exists(&self, principal: &str) -> Result<bool, KdcError>;

    /// Create a principal, returning its key number.
    async fn create_principal(
        &mut self,
        principal: &str,
        password: &str,
        service: bool,
    ) -> Result<u32, KdcError>;

    /// Remove a principal; returns false when it did not exist (a normal,
    /// non-exceptional branch).
    async fn remove_principal(&mut self, principal: &str) -> Result<bool, KdcError>;

    /// Export a keytab for the principal to `keytab_path`.
    async fn create_keytab(
        &mut self,
        principal: &str,
        password: &str,
        key_number: u32,
        keytab_path: &Path,
    ) -> Result<(), KdcError>;
}
