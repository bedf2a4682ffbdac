//! KDC administrator credentials.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// A principal plus its secret key (password), used to authenticate against
/// the KDC's administrative interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalKeyCredential {
    pub principal: String,
    pub key: String,
}

impl PrincipalKeyCredential {
    pub fn new(principal: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            key: key.into(),
        }
    }
}

/// In-memory store of KDC administrator credentials, keyed by cluster name.
///
/// Credentials are request-scoped secrets: callers set them before an
/// operation and may remove them afterwards. Absence surfaces as a
/// missing-credential error during validation, never a panic.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: Mutex<BTreeMap<String, PrincipalKeyCredential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_kdc_credential(&self, cluster_name: &str, credential: PrincipalKeyCredential) {
        self.entries
            .lock()
            .expect("credential store lock poisoned")
            .insert(cluster_name.to_string(), credential);
    }

    pub fn get_kdc_credential(&self, cluster_name: &str) -> Option<PrincipalKeyCredential> {
        self.entries
            .lock()
            .expect("credential store lock poisoned")
            .get(cluster_name)
            .cloned()
    }

    pub fn remove_kdc_credential(&self, cluster_name: &str) {
        self.entries
            .lock()
            .expect("credential store lock poisoned")
            .remove(cluster_name);
    }
}
