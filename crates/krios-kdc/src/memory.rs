//! In-memory KDC: the operation handler used by tests and CLI dry-runs.

use async_trait::async_trait;
use base64::Engine as _;
use rand::RngCore;
use std::collections::BTreeMap;
use std::path::Path;

use crate::credential::PrincipalKeyCredential;
use crate::operations::{KdcError, KdcOperationHandler};

#[derive(Debug, Clone)]
struct PrincipalEntry {
    password: String,
    key_number: u32,
    service: bool,
}

/// An in-memory stand-in for a real KDC.
///
/// Failure injection hooks (`reject_credentials`, `unreachable`) let tests
/// drive the credential error taxonomy without a network.
#[derive(Debug, Default)]
pub struct InMemoryKdc {
    open: bool,
    admin_principal: Option<String>,
    principals: BTreeMap<String, PrincipalEntry>,
    /// When set, `test_administrator_credentials` reports rejection.
    pub reject_credentials: bool,
    /// When set, `open` fails as if the KDC were unreachable.
    pub unreachable: bool,
}

impl InMemoryKdc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn principal_count(&self) -> usize {
        self.principals.len()
    }

    pub fn has_principal(&self, principal: &str) -> bool {
        self.principals.contains_key(principal)
    }

    fn ensure_open(&self) -> Result<(), KdcError> {
        if self.open {
            Ok(())
        } else {
            Err(KdcError::NotOpen)
        }
    }
}

#[async_trait]
impl KdcOperationHandler for InMemoryKdc {
    async fn open(
        &mut self,
        credential: &PrincipalKeyCredential,
        _realm: &str,
        _kerberos_env: &BTreeMap<String, String>,
    ) -> Result<(), KdcError> {
        if self.unreachable {
            return Err(KdcError::KdcUnreachable("connection refused".to_string()));
        }
        self.admin_principal = Some(credential.principal.clone());
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), KdcError> {
        self.open = false;
        self.admin_principal = None;
        Ok(())
    }

    async fn test_administrator_credentials(&self) -> Result<bool, KdcError> {
        self.ensure_open()?;
        if self.reject_credentials {
            let principal = self.admin_principal.clone().unwrap_or_default();
            return Err(KdcError::AuthenticationFailed(principal));
        }
        Ok(true)
    }

    async fn principal_exists(&self, principal: &str) -> Result<bool, KdcError> {
        self.ensure_open()?;
        Ok(self.principals.contains_key(principal))
    }

    async fn create_principal(
        &mut self,
        principal: &str,
        password: &str,
        service: bool,
    ) -> Result<u32, KdcError> {
        self.ensure_open()?;
        let key_number = self
            .principals
            .get(principal)
            .map(|entry| entry.key_number + 1)
            .unwrap_or(1);
        self.principals.insert(
            principal.to_string(),
            PrincipalEntry {
                password: password.to_string(),
                key_number,
                service,
            },
        );
        Ok(key_number)
    }

    async fn remove_principal(&mut self, principal: &str) -> Result<bool, KdcError> {
        self.ensure_open()?;
        Ok(self.principals.remove(principal).is_some())
    }

    async fn create_keytab(
        &mut self,
        principal: &str,
        _password: &str,
        key_number: u32,
        keytab_path: &Path,
    ) -> Result<(), KdcError> {
        self.ensure_open()?;
        if !self.principals.contains_key(principal) {
            return Err(KdcError::PrincipalNotFound(principal.to_string()));
        }

        if let Some(parent) = keytab_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Opaque key material, enough for distribution-step plumbing tests.
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(key);
        std::fs::write(
            keytab_path,
            format!("{}\nvno={}\n{}\n", principal, key_number, encoded),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_credential() -> PrincipalKeyCredential {
        PrincipalKeyCredential::new("admin/admin@EXAMPLE.COM", "secret")
    }

    #[tokio::test]
    async fn operations_require_open_handle() {
        let kdc = InMemoryKdc::new();
        assert!(matches!(
            kdc.principal_exists("nn/host1@EXAMPLE.COM").await,
            Err(KdcError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn create_and_remove_principal() {
        let mut kdc = InMemoryKdc::new();
        kdc.open(&create_test_credential(), "EXAMPLE.COM", &BTreeMap::new())
            .await
            .unwrap();

        let kvno = kdc
            .create_principal("nn/host1@EXAMPLE.COM", "pw", true)
            .await
            .unwrap();
        assert_eq!(kvno, 1);
        assert!(kdc.principal_exists("nn/host1@EXAMPLE.COM").await.unwrap());

        // Recreating bumps the key number.
        let kvno = kdc
            .create_principal("nn/host1@EXAMPLE.COM", "pw2", true)
            .await
            .unwrap();
        assert_eq!(kvno, 2);

        assert!(kdc.remove_principal("nn/host1@EXAMPLE.COM").await.unwrap());
        assert!(!kdc.remove_principal("nn/host1@EXAMPLE.COM").await.unwrap());
    }

    #[tokio::test]
    async fn keytab_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut kdc = InMemoryKdc::new();
        kdc.open(&create_test_credential(), "EXAMPLE.COM", &BTreeMap::new())
            .await
            .unwrap();
        kdc.create_principal("dn/host2@EXAMPLE.COM", "pw", true)
            .await
            .unwrap();

        let path = dir.path().join("host2/dn.service.keytab");
        kdc.create_keytab("dn/host2@EXAMPLE.COM", "pw", 1, &path)
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("dn/host2@EXAMPLE.COM"));
    }

    #[tokio::test]
    async fn rejection_hook() {
        let mut kdc = InMemoryKdc::new();
        kdc.reject_credentials = true;
        kdc.open(&create_test_credential(), "EXAMPLE.COM", &BTreeMap::new())
            .await
            .unwrap();
        assert!(matches!(
            kdc.test_administrator_credentials().await,
            Err(KdcError::AuthenticationFailed(_))
        ));
    }
}
