//! MIT KDC operation handler.
//!
//! Issues queries through the `kadmin` shell command (`kadmin.local` when no
//! administrator credential is supplied, for co-located KDCs) and classifies
//! stderr into the error taxonomy.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, error};

use crate::credential::PrincipalKeyCredential;
use crate::operations::{KdcError, KdcOperationHandler};

/// Operation handler backed by the MIT `kadmin` utility.
#[derive(Debug, Default)]
pub struct MitKdcHandler {
    credential: Option<PrincipalKeyCredential>,
    realm: String,
    admin_server_host: Option<String>,
    open: bool,
}

impl MitKdcHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), KdcError> {
        if self.open {
            Ok(())
        } else {
            Err(KdcError::NotOpen)
        }
    }

    /// Run one `kadmin -q` query.
    async fn invoke_kadmin(&self, query: &str) -> Result<Output, KdcError> {
        self.ensure_open()?;
        let credential = self.credential.as_ref().ok_or(KdcError::NotOpen)?;

        let mut command = Command::new("kadmin");
        if let Some(admin_server_host) = &self.admin_server_host {
            command.arg("-s").arg(admin_server_host);
        }
        command
            .arg("-r")
            .arg(&self.realm)
            .arg("-p")
            .arg(&credential.principal)
            .arg("-w")
            .arg(&credential.key)
            .arg("-q")
            .arg(query);

        debug!(realm = %self.realm, query, "invoking kadmin");
        let output = command
            .output()
            .await
            .map_err(|e| KdcError::KdcUnreachable(format!("failed to execute kadmin: {}", e)))?;

        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        error!(
            query,
            exit = ?output.status.code(),
            stderr = %stderr,
            "kadmin query failed"
        );
        Err(classify_stderr(&stderr, &credential.principal, &self.realm))
    }
}

/// Map kadmin stderr to an error kind, mirroring the messages the MIT
/// tooling emits.
fn classify_stderr(stderr: &str, principal: &str, realm: &str) -> KdcError {
    if stderr.contains("Client not found in Kerberos database")
        || stderr.contains("Incorrect password while initializing")
    {
        KdcError::AuthenticationFailed(principal.to_string())
    } else if stderr.contains("Cannot contact any KDC")
        || stderr.contains("Cannot resolve network address for admin server in requested realm")
    {
        KdcError::KdcUnreachable(stderr.trim().to_string())
    } else if stderr.contains("Missing parameters in krb5.conf required for kadmin client")
        || stderr.contains("Cannot find KDC for requested realm")
    {
        KdcError::RealmNotFound(realm.to_string())
    } else {
        KdcError::OperationFailed(format!(
            "unexpected error condition executing the kadmin command. STDERR: {}",
            stderr.trim()
        ))
    }
}

/// Parse a key number out of `get_principal` output (`Key: vno N, ...`).
fn parse_key_number(stdout: &str) -> u32 {
    for line in stdout.lines() {
        if let Some(rest) = line.trim().strip_prefix("Key: vno ") {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(kvno) = digits.parse() {
                return kvno;
            }
        }
    }
    1
}

#[async_trait]
impl KdcOperationHandler for MitKdcHandler {
    async fn open(
        &mut self,
        credential: &PrincipalKeyCredential,
        realm: &str,
        kerberos_env: &BTreeMap<String, String>,
    ) -> Result<(), KdcError> {
        self.credential = Some(credential.clone());
        self.realm = realm.to_string();
        self.admin_server_host = kerberos_env.get("admin_server_host").cloned();
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), KdcError> {
        self.credential = None;
        self.open = false;
        Ok(())
    }

    async fn test_administrator_credentials(&self) -> Result<bool, KdcError> {
        let credential = self.credential.as_ref().ok_or(KdcError::NotOpen)?;
        let principal = credential.principal.clone();
        // Looking up the administrator's own principal exercises both the
        // connection and the credential.
        let output = self
            .invoke_kadmin(&format!("get_principal {}", principal))
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.contains("Principal:"))
    }

    async fn principal_exists(&self, principal: &str) -> Result<bool, KdcError> {
        match self.invoke_kadmin(&format!("get_principal {}", principal)).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Ok(stdout.contains("Principal:"))
            }
            Err(KdcError::OperationFailed(message))
                if message.contains("Principal does not exist") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_principal(
        &mut self,
        principal: &str,
        password: &str,
        _service: bool,
    ) -> Result<u32, KdcError> {
        self.invoke_kadmin(&format!("add_principal -pw {} {}", password, principal))
            .await?;

        let output = self
            .invoke_kadmin(&format!("get_principal {}", principal))
            .await?;
        Ok(parse_key_number(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn remove_principal(&mut self, principal: &str) -> Result<bool, KdcError> {
        match self
            .invoke_kadmin(&format!("delete_principal -force {}", principal))
            .await
        {
            Ok(_) => Ok(true),
            Err(KdcError::OperationFailed(message))
                if message.contains("Principal does not exist") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_keytab(
        &mut self,
        principal: &str,
        _password: &str,
        _key_number: u32,
        keytab_path: &Path,
    ) -> Result<(), KdcError> {
        if let Some(parent) = keytab_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // -norandkey keeps the principal's current keys so previously
        // distributed keytabs stay valid.
        self.invoke_kadmin(&format!(
            "xst -norandkey -k {} {}",
            keytab_path.display(),
            principal
        ))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_classification() {
        assert!(matches!(
            classify_stderr(
                "kadmin: Client not found in Kerberos database while initializing kadmin interface",
                "admin/admin@EXAMPLE.COM",
                "EXAMPLE.COM"
            ),
            KdcError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_stderr("kadmin: Cannot contact any KDC for realm 'EXAMPLE.COM'", "p", "EXAMPLE.COM"),
            KdcError::KdcUnreachable(_)
        ));
        assert!(matches!(
            classify_stderr(
                "kadmin: Cannot find KDC for requested realm while initializing kadmin interface",
                "p",
                "EXAMPLE.COM"
            ),
            KdcError::RealmNotFound(_)
        ));
        assert!(matches!(
            classify_stderr("something else entirely", "p", "EXAMPLE.COM"),
            KdcError::OperationFailed(_)
        ));
    }

    #[test]
    fn key_number_parsing() {
        let stdout = "Principal: nn/host1@EXAMPLE.COM\nKey: vno 3, aes256-cts-hmac-sha1-96\n";
        assert_eq!(parse_key_number(stdout), 3);
        assert_eq!(parse_key_number("Principal: x@Y"), 1);
    }

    #[tokio::test]
    async fn operations_require_open_handle() {
        let handler = MitKdcHandler::new();
        assert!(matches!(
            handler.test_administrator_credentials().await,
            Err(KdcError::NotOpen)
        ));
    }
}
