//! Identity lifecycle engine: the in-process work behind the planner's
//! server-action tasks.
//!
//! Every pass opens the KDC handle once, performs a bounded sequence of
//! operations, and closes the handle on all exit paths; close failures are
//! logged and swallowed. The principal store guards creation, making the
//! whole pass idempotent and re-entrant.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use krios_core::KriosError;
use krios_identity::{ResolvedIdentity, ResolvedKeytab};

use crate::credential::PrincipalKeyCredential;
use crate::data_file::{IdentityDataFileWriter, IdentityRecord, DATA_FILE_NAME};
use crate::operations::KdcOperationHandler;
use crate::store::{PrincipalRecord, PrincipalStore};

/// Counts reported by [`ensure_identities`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnsureIdentitiesOutcome {
    pub principals_created: usize,
    pub principals_skipped: usize,
    pub keytabs_written: usize,
}

/// Validate the KDC administrator credential.
///
/// Opens the handle, asks the KDC to verify the credential, and closes the
/// handle whether or not validation succeeded. Failures surface with a
/// credential-specific sub-kind distinct from configuration errors.
pub async fn validate_admin_credentials(
    kdc: &mut dyn KdcOperationHandler,
    credential: &PrincipalKeyCredential,
    realm: &str,
    kerberos_env: &BTreeMap<String, String>,
) -> Result<(), KriosError> {
    kdc.open(credential, realm, kerberos_env)
        .await
        .map_err(|e| e.into_credential_error(&credential.principal))?;

    let result = match kdc.test_administrator_credentials().await {
        Ok(true) => Ok(()),
        Ok(false) => Err(KriosError::Credential(
            krios_core::CredentialError::authentication_failed(&credential.principal),
        )),
        Err(e) => Err(e.into_credential_error(&credential.principal)),
    };

    close_quietly(kdc).await;
    result
}

/// Ensure every resolved identity exists: create missing principals, export
/// keytabs into the data directory, and write the identity data file the
/// distribution step consumes.
///
/// Principals already recorded in `store` are skipped unless
/// `regenerate_all` is set. Cachable keytabs are reused from and copied to
/// `keytab_cache_dir` when one is provided.
#[allow(clippy::too_many_arguments)]
pub async fn ensure_identities(
    kdc: &mut dyn KdcOperationHandler,
    credential: &PrincipalKeyCredential,
    realm: &str,
    kerberos_env: &BTreeMap<String, String>,
    active: &BTreeMap<String, Vec<ResolvedIdentity>>,
    regenerate_all: bool,
    store: &PrincipalStore,
    data_directory: &Path,
    keytab_cache_dir: Option<&Path>,
) -> Result<EnsureIdentitiesOutcome, KriosError> {
    kdc.open(credential, realm, kerberos_env)
        .await
        .map_err(|e| e.into_credential_error(&credential.principal))?;

    let result = process_identities(
        kdc,
        active,
        regenerate_all,
        store,
        data_directory,
        keytab_cache_dir,
    )
    .await;

    close_quietly(kdc).await;
    result
}

async fn process_identities(
    kdc: &mut dyn KdcOperationHandler,
    active: &BTreeMap<String, Vec<ResolvedIdentity>>,
    regenerate_all: bool,
    store: &PrincipalStore,
    data_directory: &Path,
    keytab_cache_dir: Option<&Path>,
) -> Result<EnsureIdentitiesOutcome, KriosError> {
    std::fs::create_dir_all(data_directory)?;
    let mut data_file = IdentityDataFileWriter::create(data_directory.join(DATA_FILE_NAME))?;
    let mut outcome = EnsureIdentitiesOutcome::default();

    for identities in active.values() {
        for identity in identities {
            let existing = store.get(&identity.principal);

            if let Some(record) = existing.filter(|_| !regenerate_all) {
                outcome.principals_skipped += 1;
                debug!(principal = %identity.principal, "principal already created; skipping");

                if let Some(keytab) = &identity.keytab {
                    let destination = keytab_destination(data_directory, identity, keytab);
                    if let Some(cached) = record.cached_keytab_path.as_deref() {
                        if Path::new(cached).exists() {
                            if let Some(parent) = destination.parent() {
                                std::fs::create_dir_all(parent)?;
                            }
                            std::fs::copy(cached, &destination)?;
                        }
                    }
                }
                data_file.write_record(&identity_record(identity))?;
                continue;
            }

            let password = generate_secure_password();
            let service = matches!(
                identity.principal_type,
                krios_core::PrincipalType::Service
            );
            let key_number = kdc
                .create_principal(&identity.principal, &password, service)
                .await
                .map_err(|e| KriosError::validation(e.to_string()))?;
            outcome.principals_created += 1;
            info!(principal = %identity.principal, key_number, "created principal");

            let mut cached_keytab_path = None;
            if let Some(keytab) = &identity.keytab {
                let destination = keytab_destination(data_directory, identity, keytab);
                kdc.create_keytab(&identity.principal, &password, key_number, &destination)
                    .await
                    .map_err(|e| KriosError::validation(e.to_string()))?;
                outcome.keytabs_written += 1;

                if keytab.cachable {
                    if let Some(cache_dir) = keytab_cache_dir {
                        cached_keytab_path =
                            cache_keytab(cache_dir, identity, &destination)?;
                    }
                }
            }

            store.record(PrincipalRecord {
                principal: identity.principal.clone(),
                key_number,
                service,
                cached_keytab_path,
            })?;
            data_file.write_record(&identity_record(identity))?;
        }
    }

    data_file.finish()?;
    Ok(outcome)
}

/// Destroy the principals behind the resolved identities and forget them in
/// the store. Missing principals are normal skips, not errors.
pub async fn delete_identities(
    kdc: &mut dyn KdcOperationHandler,
    credential: &PrincipalKeyCredential,
    realm: &str,
    kerberos_env: &BTreeMap<String, String>,
    active: &BTreeMap<String, Vec<ResolvedIdentity>>,
    store: &PrincipalStore,
) -> Result<usize, KriosError> {
    kdc.open(credential, realm, kerberos_env)
        .await
        .map_err(|e| e.into_credential_error(&credential.principal))?;

    let result = remove_identities(kdc, active, store).await;

    close_quietly(kdc).await;
    result
}

async fn remove_identities(
    kdc: &mut dyn KdcOperationHandler,
    active: &BTreeMap<String, Vec<ResolvedIdentity>>,
    store: &PrincipalStore,
) -> Result<usize, KriosError> {
    let mut removed = 0usize;

    for identities in active.values() {
        for identity in identities {
            let existed = kdc
                .remove_principal(&identity.principal)
                .await
                .map_err(|e| KriosError::validation(e.to_string()))?;
            if existed {
                removed += 1;
                info!(principal = %identity.principal, "destroyed principal");
            } else {
                debug!(principal = %identity.principal, "principal not present in the KDC");
            }

            if let Some(record) = store.remove(&identity.principal)? {
                if let Some(cached) = record.cached_keytab_path.as_deref() {
                    if let Err(e) = std::fs::remove_file(cached) {
                        warn!(path = cached, error = %e, "failed to delete cached keytab");
                    }
                }
            }
        }
    }

    Ok(removed)
}

/// Delete an operation's data directory. Temporary keytab files must not
/// outlive the distribution step; failure to clean up is logged and
/// swallowed so it cannot mask the operation's outcome.
pub fn cleanup_data_directory(data_directory: &Path) {
    if !data_directory.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(data_directory) {
        warn!(
            path = %data_directory.display(),
            error = %e,
            "failed to delete the operation data directory"
        );
    }
}

async fn close_quietly(kdc: &mut dyn KdcOperationHandler) {
    if let Err(e) = kdc.close().await {
        warn!(error = %e, "failed to close the KDC operation handle");
    }
}

fn keytab_destination(
    data_directory: &Path,
    identity: &ResolvedIdentity,
    keytab: &ResolvedKeytab,
) -> PathBuf {
    let file_name = Path::new(&keytab.path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.keytab", identity.name));
    data_directory.join(&identity.hostname).join(file_name)
}

fn cache_keytab(
    cache_dir: &Path,
    identity: &ResolvedIdentity,
    keytab_file: &Path,
) -> Result<Option<String>, KriosError> {
    std::fs::create_dir_all(cache_dir)?;
    let file_name = keytab_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.keytab", identity.name));
    let cached = cache_dir.join(format!("{}-{}", identity.hostname, file_name));
    std::fs::copy(keytab_file, &cached)?;
    Ok(Some(cached.to_string_lossy().into_owned()))
}

fn identity_record(identity: &ResolvedIdentity) -> IdentityRecord {
    let keytab = identity.keytab.as_ref();
    IdentityRecord {
        hostname: identity.hostname.clone(),
        service_name: identity.service_name.clone(),
        component_name: identity.component_name.clone(),
        principal: identity.principal.clone(),
        principal_type: match identity.principal_type {
            krios_core::PrincipalType::User => "user".to_string(),
            krios_core::PrincipalType::Service => "service".to_string(),
        },
        keytab_file_path: keytab.map(|k| k.path.clone()).unwrap_or_default(),
        keytab_owner_name: keytab
            .and_then(|k| k.owner_name.clone())
            .unwrap_or_default(),
        keytab_owner_access: keytab
            .and_then(|k| k.owner_access.clone())
            .unwrap_or_default(),
        keytab_group_name: keytab
            .and_then(|k| k.group_name.clone())
            .unwrap_or_default(),
        keytab_group_access: keytab
            .and_then(|k| k.group_access.clone())
            .unwrap_or_default(),
        cachable: keytab.map(|k| k.cachable).unwrap_or(false),
    }
}

fn generate_secure_password() -> String {
    use rand::distr::Alphanumeric;
    use rand::Rng;
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
