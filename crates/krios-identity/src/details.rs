//! Per-operation Kerberos details.
//!
//! A `KerberosDetails` is built fresh for every operation from the cluster's
//! current `krb5-conf` and `kerberos-env` configuration types, failing fast
//! when either is absent. It answers the questions every handler asks: what
//! realm, what kind of KDC, and whether identity management is delegated.

use krios_core::{ClusterSnapshot, KriosError, SecurityType};
use std::collections::BTreeMap;

/// Kind of KDC backing the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdcType {
    MitKdc,
    ActiveDirectory,
    Ipa,
    /// No KDC is managed; valid only when identity management is delegated.
    None,
}

impl KdcType {
    /// Parse the `kerberos-env/kdc_type` value. Hyphens and case are
    /// normalized, matching the accepted configuration spellings
    /// (`mit-kdc`, `active-directory`, `ipa`, `none`).
    pub fn parse(value: &str) -> Result<Self, KriosError> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "mit_kdc" => Ok(KdcType::MitKdc),
            "active_directory" => Ok(KdcType::ActiveDirectory),
            "ipa" => Ok(KdcType::Ipa),
            "none" => Ok(KdcType::None),
            _ => Err(KriosError::invalid_configuration(format!(
                "Invalid 'kdc_type' value: {}",
                value
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KdcType::MitKdc => "MIT_KDC",
            KdcType::ActiveDirectory => "ACTIVE_DIRECTORY",
            KdcType::Ipa => "IPA",
            KdcType::None => "NONE",
        }
    }
}

/// Snapshot of the Kerberos-specific configuration relevant to an operation.
#[derive(Debug, Clone)]
pub struct KerberosDetails {
    default_realm: String,
    kdc_type: KdcType,
    kerberos_env: BTreeMap<String, String>,
    security_type: SecurityType,
    manage_identities_override: Option<bool>,
}

impl KerberosDetails {
    /// Build details from the cluster's `krb5-conf` and `kerberos-env`.
    ///
    /// `manage_identities_override` is the request directive; when absent the
    /// `kerberos-env/manage_identities` property decides, defaulting to
    /// managed.
    pub fn from_cluster(
        cluster: &ClusterSnapshot,
        manage_identities_override: Option<bool>,
    ) -> Result<Self, KriosError> {
        if cluster.config("krb5-conf").is_none() {
            return Err(KriosError::invalid_configuration(
                "The 'krb5-conf' configuration type is not available",
            ));
        }
        let kerberos_env = cluster.config("kerberos-env").ok_or_else(|| {
            KriosError::invalid_configuration(
                "The 'kerberos-env' configuration type is not available",
            )
        })?;

        let default_realm = kerberos_env
            .get("realm")
            .filter(|realm| !realm.is_empty())
            .cloned()
            .ok_or_else(|| {
                KriosError::invalid_configuration("The 'kerberos-env/realm' value must be set")
            })?;

        let mut details = KerberosDetails {
            default_realm,
            kdc_type: KdcType::None,
            kerberos_env: kerberos_env.clone(),
            security_type: cluster.security_type,
            manage_identities_override,
        };

        match kerberos_env.get("kdc_type") {
            Some(value) => details.kdc_type = KdcType::parse(value)?,
            None if details.manage_identities() => {
                return Err(KriosError::invalid_configuration(
                    "The 'kerberos-env/kdc_type' value must be set to a valid KDC type",
                ));
            }
            // Identity management is delegated; a KDC type is not required.
            None => details.kdc_type = KdcType::None,
        }

        Ok(details)
    }

    pub fn default_realm(&self) -> &str {
        &self.default_realm
    }

    pub fn kdc_type(&self) -> KdcType {
        self.kdc_type
    }

    pub fn security_type(&self) -> SecurityType {
        self.security_type
    }

    pub fn kerberos_env(&self) -> &BTreeMap<String, String> {
        &self.kerberos_env
    }

    /// Effective identity-management flag: explicit override, else the
    /// `manage_identities` property (managed unless literally "false"),
    /// else true.
    pub fn manage_identities(&self) -> bool {
        match self.manage_identities_override {
            Some(value) => value,
            None => self
                .kerberos_env
                .get("manage_identities")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }

    /// Whether the management server's own identity should be created:
    /// `kerberos-env/create_ambari_principal` not literally "false".
    pub fn create_ambari_principal(&self) -> bool {
        self.kerberos_env
            .get("create_ambari_principal")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krios_core::ClusterSnapshot;

    fn create_test_cluster(kerberos_env: &[(&str, &str)]) -> ClusterSnapshot {
        let mut desired_configs = BTreeMap::new();
        desired_configs.insert("krb5-conf".to_string(), BTreeMap::new());
        desired_configs.insert(
            "kerberos-env".to_string(),
            kerberos_env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        ClusterSnapshot {
            cluster_name: "c1".to_string(),
            security_type: SecurityType::Kerberos,
            hosts: Vec::new(),
            services: BTreeMap::new(),
            desired_configs,
            host_overrides: BTreeMap::new(),
            server_host: None,
        }
    }

    #[test]
    fn builds_from_valid_configuration() {
        let cluster =
            create_test_cluster(&[("realm", "EXAMPLE.COM"), ("kdc_type", "mit-kdc")]);
        let details = KerberosDetails::from_cluster(&cluster, None).unwrap();
        assert_eq!(details.default_realm(), "EXAMPLE.COM");
        assert_eq!(details.kdc_type(), KdcType::MitKdc);
        assert!(details.manage_identities());
        assert!(details.create_ambari_principal());
    }

    #[test]
    fn missing_krb5_conf_fails_fast() {
        let mut cluster = create_test_cluster(&[("realm", "EXAMPLE.COM")]);
        cluster.desired_configs.remove("krb5-conf");
        assert!(matches!(
            KerberosDetails::from_cluster(&cluster, None),
            Err(KriosError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_kdc_type_is_an_error_when_managed() {
        let cluster = create_test_cluster(&[("realm", "EXAMPLE.COM")]);
        assert!(matches!(
            KerberosDetails::from_cluster(&cluster, None),
            Err(KriosError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_kdc_type_is_allowed_when_delegated() {
        let cluster = create_test_cluster(&[
            ("realm", "EXAMPLE.COM"),
            ("manage_identities", "false"),
        ]);
        let details = KerberosDetails::from_cluster(&cluster, None).unwrap();
        assert!(!details.manage_identities());
        assert_eq!(details.kdc_type(), KdcType::None);
    }

    #[test]
    fn override_beats_property() {
        let cluster = create_test_cluster(&[
            ("realm", "EXAMPLE.COM"),
            ("kdc_type", "mit-kdc"),
            ("manage_identities", "false"),
        ]);
        let details = KerberosDetails::from_cluster(&cluster, Some(true)).unwrap();
        assert!(details.manage_identities());
    }

    #[test]
    fn invalid_kdc_type_string() {
        let cluster =
            create_test_cluster(&[("realm", "EXAMPLE.COM"), ("kdc_type", "heimdal")]);
        let err = KerberosDetails::from_cluster(&cluster, None).unwrap_err();
        assert!(err.to_string().contains("heimdal"));
    }

    #[test]
    fn create_ambari_principal_literal_false() {
        let cluster = create_test_cluster(&[
            ("realm", "EXAMPLE.COM"),
            ("kdc_type", "mit-kdc"),
            ("create_ambari_principal", "false"),
        ]);
        let details = KerberosDetails::from_cluster(&cluster, None).unwrap();
        assert!(!details.create_ambari_principal());
    }
}
