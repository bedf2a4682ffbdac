//! Auth-to-local rule generation.
//!
//! Accumulates principal-to-local-username mappings and renders them as
//! ordered Kerberos `auth_to_local` rule text. Principals are classified as
//! qualified (`primary/instance@REALM`) or unqualified (`primary@REALM`);
//! each bucket is a sorted map keyed by primary, so generation is
//! deterministic and adding the same mapping twice is a no-op. Determinism
//! is a correctness requirement: configuration diffing depends on stable
//! rule ordering.

use krios_core::{KerberosDescriptor, KriosError};
use regex::Regex;
use std::collections::BTreeMap;

use crate::resolver::ResolvedIdentity;

#[derive(Debug, Clone, PartialEq)]
struct Mapping {
    realm: String,
    local_username: String,
}

/// Builder for per-realm `auth_to_local` rule text.
#[derive(Debug, Clone, Default)]
pub struct AuthToLocalBuilder {
    qualified: BTreeMap<String, Mapping>,
    unqualified: BTreeMap<String, Mapping>,
}

impl AuthToLocalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit copy of the accumulated state, taken before branching per
    /// matched configuration property so the branches cannot alias.
    pub fn snapshot(&self) -> Self {
        AuthToLocalBuilder {
            qualified: self.qualified.clone(),
            unqualified: self.unqualified.clone(),
        }
    }

    /// Record a mapping from `principal` to `local_username`.
    ///
    /// The principal must carry a realm. A later addition for the same
    /// primary overwrites the earlier one. Empty arguments are ignored.
    pub fn add_rule(&mut self, principal: &str, local_username: &str) -> Result<(), KriosError> {
        if principal.is_empty() || local_username.is_empty() {
            return Ok(());
        }

        let qualified = Regex::new(r"^([^/@]+)/([^/@]+)@(.+)$").unwrap();
        let unqualified = Regex::new(r"^([^/@]+)@(.+)$").unwrap();

        if let Some(caps) = qualified.captures(principal) {
            self.qualified.insert(
                caps[1].to_string(),
                Mapping {
                    realm: caps[3].to_string(),
                    local_username: local_username.to_string(),
                },
            );
            Ok(())
        } else if let Some(caps) = unqualified.captures(principal) {
            self.unqualified.insert(
                caps[1].to_string(),
                Mapping {
                    realm: caps[2].to_string(),
                    local_username: local_username.to_string(),
                },
            );
            Ok(())
        } else {
            Err(KriosError::validation(format!(
                "cannot add an auth-to-local rule for a principal with no realm: '{}'",
                principal
            )))
        }
    }

    /// Render the accumulated rules for `realm`, newline-joined:
    /// qualified rules sorted by primary, unqualified rules sorted by
    /// primary, the default-realm strip rule, then `DEFAULT`.
    pub fn generate(&self, realm: &str) -> String {
        let mut lines = Vec::with_capacity(self.qualified.len() + self.unqualified.len() + 2);

        for (primary, mapping) in &self.qualified {
            lines.push(format!(
                "RULE:[2:$1@$0]({}@{})s/.*/{}/",
                primary, mapping.realm, mapping.local_username
            ));
        }
        for (primary, mapping) in &self.unqualified {
            lines.push(format!(
                "RULE:[1:$1@$0]({}@{})s/.*/{}/",
                primary, mapping.realm, mapping.local_username
            ));
        }
        lines.push(format!("RULE:[1:$1@$0](.*@{})s/@.*//", realm));
        lines.push("DEFAULT".to_string());

        lines.join("\n")
    }
}

/// Render the generated rule text into every configuration property the
/// descriptor tree marks with `auth_to_local_properties`
/// (`config-type/property` references). Returns the property updates as
/// config type -> property -> rule text.
pub fn generate_auth_to_local_property_updates(
    descriptor: &KerberosDescriptor,
    realm: &str,
    active: &BTreeMap<String, Vec<ResolvedIdentity>>,
) -> Result<BTreeMap<String, BTreeMap<String, String>>, KriosError> {
    let mut builder = AuthToLocalBuilder::new();
    for identities in active.values() {
        for identity in identities {
            if let Some(local_username) = identity.local_username.as_deref() {
                if !local_username.is_empty() {
                    builder.add_rule(&identity.principal, local_username)?;
                }
            }
        }
    }
    let rules = builder.generate(realm);

    let mut references: Vec<&str> = Vec::new();
    references.extend(descriptor.auth_to_local_properties.iter().map(String::as_str));
    for service in descriptor.services.values() {
        references.extend(service.auth_to_local_properties.iter().map(String::as_str));
        for component in service.components.values() {
            references.extend(component.auth_to_local_properties.iter().map(String::as_str));
        }
    }

    let mut updates: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for reference in references {
        let Some((config_type, property)) = reference.split_once('/') else {
            return Err(KriosError::invalid_configuration(format!(
                "malformed auth_to_local property reference '{}'; \
                 expected 'config-type/property'",
                reference
            )));
        };
        updates
            .entry(config_type.to_string())
            .or_default()
            .insert(property.to_string(), rules.clone());
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_contract() {
        let mut builder = AuthToLocalBuilder::new();
        builder.add_rule("hdfs/host1@EXAMPLE.COM", "hdfs").unwrap();
        builder.add_rule("yarn@EXAMPLE.COM", "yarn").unwrap();

        let rules = builder.generate("EXAMPLE.COM");
        let lines: Vec<&str> = rules.lines().collect();
        assert_eq!(
            lines,
            vec![
                "RULE:[2:$1@$0](hdfs@EXAMPLE.COM)s/.*/hdfs/",
                "RULE:[1:$1@$0](yarn@EXAMPLE.COM)s/.*/yarn/",
                "RULE:[1:$1@$0](.*@EXAMPLE.COM)s/@.*//",
                "DEFAULT",
            ]
        );
    }

    #[test]
    fn generation_is_idempotent() {
        let mut builder = AuthToLocalBuilder::new();
        builder.add_rule("nn/_HOST@EXAMPLE.COM", "hdfs").unwrap();
        builder.add_rule("ambari-qa@EXAMPLE.COM", "ambari-qa").unwrap();

        let first = builder.generate("EXAMPLE.COM");
        let second = builder.generate("EXAMPLE.COM");
        assert_eq!(first, second);

        // Re-adding the same mapping changes nothing.
        builder.add_rule("nn/_HOST@EXAMPLE.COM", "hdfs").unwrap();
        assert_eq!(builder.generate("EXAMPLE.COM"), first);
    }

    #[test]
    fn last_write_wins_per_primary() {
        let mut builder = AuthToLocalBuilder::new();
        builder.add_rule("hive@EXAMPLE.COM", "hive").unwrap();
        builder.add_rule("hive@EXAMPLE.COM", "hive2").unwrap();

        let rules = builder.generate("EXAMPLE.COM");
        assert!(rules.contains("s/.*/hive2/"));
        assert!(!rules.contains("s/.*/hive/\n"));
    }

    #[test]
    fn empty_builder_yields_catch_all_and_default() {
        let builder = AuthToLocalBuilder::new();
        let rules = builder.generate("EXAMPLE.COM");
        assert_eq!(
            rules,
            "RULE:[1:$1@$0](.*@EXAMPLE.COM)s/@.*//\nDEFAULT"
        );
    }

    #[test]
    fn principal_without_realm_is_an_error() {
        let mut builder = AuthToLocalBuilder::new();
        assert!(builder.add_rule("hdfs", "hdfs").is_err());
    }

    #[test]
    fn snapshot_does_not_alias() {
        let mut builder = AuthToLocalBuilder::new();
        builder.add_rule("hdfs@EXAMPLE.COM", "hdfs").unwrap();

        let snapshot = builder.snapshot();
        builder.add_rule("yarn@EXAMPLE.COM", "yarn").unwrap();

        assert!(!snapshot.generate("EXAMPLE.COM").contains("yarn"));
        assert!(builder.generate("EXAMPLE.COM").contains("yarn"));
    }

    #[test]
    fn property_updates_target_descriptor_references() {
        use krios_core::PrincipalType;

        let descriptor = KerberosDescriptor::from_yaml(
            r#"
services:
  HDFS:
    name: HDFS
    auth_to_local_properties:
      - "core-site/hadoop.security.auth_to_local"
"#,
        )
        .unwrap();

        let mut active = BTreeMap::new();
        active.insert(
            "host1".to_string(),
            vec![ResolvedIdentity {
                name: "hdfs".to_string(),
                service_name: "HDFS".to_string(),
                component_name: String::new(),
                hostname: "host1".to_string(),
                principal: "hdfs@EXAMPLE.COM".to_string(),
                principal_type: PrincipalType::User,
                local_username: Some("hdfs".to_string()),
                keytab: None,
            }],
        );

        let updates =
            generate_auth_to_local_property_updates(&descriptor, "EXAMPLE.COM", &active).unwrap();
        let rules = &updates["core-site"]["hadoop.security.auth_to_local"];
        assert!(rules.starts_with("RULE:[1:$1@$0](hdfs@EXAMPLE.COM)s/.*/hdfs/"));
        assert!(rules.ends_with("DEFAULT"));
    }

    #[test]
    fn sorted_output_across_buckets() {
        let mut builder = AuthToLocalBuilder::new();
        builder.add_rule("zk/host1@EXAMPLE.COM", "zookeeper").unwrap();
        builder.add_rule("am/host1@EXAMPLE.COM", "ams").unwrap();
        builder.add_rule("spark@EXAMPLE.COM", "spark").unwrap();
        builder.add_rule("hbase@EXAMPLE.COM", "hbase").unwrap();

        let lines: Vec<String> = builder
            .generate("EXAMPLE.COM")
            .lines()
            .map(String::from)
            .collect();
        // Qualified sorted (am, zk), then unqualified sorted (hbase, spark).
        assert!(lines[0].contains("(am@"));
        assert!(lines[1].contains("(zk@"));
        assert!(lines[2].contains("(hbase@"));
        assert!(lines[3].contains("(spark@"));
    }
}
