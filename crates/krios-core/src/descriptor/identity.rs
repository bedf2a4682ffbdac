//! Identity, principal and keytab descriptor types.

use serde::{Deserialize, Serialize};

/// Kind of principal an identity declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    User,
    Service,
}

impl Default for PrincipalType {
    fn default() -> Self {
        PrincipalType::Service
    }
}

/// Template for a principal name.
///
/// `value` may embed `_HOST` and `${type/property}` variables, resolved at
/// identity-resolution time. `configuration` names the `type/property` that
/// receives the concrete principal when configurations are updated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrincipalDescriptor {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "type", default)]
    pub principal_type: PrincipalType,
    #[serde(default)]
    pub local_username: Option<String>,
    #[serde(default)]
    pub configuration: Option<String>,
}

/// Ownership entry for a keytab file: a user or group name plus an access
/// mode string ("r", "w", "rw" or empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeytabAcl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
}

/// Template for a keytab file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeytabDescriptor {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub owner: Option<KeytabAcl>,
    #[serde(default)]
    pub group: Option<KeytabAcl>,
    #[serde(default)]
    pub cachable: bool,
    #[serde(default)]
    pub configuration: Option<String>,
}

/// Declarative template describing one required Kerberos identity.
///
/// Identities live inside a descriptor container (root, service or
/// component). `reference` points at another identity whose fields this one
/// inherits; `when` is a predicate gating whether the identity is active for
/// the current cluster state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    pub name: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub principal: Option<PrincipalDescriptor>,
    #[serde(default)]
    pub keytab: Option<KeytabDescriptor>,
    #[serde(default)]
    pub when: Option<super::Predicate>,
}

impl IdentityDescriptor {
    /// Overlay `other`'s set fields onto `self`, returning the effective
    /// identity. Used both for user-descriptor merging and for resolving
    /// `reference` chains; `other` wins wherever it specifies a value.
    pub fn overlaid_with(&self, other: &IdentityDescriptor) -> IdentityDescriptor {
        IdentityDescriptor {
            name: other.name.clone(),
            reference: other.reference.clone().or_else(|| self.reference.clone()),
            principal: overlay_principal(self.principal.as_ref(), other.principal.as_ref()),
            keytab: overlay_keytab(self.keytab.as_ref(), other.keytab.as_ref()),
            when: other.when.clone().or_else(|| self.when.clone()),
        }
    }
}

fn overlay_principal(
    base: Option<&PrincipalDescriptor>,
    over: Option<&PrincipalDescriptor>,
) -> Option<PrincipalDescriptor> {
    match (base, over) {
        (None, None) => None,
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) => Some(PrincipalDescriptor {
            value: o.value.clone().or_else(|| b.value.clone()),
            principal_type: o.principal_type,
            local_username: o.local_username.clone().or_else(|| b.local_username.clone()),
            configuration: o.configuration.clone().or_else(|| b.configuration.clone()),
        }),
    }
}

fn overlay_keytab(
    base: Option<&KeytabDescriptor>,
    over: Option<&KeytabDescriptor>,
) -> Option<KeytabDescriptor> {
    match (base, over) {
        (None, None) => None,
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) => Some(KeytabDescriptor {
            file: o.file.clone().or_else(|| b.file.clone()),
            owner: o.owner.clone().or_else(|| b.owner.clone()),
            group: o.group.clone().or_else(|| b.group.clone()),
            cachable: o.cachable || b.cachable,
            configuration: o.configuration.clone().or_else(|| b.configuration.clone()),
        }),
    }
}
