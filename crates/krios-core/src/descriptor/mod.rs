//! Kerberos descriptor tree.
//!
//! A descriptor declares the identities (principal + keytab templates) a
//! stack of services requires. The tree has three container levels (root,
//! service, component), each carrying identity descriptors and references to
//! configuration properties that receive generated auth-to-local rules.
//!
//! Descriptors are loaded from stack metadata (YAML/JSON), optionally
//! overlaid with a cluster-specific user descriptor (user wins on conflict),
//! and treated as immutable for the remainder of the request.

mod identity;
mod predicate;

pub use identity::{
    IdentityDescriptor, KeytabAcl, KeytabDescriptor, PrincipalDescriptor, PrincipalType,
};
pub use predicate::{Predicate, PredicateContext};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Component-level descriptor container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub name: String,
    #[serde(default)]
    pub identities: Vec<IdentityDescriptor>,
    #[serde(default)]
    pub auth_to_local_properties: Vec<String>,
}

/// Service-level descriptor container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default)]
    pub identities: Vec<IdentityDescriptor>,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDescriptor>,
    #[serde(default)]
    pub auth_to_local_properties: Vec<String>,
}

/// Root of the descriptor tree.
///
/// `properties` are global variables (for example `principal_suffix`)
/// resolvable in identity expressions through the default `${...}` group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KerberosDescriptor {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub identities: Vec<IdentityDescriptor>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDescriptor>,
    #[serde(default)]
    pub auth_to_local_properties: Vec<String>,
}

impl KerberosDescriptor {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Overlay a cluster-specific user descriptor onto this (stack)
    /// descriptor. The user descriptor wins on conflict, recursively per
    /// container and per identity field.
    pub fn merge(&mut self, user: KerberosDescriptor) {
        for (key, value) in user.properties {
            self.properties.insert(key, value);
        }
        merge_identities(&mut self.identities, user.identities);
        merge_auth_to_local(&mut self.auth_to_local_properties, user.auth_to_local_properties);

        for (name, user_service) in user.services {
            match self.services.get_mut(&name) {
                Some(stack_service) => {
                    merge_identities(&mut stack_service.identities, user_service.identities);
                    merge_auth_to_local(
                        &mut stack_service.auth_to_local_properties,
                        user_service.auth_to_local_properties,
                    );
                    for (component_name, user_component) in user_service.components {
                        match stack_service.components.get_mut(&component_name) {
                            Some(stack_component) => {
                                merge_identities(
                                    &mut stack_component.identities,
                                    user_component.identities,
                                );
                                merge_auth_to_local(
                                    &mut stack_component.auth_to_local_properties,
                                    user_component.auth_to_local_properties,
                                );
                            }
                            None => {
                                stack_service.components.insert(component_name, user_component);
                            }
                        }
                    }
                }
                None => {
                    self.services.insert(name, user_service);
                }
            }
        }
    }

    /// Look up an identity by absolute path: `/name`, `/SERVICE/name` or
    /// `/SERVICE/COMPONENT/name`. Absence is a normal branch.
    pub fn find_identity(&self, path: &str) -> Option<&IdentityDescriptor> {
        let trimmed = path.strip_prefix('/')?;
        let parts: Vec<&str> = trimmed.split('/').collect();
        match parts.as_slice() {
            [name] => self.identities.iter().find(|i| i.name == *name),
            [service, name] => self
                .services
                .get(*service)?
                .identities
                .iter()
                .find(|i| i.name == *name),
            [service, component, name] => self
                .services
                .get(*service)?
                .components
                .get(*component)?
                .identities
                .iter()
                .find(|i| i.name == *name),
            _ => None,
        }
    }

    /// Resolve an identity's `reference`, if any, producing the effective
    /// descriptor: the referent's fields overlaid with the referencing
    /// identity's own. `container_path` anchors relative (`./name`)
    /// references.
    pub fn dereference(
        &self,
        identity: &IdentityDescriptor,
        container_path: &str,
    ) -> IdentityDescriptor {
        let Some(reference) = identity.reference.as_deref() else {
            return identity.clone();
        };

        let absolute = if let Some(local) = reference.strip_prefix("./") {
            format!("{}/{}", container_path.trim_end_matches('/'), local)
        } else {
            reference.to_string()
        };

        match self.find_identity(&absolute) {
            Some(referent) => referent.overlaid_with(identity),
            None => identity.clone(),
        }
    }

    /// Walk the full tree once and collect, per container path, the names of
    /// identities whose `when` predicate evaluates false in `ctx`. The tree
    /// is not mutated; removals are applied in a second pass by path lookup.
    pub fn prune_inactive_identities(
        &self,
        ctx: &PredicateContext<'_>,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut removals: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        collect_inactive("/", &self.identities, ctx, &mut removals);
        for (service_name, service) in &self.services {
            let service_path = format!("/{}", service_name);
            collect_inactive(&service_path, &service.identities, ctx, &mut removals);
            for (component_name, component) in &service.components {
                let component_path = format!("/{}/{}", service_name, component_name);
                collect_inactive(&component_path, &component.identities, ctx, &mut removals);
            }
        }

        removals
    }

    /// Apply a removal set produced by [`prune_inactive_identities`].
    pub fn apply_pruning(&mut self, removals: &BTreeMap<String, BTreeSet<String>>) {
        for (path, names) in removals {
            let identities = match path_parts(path).as_slice() {
                [] => Some(&mut self.identities),
                [service] => self.services.get_mut(*service).map(|s| &mut s.identities),
                [service, component] => self
                    .services
                    .get_mut(*service)
                    .and_then(|s| s.components.get_mut(*component))
                    .map(|c| &mut c.identities),
                _ => None,
            };
            if let Some(identities) = identities {
                identities.retain(|i| !names.contains(&i.name));
            }
        }
    }
}

fn path_parts(path: &str) -> Vec<&str> {
    path.trim_matches('/')
        .split('/')
        .filter(|p| !p.is_empty())
        .collect()
}

fn collect_inactive(
    path: &str,
    identities: &[IdentityDescriptor],
    ctx: &PredicateContext<'_>,
    removals: &mut BTreeMap<String, BTreeSet<String>>,
) {
    for identity in identities {
        if let Some(when) = &identity.when {
            if !when.evaluate(ctx) {
                removals
                    .entry(path.to_string())
                    .or_default()
                    .insert(identity.name.clone());
            }
        }
    }
}

fn merge_identities(stack: &mut Vec<IdentityDescriptor>, user: Vec<IdentityDescriptor>) {
    for user_identity in user {
        match stack.iter_mut().find(|i| i.name == user_identity.name) {
            Some(existing) => *existing = existing.overlaid_with(&user_identity),
            None => stack.push(user_identity),
        }
    }
}

fn merge_auth_to_local(stack: &mut Vec<String>, user: Vec<String>) {
    for property in user {
        if !stack.contains(&property) {
            stack.push(property);
        }
    }
}
