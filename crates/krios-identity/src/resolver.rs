//! Identity Resolver: from descriptor templates to concrete identities.
//!
//! For each host in scope, walks the installed service-component-hosts,
//! gathers the service- and component-level identity descriptors, evaluates
//! their `when` predicates against the current cluster state, and resolves
//! principal and keytab expressions through variable substitution.

use krios_core::{
    ClusterSnapshot, IdentityDescriptor, KerberosDescriptor, KriosError, PredicateContext,
    PrincipalType,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::calculator::merged_configurations;
use crate::variables::{replace_variables, replace_variables_strict};

/// Name of the root-level identity describing the management server itself.
/// The server identity is synthetic: it is not tied to any installed
/// service-component-host.
pub const SERVER_IDENTITY_NAME: &str = "ambari-server";

/// Placeholder replaced with the concrete hostname in principal expressions.
pub const HOST_PLACEHOLDER: &str = "_HOST";

/// A concrete keytab resolved from a keytab descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedKeytab {
    pub path: String,
    pub owner_name: Option<String>,
    pub owner_access: Option<String>,
    pub group_name: Option<String>,
    pub group_access: Option<String>,
    pub cachable: bool,
}

/// A concrete, host-resolved identity. Derived, never persisted; recomputed
/// per operation from descriptor + configuration + hostname.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedIdentity {
    pub name: String,
    pub service_name: String,
    pub component_name: String,
    pub hostname: String,
    pub principal: String,
    pub principal_type: PrincipalType,
    pub local_username: Option<String>,
    pub keytab: Option<ResolvedKeytab>,
}

impl ResolvedIdentity {
    /// Uniqueness key within a host: duplicate resolved identities across
    /// components collapse to one.
    pub fn dedup_key(&self) -> String {
        let keytab_path = self
            .keytab
            .as_ref()
            .map(|k| k.path.as_str())
            .unwrap_or("");
        format!("{}|{}", self.principal, keytab_path)
    }
}

/// Tri-state inclusion: `None` includes all, an empty set includes none, a
/// populated set includes exactly its members.
fn included(filter: Option<&BTreeSet<String>>, value: &str) -> bool {
    filter.map(|set| set.contains(value)).unwrap_or(true)
}

/// Resolve the active identities for every host in scope.
///
/// Filters are tri-state (see [`included`]). When `replace_host_placeholder`
/// is set, literal `_HOST` tokens in principals are replaced with the
/// concrete hostname. Within a host, the first occurrence of a
/// `(principal, keytab path)` pair wins.
pub fn resolve_active_identities(
    cluster: &ClusterSnapshot,
    descriptor: &KerberosDescriptor,
    host_filter: Option<&BTreeSet<String>>,
    service_filter: Option<&BTreeSet<String>>,
    component_filter: Option<&BTreeSet<String>>,
    replace_host_placeholder: bool,
) -> Result<BTreeMap<String, Vec<ResolvedIdentity>>, KriosError> {
    let installed_services = cluster.installed_services();
    let mut active: BTreeMap<String, Vec<ResolvedIdentity>> = BTreeMap::new();

    for host in &cluster.hosts {
        if !included(host_filter, &host.name) {
            continue;
        }

        let configurations = merged_configurations(cluster, Some(&host.name), descriptor);
        let ctx = PredicateContext {
            configurations: &configurations,
            services: &installed_services,
        };

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut identities: Vec<ResolvedIdentity> = Vec::new();

        for sch in cluster.service_component_hosts_on(&host.name) {
            if !included(service_filter, &sch.service_name)
                || !included(component_filter, &sch.component_name)
            {
                continue;
            }

            let Some(service_descriptor) = descriptor.service(&sch.service_name) else {
                // A service with no descriptor has no identities; normal branch.
                continue;
            };

            let service_path = format!("/{}", sch.service_name);
            for identity in &service_descriptor.identities {
                resolve_into(
                    descriptor,
                    identity,
                    &service_path,
                    sch.service_name.as_str(),
                    sch.component_name.as_str(),
                    &host.name,
                    &configurations,
                    &ctx,
                    replace_host_placeholder,
                    &mut seen,
                    &mut identities,
                )?;
            }

            if let Some(component_descriptor) =
                service_descriptor.components.get(&sch.component_name)
            {
                let component_path = format!("/{}/{}", sch.service_name, sch.component_name);
                for identity in &component_descriptor.identities {
                    resolve_into(
                        descriptor,
                        identity,
                        &component_path,
                        sch.service_name.as_str(),
                        sch.component_name.as_str(),
                        &host.name,
                        &configurations,
                        &ctx,
                        replace_host_placeholder,
                        &mut seen,
                        &mut identities,
                    )?;
                }
            }
        }

        if !identities.is_empty() {
            active.insert(host.name.clone(), identities);
        }
    }

    union_server_identity(
        cluster,
        descriptor,
        host_filter,
        replace_host_placeholder,
        &mut active,
    )?;

    Ok(active)
}

/// Convenience view over [`resolve_active_identities`] scoped to single
/// optional host/service/component names.
pub fn get_active_identities(
    cluster: &ClusterSnapshot,
    descriptor: &KerberosDescriptor,
    hostname: Option<&str>,
    service_name: Option<&str>,
    component_name: Option<&str>,
    replace_host_placeholder: bool,
) -> Result<BTreeMap<String, Vec<ResolvedIdentity>>, KriosError> {
    let host_filter = hostname.map(|h| BTreeSet::from([h.to_string()]));
    let service_filter = service_name.map(|s| BTreeSet::from([s.to_string()]));
    let component_filter = component_name.map(|c| BTreeSet::from([c.to_string()]));

    resolve_active_identities(
        cluster,
        descriptor,
        host_filter.as_ref(),
        service_filter.as_ref(),
        component_filter.as_ref(),
        replace_host_placeholder,
    )
}

/// The management server's own identity is unioned in unless
/// `kerberos-env/create_ambari_principal` is explicitly `"false"`.
fn union_server_identity(
    cluster: &ClusterSnapshot,
    descriptor: &KerberosDescriptor,
    host_filter: Option<&BTreeSet<String>>,
    replace_host_placeholder: bool,
    active: &mut BTreeMap<String, Vec<ResolvedIdentity>>,
) -> Result<(), KriosError> {
    let create_server_principal = cluster
        .config_property("kerberos-env", "create_ambari_principal")
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true);
    if !create_server_principal {
        return Ok(());
    }

    let Some(server_host) = cluster.server_host.as_deref() else {
        return Ok(());
    };
    if !included(host_filter, server_host) {
        return Ok(());
    }
    let Some(identity) = descriptor
        .identities
        .iter()
        .find(|i| i.name == SERVER_IDENTITY_NAME)
    else {
        return Ok(());
    };

    let configurations = merged_configurations(cluster, Some(server_host), descriptor);
    let effective = descriptor.dereference(identity, "/");
    if let Some(resolved) = resolve_identity(
        &effective,
        "",
        "",
        server_host,
        &configurations,
        replace_host_placeholder,
    )? {
        let identities = active.entry(server_host.to_string()).or_default();
        let key = resolved.dedup_key();
        if !identities.iter().any(|i| i.dedup_key() == key) {
            identities.push(resolved);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn resolve_into(
    descriptor: &KerberosDescriptor,
    identity: &IdentityDescriptor,
    container_path: &str,
    service_name: &str,
    component_name: &str,
    hostname: &str,
    configurations: &BTreeMap<String, BTreeMap<String, String>>,
    ctx: &PredicateContext<'_>,
    replace_host_placeholder: bool,
    seen: &mut BTreeSet<String>,
    out: &mut Vec<ResolvedIdentity>,
) -> Result<(), KriosError> {
    let effective = descriptor.dereference(identity, container_path);

    if let Some(when) = &effective.when {
        if !when.evaluate(ctx) {
            // Inactive identities are excluded here; the pruning pass records
            // them for removal so references elsewhere stay auditable.
            debug!(
                identity = %effective.name,
                path = %container_path,
                "skipping identity; when-predicate evaluated false"
            );
            return Ok(());
        }
    }

    if let Some(resolved) = resolve_identity(
        &effective,
        service_name,
        component_name,
        hostname,
        configurations,
        replace_host_placeholder,
    )? {
        if seen.insert(resolved.dedup_key()) {
            out.push(resolved);
        }
    }

    Ok(())
}

fn resolve_identity(
    identity: &IdentityDescriptor,
    service_name: &str,
    component_name: &str,
    hostname: &str,
    configurations: &BTreeMap<String, BTreeMap<String, String>>,
    replace_host_placeholder: bool,
) -> Result<Option<ResolvedIdentity>, KriosError> {
    let Some(principal_descriptor) = identity.principal.as_ref() else {
        return Ok(None);
    };
    let Some(principal_expression) = principal_descriptor.value.as_deref() else {
        return Ok(None);
    };

    let mut principal = replace_variables_strict(principal_expression, configurations)?;
    if replace_host_placeholder {
        principal = principal.replace(HOST_PLACEHOLDER, hostname);
    }

    let local_username = principal_descriptor
        .local_username
        .as_deref()
        .map(|expression| replace_variables(expression, configurations));

    let keytab = match identity.keytab.as_ref() {
        Some(keytab_descriptor) => match keytab_descriptor.file.as_deref() {
            Some(file_expression) => {
                let path = replace_variables_strict(file_expression, configurations)?;
                Some(ResolvedKeytab {
                    path,
                    owner_name: keytab_descriptor
                        .owner
                        .as_ref()
                        .and_then(|acl| acl.name.as_deref())
                        .map(|e| replace_variables(e, configurations)),
                    owner_access: keytab_descriptor
                        .owner
                        .as_ref()
                        .and_then(|acl| acl.access.clone()),
                    group_name: keytab_descriptor
                        .group
                        .as_ref()
                        .and_then(|acl| acl.name.as_deref())
                        .map(|e| replace_variables(e, configurations)),
                    group_access: keytab_descriptor
                        .group
                        .as_ref()
                        .and_then(|acl| acl.access.clone()),
                    cachable: keytab_descriptor.cachable,
                })
            }
            None => None,
        },
        None => None,
    };

    Ok(Some(ResolvedIdentity {
        name: identity.name.clone(),
        service_name: service_name.to_string(),
        component_name: component_name.to_string(),
        hostname: hostname.to_string(),
        principal,
        principal_type: principal_descriptor.principal_type,
        local_username,
        keytab,
    }))
}
