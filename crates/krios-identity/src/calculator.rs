//! Configuration Calculator: merged configuration snapshots.
//!
//! Merges the cluster's desired configuration with host-specific overrides
//! and computed synthetic values. Merge precedence, later wins:
//! descriptor/global defaults < cluster desired configuration < host
//! overrides < computed values.

use chrono::Utc;
use krios_core::{ClusterSnapshot, KerberosDescriptor};
use std::collections::BTreeMap;

use crate::variables::DEFAULT_GROUP;

/// Configuration group receiving the flattened cluster topology.
pub const CLUSTER_HOST_INFO: &str = "clusterHostInfo";

/// Compute the merged configuration for a cluster, optionally scoped to one
/// host. The result maps configuration type to property map; the default
/// (unnamed) group carries the computed values referenced by unqualified
/// `${...}` variables.
pub fn calculate_configurations(
    cluster: &ClusterSnapshot,
    hostname: Option<&str>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut configurations: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    // Cluster desired configuration.
    for (config_type, properties) in &cluster.desired_configs {
        configurations
            .entry(config_type.clone())
            .or_default()
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    // Host-specific overrides.
    if let Some(hostname) = hostname {
        if let Some(overrides) = cluster.host_overrides.get(hostname) {
            for (config_type, properties) in overrides {
                configurations
                    .entry(config_type.clone())
                    .or_default()
                    .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
    }

    // Computed synthetic values win over everything.
    let default_group = configurations.entry(DEFAULT_GROUP.to_string()).or_default();
    if let Some(hostname) = hostname {
        default_group.insert("host".to_string(), hostname.to_string());
        default_group.insert("hostname".to_string(), hostname.to_string());
    }
    default_group.insert("cluster_name".to_string(), cluster.cluster_name.clone());
    default_group.insert(
        "short_date".to_string(),
        Utc::now().format("%m%d%y").to_string(),
    );
    if let Some(realm) = cluster.config_property("kerberos-env", "realm") {
        default_group.insert("realm".to_string(), realm.to_string());
    }

    configurations.insert(CLUSTER_HOST_INFO.to_string(), cluster_host_info(cluster));

    configurations
}

/// Merge a descriptor's global properties underneath the calculated
/// configuration (descriptor defaults are the weakest layer).
pub fn merged_configurations(
    cluster: &ClusterSnapshot,
    hostname: Option<&str>,
    descriptor: &KerberosDescriptor,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut configurations = calculate_configurations(cluster, hostname);
    let default_group = configurations.entry(DEFAULT_GROUP.to_string()).or_default();
    for (key, value) in &descriptor.properties {
        default_group
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    configurations
}

/// Flatten the cluster topology into the `clusterHostInfo` group: for each
/// component, `<component>_hosts` maps to a compressed index list into the
/// sorted `all_hosts` list (e.g. `"0-2,5"`).
fn cluster_host_info(cluster: &ClusterSnapshot) -> BTreeMap<String, String> {
    let all_hosts = cluster.sorted_hostnames();
    let index_of: BTreeMap<&str, usize> = all_hosts
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut info = BTreeMap::new();
    info.insert("all_hosts".to_string(), all_hosts.join(","));

    for service in cluster.services.values() {
        for component in service.components.values() {
            let mut indexes: Vec<usize> = component
                .host_instances
                .keys()
                .filter_map(|hostname| index_of.get(hostname.as_str()).copied())
                .collect();
            indexes.sort_unstable();
            indexes.dedup();

            let key = format!("{}_hosts", component.name.to_lowercase());
            info.insert(key, compress_indexes(&indexes));
        }
    }

    info
}

/// Render a sorted index list as comma-separated ranges.
fn compress_indexes(indexes: &[usize]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < indexes.len() {
        let start = indexes[i];
        let mut end = start;
        while i + 1 < indexes.len() && indexes[i + 1] == end + 1 {
            i += 1;
            end = indexes[i];
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
        i += 1;
    }
    parts.join(",")
}
