//! In-memory cluster snapshot: services, components, hosts, configuration.
//!
//! The snapshot is the planner's entire view of the cluster. It is built by
//! the caller (from whatever persistence layer hosts the real entities) and
//! mutated only to record security-state transitions at the end of a
//! successful planning pass.

use crate::state::{SecurityState, SecurityType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Host-level maintenance state. Hosts in maintenance are suppressed from
/// command targeting with a warning, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceState {
    Off,
    On,
}

impl Default for MaintenanceState {
    fn default() -> Self {
        MaintenanceState::Off
    }
}

/// Lifecycle state of a component deployed on a host. Only `Installed` (and
/// beyond) matters to the planner: keytab distribution targets hosts whose
/// Kerberos client component reports at least `Installed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchState {
    Init,
    Installing,
    Installed,
    Started,
}

impl Default for SchState {
    fn default() -> Self {
        SchState::Init
    }
}

/// A host known to the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    #[serde(default)]
    pub maintenance: MaintenanceState,
}

/// The deployment of one component of one service onto one host; the basic
/// unit of state tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceComponentHost {
    pub service_name: String,
    pub component_name: String,
    pub hostname: String,
    #[serde(default)]
    pub state: SchState,
    #[serde(default)]
    pub desired_security_state: SecurityState,
    #[serde(default)]
    pub security_state: SecurityState,
}

/// A component of a service, with its per-host instances keyed by hostname.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub host_instances: BTreeMap<String, ServiceComponentHost>,
}

/// An installed service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub maintenance: MaintenanceState,
    #[serde(default)]
    pub desired_security_state: SecurityState,
    #[serde(default)]
    pub security_state: SecurityState,
    #[serde(default)]
    pub components: BTreeMap<String, Component>,
}

/// The full cluster snapshot handed to the orchestrator.
///
/// `desired_configs` maps configuration type (e.g. `kerberos-env`) to its
/// property map; `host_overrides` layers host-specific values on top when a
/// calculation is scoped to a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub cluster_name: String,
    #[serde(default)]
    pub security_type: SecurityType,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    #[serde(default)]
    pub desired_configs: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub host_overrides: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
    /// Host running the management server itself; the server's own identity
    /// is resolved against this host.
    #[serde(default)]
    pub server_host: Option<String>,
}

impl ClusterSnapshot {
    /// Look up a configuration type. Absence is a normal branch, not an error.
    pub fn config(&self, config_type: &str) -> Option<&BTreeMap<String, String>> {
        self.desired_configs.get(config_type)
    }

    /// A single property out of a configuration type.
    pub fn config_property(&self, config_type: &str, property: &str) -> Option<&str> {
        self.config(config_type)
            .and_then(|props| props.get(property))
            .map(String::as_str)
    }

    /// Names of all installed services.
    pub fn installed_services(&self) -> BTreeSet<String> {
        self.services.keys().cloned().collect()
    }

    /// Hostnames in deterministic (sorted) order. Host-index compression in
    /// the calculated `clusterHostInfo` depends on this ordering.
    pub fn sorted_hostnames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.iter().map(|h| h.name.clone()).collect();
        names.sort();
        names
    }

    pub fn host(&self, hostname: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == hostname)
    }

    /// All service-component-hosts, flattened, in deterministic order.
    pub fn service_component_hosts(&self) -> Vec<&ServiceComponentHost> {
        let mut schs = Vec::new();
        for service in self.services.values() {
            for component in service.components.values() {
                for sch in component.host_instances.values() {
                    schs.push(sch);
                }
            }
        }
        schs
    }

    /// Service-component-hosts on one host.
    pub fn service_component_hosts_on(&self, hostname: &str) -> Vec<&ServiceComponentHost> {
        self.service_component_hosts()
            .into_iter()
            .filter(|sch| sch.hostname == hostname)
            .collect()
    }

    /// Hostnames carrying the given component of the given service.
    pub fn hosts_with_component(&self, service_name: &str, component_name: &str) -> Vec<String> {
        self.services
            .get(service_name)
            .and_then(|s| s.components.get(component_name))
            .map(|c| c.host_instances.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Hosts whose instance of `component_name` (any service) reports at
    /// least `Installed`. Used to decide where keytabs can be placed.
    pub fn hosts_with_installed_component(&self, component_name: &str) -> BTreeSet<String> {
        let mut hosts = BTreeSet::new();
        for service in self.services.values() {
            if let Some(component) = service.components.get(component_name) {
                for (hostname, sch) in &component.host_instances {
                    if matches!(sch.state, SchState::Installed | SchState::Started) {
                        hosts.insert(hostname.clone());
                    }
                }
            }
        }
        hosts
    }

    /// Mutable access to every service-component-host, for applying
    /// security-state transitions after a successful planning pass.
    pub fn for_each_sch_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut ServiceComponentHost),
    {
        for service in self.services.values_mut() {
            for component in service.components.values_mut() {
                for sch in component.host_instances.values_mut() {
                    f(sch);
                }
            }
        }
    }
}
