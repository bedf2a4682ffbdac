//! Custom action validation and planning.
//!
//! A custom action names an agent-side script to run on a set of hosts. The
//! request is validated against an action catalog and the cluster topology;
//! a valid request yields a single stage of agent tasks, expanded through
//! the role-command order graph like every other stage.

use krios_core::{ClusterSnapshot, KriosError, MaintenanceState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::command::{build_agent_command, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::order::RoleCommandOrder;
use crate::stage::{Stage, StageContainer, Task};

/// Role command used for custom action tasks.
pub const ACTION_EXECUTE_COMMAND: &str = "ACTIONEXECUTE";

/// A catalog entry describing an executable custom action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Service this action is bound to; `None` means cluster-scoped.
    #[serde(default)]
    pub target_service: Option<String>,
    /// Component whose hosts are the default candidates.
    #[serde(default)]
    pub target_component: Option<String>,
    pub script: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// When set, the caller must name target hosts explicitly.
    #[serde(default)]
    pub requires_target_hosts: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

/// The set of actions a cluster may execute.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: BTreeMap<String, ActionDefinition>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ActionDefinition) {
        self.actions.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(name)
    }
}

/// Targeting filter of an action request. At most one filter is allowed per
/// request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub component_name: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// A request to run a custom action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_name: String,
    #[serde(default)]
    pub resource_filters: Vec<ResourceFilter>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Validate an action request and plan its stage into the container,
/// returning the container's last stage id.
///
/// Validation failures are fatal to this request only. Hosts suppressed by
/// maintenance state reduce the target set with a warning.
pub fn plan_custom_action(
    cluster: &ClusterSnapshot,
    catalog: &ActionCatalog,
    request: &ActionRequest,
    order: &RoleCommandOrder,
    container: &mut StageContainer,
) -> Result<u64, KriosError> {
    if request.action_name.trim().is_empty() {
        return Err(KriosError::validation("action name cannot be empty"));
    }
    let definition = catalog.get(&request.action_name).ok_or_else(|| {
        KriosError::validation(format!(
            "action '{}' does not exist in the action catalog",
            request.action_name
        ))
    })?;

    if request.resource_filters.len() > 1 {
        return Err(KriosError::validation(format!(
            "{} resource filters were specified; at most one is allowed per action request",
            request.resource_filters.len()
        )));
    }
    let filter = request.resource_filters.first().cloned().unwrap_or_default();

    // The filter may narrow, never contradict, the action's own target.
    if let (Some(action_service), Some(filter_service)) =
        (definition.target_service.as_deref(), filter.service_name.as_deref())
    {
        if action_service != filter_service {
            return Err(KriosError::validation(format!(
                "action '{}' targets service '{}' but the resource filter specifies '{}'",
                definition.name, action_service, filter_service
            )));
        }
    }

    let service_name = filter
        .service_name
        .clone()
        .or_else(|| definition.target_service.clone());
    let component_name = filter
        .component_name
        .clone()
        .or_else(|| definition.target_component.clone());

    // Candidate hosts: the component's hosts when a component is in play,
    // every cluster host otherwise.
    let candidates: Vec<String> = match (&service_name, &component_name) {
        (Some(service), Some(component)) => cluster.hosts_with_component(service, component),
        _ => cluster.hosts.iter().map(|h| h.name.clone()).collect(),
    };

    if definition.requires_target_hosts && filter.hosts.is_empty() {
        return Err(KriosError::validation(format!(
            "action '{}' requires an explicit target host list, but none was specified",
            definition.name
        )));
    }

    let requested: Vec<String> = if filter.hosts.is_empty() {
        candidates.clone()
    } else {
        for hostname in &filter.hosts {
            if !candidates.contains(hostname) {
                return Err(KriosError::validation(format!(
                    "host '{}' is not a valid target for action '{}'",
                    hostname, definition.name
                )));
            }
        }
        filter.hosts.clone()
    };

    // Maintenance suppression reduces the set; it never fails the request.
    let targets: Vec<String> = requested
        .into_iter()
        .filter(|hostname| {
            let suppressed = cluster
                .host(hostname)
                .map(|h| h.maintenance == MaintenanceState::On)
                .unwrap_or(false);
            if suppressed {
                warn!(hostname = %hostname, action = %definition.name,
                      "host in maintenance; excluded from action targets");
            }
            !suppressed
        })
        .collect();

    let role = component_name
        .clone()
        .unwrap_or_else(|| definition.name.to_uppercase());
    let mut stage = Stage::new(
        0,
        format!("Execute {}", definition.name),
        "{}",
        serde_json::to_string(&request.parameters)?,
        "{}",
    );
    for hostname in &targets {
        stage.add_task(
            hostname.clone(),
            role.clone(),
            Task::AgentExecution {
                command: build_agent_command(
                    cluster,
                    hostname,
                    service_name.as_deref().unwrap_or(""),
                    &role,
                    ACTION_EXECUTE_COMMAND,
                    &definition.script,
                    definition.timeout_secs,
                    request.parameters.clone(),
                    BTreeMap::new(),
                ),
            },
        );
    }

    let first_id = container.last_stage_id() + 1;
    for ordered in order.order_stage(stage, first_id)? {
        container.add_stage(ordered)?;
    }
    Ok(container.last_stage_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use krios_core::{Component, Host, Service, ServiceComponentHost};

    fn create_test_cluster() -> ClusterSnapshot {
        let mut services = BTreeMap::new();
        let mut components = BTreeMap::new();
        let mut host_instances = BTreeMap::new();
        for hostname in ["host1", "host2"] {
            host_instances.insert(
                hostname.to_string(),
                ServiceComponentHost {
                    service_name: "HDFS".to_string(),
                    component_name: "DATANODE".to_string(),
                    hostname: hostname.to_string(),
                    ..Default::default()
                },
            );
        }
        components.insert(
            "DATANODE".to_string(),
            Component {
                name: "DATANODE".to_string(),
                host_instances,
            },
        );
        services.insert(
            "HDFS".to_string(),
            Service {
                name: "HDFS".to_string(),
                components,
                ..Default::default()
            },
        );

        ClusterSnapshot {
            cluster_name: "c1".to_string(),
            security_type: Default::default(),
            hosts: vec![
                Host {
                    name: "host1".to_string(),
                    maintenance: Default::default(),
                },
                Host {
                    name: "host2".to_string(),
                    maintenance: Default::default(),
                },
                Host {
                    name: "host3".to_string(),
                    maintenance: Default::default(),
                },
            ],
            services,
            desired_configs: BTreeMap::new(),
            host_overrides: BTreeMap::new(),
            server_host: None,
        }
    }

    fn create_test_catalog() -> ActionCatalog {
        let mut catalog = ActionCatalog::new();
        catalog.register(ActionDefinition {
            name: "check_disk".to_string(),
            description: None,
            target_service: Some("HDFS".to_string()),
            target_component: Some("DATANODE".to_string()),
            script: "scripts/check_disk.py".to_string(),
            timeout_secs: 300,
            requires_target_hosts: false,
        });
        catalog.register(ActionDefinition {
            name: "collect_logs".to_string(),
            description: None,
            target_service: None,
            target_component: None,
            script: "scripts/collect_logs.py".to_string(),
            timeout_secs: 600,
            requires_target_hosts: true,
        });
        catalog
    }

    fn request(action: &str, filters: Vec<ResourceFilter>) -> ActionRequest {
        ActionRequest {
            action_name: action.to_string(),
            resource_filters: filters,
            parameters: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_action_name_rejected() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        let err = plan_custom_action(
            &cluster,
            &catalog,
            &request("  ", vec![]),
            &order,
            &mut container,
        )
        .unwrap_err();
        assert!(matches!(err, KriosError::Validation(_)));
    }

    #[test]
    fn unknown_action_rejected() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        assert!(plan_custom_action(
            &cluster,
            &catalog,
            &request("bogus", vec![]),
            &order,
            &mut container
        )
        .is_err());
    }

    #[test]
    fn multiple_filters_rejected() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        let err = plan_custom_action(
            &cluster,
            &catalog,
            &request(
                "check_disk",
                vec![ResourceFilter::default(), ResourceFilter::default()],
            ),
            &order,
            &mut container,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at most one"));
    }

    #[test]
    fn service_mismatch_rejected() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        let err = plan_custom_action(
            &cluster,
            &catalog,
            &request(
                "check_disk",
                vec![ResourceFilter {
                    service_name: Some("YARN".to_string()),
                    ..Default::default()
                }],
            ),
            &order,
            &mut container,
        )
        .unwrap_err();
        assert!(err.to_string().contains("YARN"));
    }

    #[test]
    fn missing_required_hosts_rejected() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        let err = plan_custom_action(
            &cluster,
            &catalog,
            &request("collect_logs", vec![]),
            &order,
            &mut container,
        )
        .unwrap_err();
        assert!(err.to_string().contains("target host list"));
    }

    #[test]
    fn host_outside_candidates_rejected() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        // host3 carries no DATANODE.
        let err = plan_custom_action(
            &cluster,
            &catalog,
            &request(
                "check_disk",
                vec![ResourceFilter {
                    hosts: vec!["host3".to_string()],
                    ..Default::default()
                }],
            ),
            &order,
            &mut container,
        )
        .unwrap_err();
        assert!(err.to_string().contains("host3"));
    }

    #[test]
    fn component_hosts_become_default_targets() {
        let cluster = create_test_cluster();
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        let last = plan_custom_action(
            &cluster,
            &catalog,
            &request("check_disk", vec![]),
            &order,
            &mut container,
        )
        .unwrap();
        assert_eq!(last, 1);

        let stage = &container.stages()[0];
        assert_eq!(stage.task_count(), 2);
        assert!(stage.tasks().contains_key("host1"));
        assert!(stage.tasks().contains_key("host2"));
    }

    #[test]
    fn maintenance_hosts_reduce_targets() {
        let mut cluster = create_test_cluster();
        cluster.hosts[1].maintenance = MaintenanceState::On; // host2
        let catalog = create_test_catalog();
        let order = RoleCommandOrder::default_order();
        let mut container = StageContainer::new(1);

        plan_custom_action(
            &cluster,
            &catalog,
            &request("check_disk", vec![]),
            &order,
            &mut container,
        )
        .unwrap();

        let stage = &container.stages()[0];
        assert_eq!(stage.task_count(), 1);
        assert!(stage.tasks().contains_key("host1"));
    }
}
