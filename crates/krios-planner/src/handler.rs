//! Operation handler state machines.
//!
//! Each operation is a variant of a closed enum; `create_stages` emits the
//! variant's stage sequence into the container, gated on whether identity
//! management is delegated externally. Every stage-adding helper is
//! symmetric: build the command parameter map, create the stage through the
//! shared constructor, expand it through the role-command order graph, and
//! append the resulting ordered stages.

use krios_core::{KriosError, SecurityState, ServiceComponentHost};
use krios_identity::KerberosDetails;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use crate::command::{
    self, build_agent_command, server_actions, CUSTOM_COMMAND, CUSTOM_COMMAND_PARAM,
    DEFAULT_COMMAND_TIMEOUT_SECS, KERBEROS_CLIENT_ROLE, KERBEROS_CLIENT_SCRIPT,
    REMOVE_KEYTAB_COMMAND, SET_KEYTAB_COMMAND,
};
use crate::order::RoleCommandOrder;
use crate::stage::{Stage, StageContainer, Task, SERVER_ACTION_ROLE};

/// Custom command dispatched to each service's scripts when security is
/// being disabled.
const DISABLE_SECURITY_COMMAND: &str = "DISABLE_SECURITY";

/// Service whose coordination quorum is stopped before disabling security.
const COORDINATION_SERVICE: &str = "ZOOKEEPER";
const COORDINATION_SERVER_ROLE: &str = "ZOOKEEPER_SERVER";

/// Per-service/component inclusion filter. A `None` component set means
/// every component of the service.
pub type ServiceComponentFilter = BTreeMap<String, Option<BTreeSet<String>>>;

/// Everything a handler needs to plan stages. Planning is pure computation
/// over this context; no entity state is touched here.
pub struct PlanningContext<'a> {
    pub cluster: &'a krios_core::ClusterSnapshot,
    pub details: &'a KerberosDetails,
    pub order: &'a RoleCommandOrder,
    pub authenticated_user: &'a str,
    pub server_host: &'a str,
    pub data_directory: Option<&'a Path>,
    pub service_component_filter: Option<&'a ServiceComponentFilter>,
    pub host_filter: Option<&'a BTreeSet<String>>,
    pub identity_filter: Option<&'a BTreeSet<String>>,
    /// The service-component-hosts this pass touches, already filtered.
    pub service_component_hosts: &'a [ServiceComponentHost],
    /// Hosts known to carry an installed Kerberos client (plus any
    /// caller-forced hosts).
    pub hosts_with_valid_kerberos_client: &'a BTreeSet<String>,
    /// JSON-encoded topology and host parameters shared by every stage.
    pub cluster_host_info: &'a str,
    pub host_params: &'a str,
}

impl PlanningContext<'_> {
    /// The parameter map every stage starts from.
    fn base_command_params(&self) -> Result<BTreeMap<String, String>, KriosError> {
        let mut params = BTreeMap::new();
        params.insert(
            command::AUTHENTICATED_USER_NAME.to_string(),
            self.authenticated_user.to_string(),
        );
        params.insert(
            command::DEFAULT_REALM.to_string(),
            self.details.default_realm().to_string(),
        );
        if let Some(data_directory) = self.data_directory {
            params.insert(
                command::DATA_DIRECTORY.to_string(),
                data_directory.display().to_string(),
            );
        }
        if let Some(filter) = self.service_component_filter {
            params.insert(
                command::SERVICE_COMPONENT_FILTER.to_string(),
                serde_json::to_string(filter)?,
            );
        }
        if let Some(filter) = self.host_filter {
            params.insert(command::HOST_FILTER.to_string(), serde_json::to_string(filter)?);
        }
        if let Some(filter) = self.identity_filter {
            params.insert(
                command::IDENTITY_FILTER.to_string(),
                serde_json::to_string(filter)?,
            );
        }
        Ok(params)
    }

    /// Expand a stage through the order graph and append the result.
    fn append_ordered(
        &self,
        container: &mut StageContainer,
        stage: Stage,
    ) -> Result<(), KriosError> {
        let first_id = container.last_stage_id() + 1;
        for ordered in self.order.order_stage(stage, first_id)? {
            container.add_stage(ordered)?;
        }
        Ok(())
    }

    fn new_stage(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Stage, KriosError> {
        Ok(Stage::new(
            0,
            name,
            self.cluster_host_info,
            serde_json::to_string(params)?,
            self.host_params,
        ))
    }

    fn add_server_action_stage(
        &self,
        container: &mut StageContainer,
        name: &str,
        action: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<(), KriosError> {
        let mut stage = self.new_stage(name, params)?;
        stage.add_task(
            self.server_host,
            SERVER_ACTION_ROLE,
            Task::ServerAction {
                action: action.to_string(),
            },
        );
        self.append_ordered(container, stage)
    }

    /// Keytab distribution/removal stage: one Kerberos-client task per host
    /// that carries a valid client. The stage is planned even when no host
    /// qualifies; it still exists for ordering purposes.
    fn add_keytab_stage(
        &self,
        container: &mut StageContainer,
        name: &str,
        custom_command: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<(), KriosError> {
        let mut stage = self.new_stage(name, params)?;
        for sch in self.service_component_hosts {
            if !self.hosts_with_valid_kerberos_client.contains(&sch.hostname) {
                debug!(
                    hostname = %sch.hostname,
                    "excluding host without an installed Kerberos client"
                );
                continue;
            }
            stage.add_task(
                sch.hostname.clone(),
                KERBEROS_CLIENT_ROLE,
                Task::AgentExecution {
                    command: build_agent_command(
                        self.cluster,
                        &sch.hostname,
                        "KERBEROS",
                        KERBEROS_CLIENT_ROLE,
                        CUSTOM_COMMAND,
                        KERBEROS_CLIENT_SCRIPT,
                        DEFAULT_COMMAND_TIMEOUT_SECS,
                        params.clone(),
                        BTreeMap::from([(
                            CUSTOM_COMMAND_PARAM.to_string(),
                            custom_command.to_string(),
                        )]),
                    ),
                },
            );
        }
        self.append_ordered(container, stage)
    }

    /// Per-service disable-security hook, dispatched as a custom command to
    /// every in-scope service-component-host.
    fn add_disable_security_hook_stage(
        &self,
        container: &mut StageContainer,
        params: &BTreeMap<String, String>,
    ) -> Result<(), KriosError> {
        let mut stage = self.new_stage("Disable Security", params)?;
        for sch in self.service_component_hosts {
            stage.add_task(
                sch.hostname.clone(),
                sch.component_name.clone(),
                Task::AgentExecution {
                    command: build_agent_command(
                        self.cluster,
                        &sch.hostname,
                        &sch.service_name,
                        &sch.component_name,
                        CUSTOM_COMMAND,
                        &format!("scripts/{}.py", sch.component_name.to_lowercase()),
                        DEFAULT_COMMAND_TIMEOUT_SECS,
                        params.clone(),
                        BTreeMap::from([(
                            CUSTOM_COMMAND_PARAM.to_string(),
                            DISABLE_SECURITY_COMMAND.to_string(),
                        )]),
                    ),
                },
            );
        }
        self.append_ordered(container, stage)
    }

    /// Stop the coordination service's servers, when the service is
    /// installed. Absence is a normal branch, not an error.
    fn add_stop_coordination_service_stage(
        &self,
        container: &mut StageContainer,
        params: &BTreeMap<String, String>,
    ) -> Result<(), KriosError> {
        let Some(service) = self.cluster.services.get(COORDINATION_SERVICE) else {
            return Ok(());
        };
        let Some(component) = service.components.get(COORDINATION_SERVER_ROLE) else {
            return Ok(());
        };

        let mut stage = self.new_stage("Stopping ZooKeeper", params)?;
        for hostname in component.host_instances.keys() {
            stage.add_task(
                hostname.clone(),
                COORDINATION_SERVER_ROLE,
                Task::AgentExecution {
                    command: build_agent_command(
                        self.cluster,
                        hostname,
                        COORDINATION_SERVICE,
                        COORDINATION_SERVER_ROLE,
                        "STOP",
                        "scripts/zookeeper_server.py",
                        DEFAULT_COMMAND_TIMEOUT_SECS,
                        params.clone(),
                        BTreeMap::new(),
                    ),
                },
            );
        }
        self.append_ordered(container, stage)
    }
}

/// The operations this planner knows how to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationHandler {
    EnableKerberos,
    DisableKerberos,
    CreatePrincipalsAndKeytabs {
        regenerate_all: bool,
        update_configurations: bool,
        include_server_identity: bool,
    },
    DeletePrincipalsAndKeytabs,
}

impl OperationHandler {
    /// Whether this pass touches the given service-component-host.
    pub fn should_process(&self, sch: &ServiceComponentHost) -> bool {
        match self {
            OperationHandler::EnableKerberos => true,
            OperationHandler::DisableKerberos => {
                (sch.desired_security_state != SecurityState::Unsecured
                    || sch.security_state != SecurityState::Unsecured)
                    && sch.security_state != SecurityState::Unsecuring
            }
            OperationHandler::CreatePrincipalsAndKeytabs { .. } => true,
            OperationHandler::DeletePrincipalsAndKeytabs => true,
        }
    }

    /// Desired security state to record on processed SCHs, when this
    /// operation transitions state at all.
    pub fn new_desired_sch_security_state(&self) -> Option<SecurityState> {
        match self {
            OperationHandler::EnableKerberos => Some(SecurityState::SecuredKerberos),
            OperationHandler::DisableKerberos => Some(SecurityState::Unsecured),
            _ => None,
        }
    }

    /// Transitional current state to record on processed SCHs.
    pub fn new_sch_security_state(&self) -> Option<SecurityState> {
        match self {
            OperationHandler::EnableKerberos => Some(SecurityState::Securing),
            OperationHandler::DisableKerberos => Some(SecurityState::Unsecuring),
            _ => None,
        }
    }

    /// Desired security state to record on affected services.
    pub fn new_service_security_state(&self) -> Option<SecurityState> {
        match self {
            OperationHandler::EnableKerberos => Some(SecurityState::SecuredKerberos),
            OperationHandler::DisableKerberos => Some(SecurityState::Unsecured),
            _ => None,
        }
    }

    /// Emit this operation's stage sequence, returning the container's last
    /// stage id.
    pub fn create_stages(
        &self,
        ctx: &PlanningContext<'_>,
        container: &mut StageContainer,
    ) -> Result<u64, KriosError> {
        match self {
            OperationHandler::EnableKerberos => self.create_enable_stages(ctx, container),
            OperationHandler::DisableKerberos => self.create_disable_stages(ctx, container),
            OperationHandler::CreatePrincipalsAndKeytabs {
                regenerate_all,
                update_configurations,
                include_server_identity,
            } => self.create_ensure_stages(
                ctx,
                container,
                *regenerate_all,
                *update_configurations,
                *include_server_identity,
            ),
            OperationHandler::DeletePrincipalsAndKeytabs => {
                self.create_delete_stages(ctx, container)
            }
        }
    }

    fn create_enable_stages(
        &self,
        ctx: &PlanningContext<'_>,
        container: &mut StageContainer,
    ) -> Result<u64, KriosError> {
        let mut params = ctx.base_command_params()?;
        params.insert(
            command::UPDATE_CONFIGURATION_NOTE.to_string(),
            "Enabling Kerberos".to_string(),
        );
        params.insert(command::UPDATE_CONFIGURATIONS.to_string(), "true".to_string());

        ctx.add_server_action_stage(
            container,
            "Preparing Operations",
            server_actions::PREPARE_ENABLE_KERBEROS_OPERATIONS,
            &params,
        )?;

        if ctx.details.manage_identities() {
            params.insert(
                command::KDC_TYPE.to_string(),
                ctx.details.kdc_type().as_str().to_string(),
            );

            ctx.add_server_action_stage(
                container,
                "Create Principals",
                server_actions::CREATE_PRINCIPALS,
                &params,
            )?;
            ctx.add_server_action_stage(
                container,
                "Create Keytabs",
                server_actions::CREATE_KEYTAB_FILES,
                &params,
            )?;
            if ctx.details.create_ambari_principal() {
                ctx.add_server_action_stage(
                    container,
                    "Configure Server Identity",
                    server_actions::CONFIGURE_SERVER_IDENTITY,
                    &params,
                )?;
            }
            ctx.add_keytab_stage(container, "Distribute Keytabs", SET_KEYTAB_COMMAND, &params)?;
        }

        ctx.add_server_action_stage(
            container,
            "Update Configurations",
            server_actions::UPDATE_KERBEROS_CONFIGURATIONS,
            &params,
        )?;

        Ok(container.last_stage_id())
    }

    fn create_disable_stages(
        &self,
        ctx: &PlanningContext<'_>,
        container: &mut StageContainer,
    ) -> Result<u64, KriosError> {
        let mut params = ctx.base_command_params()?;
        params.insert(
            command::UPDATE_CONFIGURATION_NOTE.to_string(),
            "Disabling Kerberos".to_string(),
        );
        params.insert(command::UPDATE_CONFIGURATIONS.to_string(), "true".to_string());

        ctx.add_disable_security_hook_stage(container, &params)?;
        ctx.add_stop_coordination_service_stage(container, &params)?;
        ctx.add_server_action_stage(
            container,
            "Preparing Operations",
            server_actions::PREPARE_DISABLE_KERBEROS_OPERATIONS,
            &params,
        )?;
        ctx.add_server_action_stage(
            container,
            "Update Configurations",
            server_actions::UPDATE_KERBEROS_CONFIGURATIONS,
            &params,
        )?;

        if ctx.details.manage_identities() {
            params.insert(
                command::KDC_TYPE.to_string(),
                ctx.details.kdc_type().as_str().to_string(),
            );

            ctx.add_server_action_stage(
                container,
                "Destroy Principals",
                server_actions::DESTROY_PRINCIPALS,
                &params,
            )?;
            ctx.add_keytab_stage(container, "Delete Keytabs", REMOVE_KEYTAB_COMMAND, &params)?;
        }

        ctx.add_server_action_stage(
            container,
            "Kerberos Cleanup",
            server_actions::CLEANUP_KERBEROS_DATA,
            &params,
        )?;

        Ok(container.last_stage_id())
    }

    fn create_ensure_stages(
        &self,
        ctx: &PlanningContext<'_>,
        container: &mut StageContainer,
        regenerate_all: bool,
        update_configurations: bool,
        include_server_identity: bool,
    ) -> Result<u64, KriosError> {
        let mut params = ctx.base_command_params()?;
        params.insert(
            command::REGENERATE_ALL.to_string(),
            if regenerate_all { "true" } else { "false" }.to_string(),
        );
        params.insert(
            command::INCLUDE_AMBARI_IDENTITY.to_string(),
            if include_server_identity { "true" } else { "false" }.to_string(),
        );
        if update_configurations {
            params.insert(
                command::UPDATE_CONFIGURATION_NOTE.to_string(),
                "Updated Kerberos-related configurations".to_string(),
            );
            params.insert(command::UPDATE_CONFIGURATIONS.to_string(), "true".to_string());
        }

        ctx.add_server_action_stage(
            container,
            "Prepare Identities",
            server_actions::PREPARE_KERBEROS_IDENTITIES,
            &params,
        )?;

        if ctx.details.manage_identities() {
            params.insert(
                command::KDC_TYPE.to_string(),
                ctx.details.kdc_type().as_str().to_string(),
            );

            ctx.add_server_action_stage(
                container,
                "Create Principals",
                server_actions::CREATE_PRINCIPALS,
                &params,
            )?;
            ctx.add_server_action_stage(
                container,
                "Create Keytabs",
                server_actions::CREATE_KEYTAB_FILES,
                &params,
            )?;
            if include_server_identity && ctx.details.create_ambari_principal() {
                ctx.add_server_action_stage(
                    container,
                    "Configure Server Identity",
                    server_actions::CONFIGURE_SERVER_IDENTITY,
                    &params,
                )?;
            }
            ctx.add_keytab_stage(container, "Distribute Keytabs", SET_KEYTAB_COMMAND, &params)?;
        }

        if update_configurations {
            ctx.add_server_action_stage(
                container,
                "Update Configurations",
                server_actions::UPDATE_KERBEROS_CONFIGURATIONS,
                &params,
            )?;
        }

        Ok(container.last_stage_id())
    }

    fn create_delete_stages(
        &self,
        ctx: &PlanningContext<'_>,
        container: &mut StageContainer,
    ) -> Result<u64, KriosError> {
        if ctx.details.manage_identities() {
            let mut params = ctx.base_command_params()?;
            params.insert(
                command::KDC_TYPE.to_string(),
                ctx.details.kdc_type().as_str().to_string(),
            );

            ctx.add_server_action_stage(
                container,
                "Prepare Identities",
                server_actions::PREPARE_KERBEROS_IDENTITIES,
                &params,
            )?;
            ctx.add_server_action_stage(
                container,
                "Destroy Principals",
                server_actions::DESTROY_PRINCIPALS,
                &params,
            )?;
            ctx.add_keytab_stage(container, "Delete Keytabs", REMOVE_KEYTAB_COMMAND, &params)?;
        }

        Ok(container.last_stage_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krios_core::{
        ClusterSnapshot, Component, Host, SchState, SecurityType, Service,
    };

    fn create_test_cluster(manage_identities: Option<&str>) -> ClusterSnapshot {
        let mut desired_configs = BTreeMap::new();
        desired_configs.insert("krb5-conf".to_string(), BTreeMap::new());
        let mut kerberos_env = BTreeMap::new();
        kerberos_env.insert("realm".to_string(), "EXAMPLE.COM".to_string());
        kerberos_env.insert("kdc_type".to_string(), "mit-kdc".to_string());
        if let Some(value) = manage_identities {
            kerberos_env.insert("manage_identities".to_string(), value.to_string());
        }
        desired_configs.insert("kerberos-env".to_string(), kerberos_env);

        let mut services = BTreeMap::new();
        let mut components = BTreeMap::new();
        for component in ["NAMENODE", "DATANODE"] {
            let mut host_instances = BTreeMap::new();
            host_instances.insert(
                "host1".to_string(),
                ServiceComponentHost {
                    service_name: "HDFS".to_string(),
                    component_name: component.to_string(),
                    hostname: "host1".to_string(),
                    state: SchState::Installed,
                    ..Default::default()
                },
            );
            components.insert(
                component.to_string(),
                Component {
                    name: component.to_string(),
                    host_instances,
                },
            );
        }
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
            security_type: SecurityType::None,
            hosts: vec![Host {
                name: "host1".to_string(),
                maintenance: Default::default(),
            }],
            services,
            desired_configs,
            host_overrides: BTreeMap::new(),
            server_host: Some("host1".to_string()),
        }
    }

    fn schs_of(cluster: &ClusterSnapshot) -> Vec<ServiceComponentHost> {
        cluster
            .service_component_hosts()
            .into_iter()
            .cloned()
            .collect()
    }

    struct TestFixture {
        cluster: ClusterSnapshot,
        details: KerberosDetails,
        order: RoleCommandOrder,
        schs: Vec<ServiceComponentHost>,
        kerberos_client_hosts: BTreeSet<String>,
    }

    impl TestFixture {
        fn new(manage_identities: Option<&str>) -> Self {
            let cluster = create_test_cluster(manage_identities);
            let details = KerberosDetails::from_cluster(&cluster, None).unwrap();
            let schs = schs_of(&cluster);
            Self {
                cluster,
                details,
                order: RoleCommandOrder::default_order(),
                schs,
                kerberos_client_hosts: BTreeSet::from(["host1".to_string()]),
            }
        }

        fn ctx(&self) -> PlanningContext<'_> {
            PlanningContext {
                cluster: &self.cluster,
                details: &self.details,
                order: &self.order,
                authenticated_user: "admin",
                server_host: "host1",
                data_directory: None,
                service_component_filter: None,
                host_filter: None,
                identity_filter: None,
                service_component_hosts: &self.schs,
                hosts_with_valid_kerberos_client: &self.kerberos_client_hosts,
                cluster_host_info: "{}",
                host_params: "{}",
            }
        }
    }

    fn stage_names(container: &StageContainer) -> Vec<&str> {
        container.stages().iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn enable_stage_sequence() {
        let fixture = TestFixture::new(None);
        let mut container = StageContainer::new(1);
        OperationHandler::EnableKerberos
            .create_stages(&fixture.ctx(), &mut container)
            .unwrap();

        assert_eq!(
            stage_names(&container),
            vec![
                "Preparing Operations",
                "Create Principals",
                "Create Keytabs",
                "Configure Server Identity",
                "Distribute Keytabs",
                "Update Configurations",
            ]
        );
        let ids: Vec<u64> = container.stages().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn enable_with_delegated_identities_skips_kdc_stages() {
        let fixture = TestFixture::new(Some("false"));
        let mut container = StageContainer::new(1);
        OperationHandler::EnableKerberos
            .create_stages(&fixture.ctx(), &mut container)
            .unwrap();

        assert_eq!(
            stage_names(&container),
            vec!["Preparing Operations", "Update Configurations"]
        );
    }

    #[test]
    fn disable_stage_sequence() {
        let fixture = TestFixture::new(None);
        let mut container = StageContainer::new(1);
        OperationHandler::DisableKerberos
            .create_stages(&fixture.ctx(), &mut container)
            .unwrap();

        assert_eq!(
            stage_names(&container),
            vec![
                "Disable Security",
                "Preparing Operations",
                "Update Configurations",
                "Destroy Principals",
                "Delete Keytabs",
                "Kerberos Cleanup",
            ]
        );
    }

    #[test]
    fn delete_keytab_stage_planned_empty_without_clients() {
        let mut fixture = TestFixture::new(None);
        fixture.kerberos_client_hosts = BTreeSet::new();
        let mut container = StageContainer::new(1);
        OperationHandler::DeletePrincipalsAndKeytabs
            .create_stages(&fixture.ctx(), &mut container)
            .unwrap();

        assert_eq!(
            stage_names(&container),
            vec!["Prepare Identities", "Destroy Principals", "Delete Keytabs"]
        );
        let delete_keytabs = container.stages().last().unwrap();
        assert!(delete_keytabs.is_empty());
    }

    #[test]
    fn stage_ids_continue_across_planner_calls() {
        let fixture = TestFixture::new(None);
        let mut container = StageContainer::new(1);
        OperationHandler::CreatePrincipalsAndKeytabs {
            regenerate_all: false,
            update_configurations: false,
            include_server_identity: false,
        }
        .create_stages(&fixture.ctx(), &mut container)
        .unwrap();
        let first_last = container.last_stage_id();

        OperationHandler::DeletePrincipalsAndKeytabs
            .create_stages(&fixture.ctx(), &mut container)
            .unwrap();

        let ids: Vec<u64> = container.stages().iter().map(|s| s.id).collect();
        let expected: Vec<u64> = (1..=container.last_stage_id()).collect();
        assert_eq!(ids, expected);
        assert!(container.last_stage_id() > first_last);
    }

    #[test]
    fn ensure_params_carry_flags() {
        let fixture = TestFixture::new(None);
        let mut container = StageContainer::new(1);
        OperationHandler::CreatePrincipalsAndKeytabs {
            regenerate_all: true,
            update_configurations: true,
            include_server_identity: true,
        }
        .create_stages(&fixture.ctx(), &mut container)
        .unwrap();

        let params: BTreeMap<String, String> =
            serde_json::from_str(&container.stages()[0].command_params).unwrap();
        assert_eq!(params[command::REGENERATE_ALL], "true");
        assert_eq!(params[command::INCLUDE_AMBARI_IDENTITY], "true");
        assert_eq!(params[command::UPDATE_CONFIGURATIONS], "true");
        assert_eq!(params[command::AUTHENTICATED_USER_NAME], "admin");
        assert_eq!(params[command::DEFAULT_REALM], "EXAMPLE.COM");
    }

    #[test]
    fn disable_should_process_skips_settled_hosts() {
        let handler = OperationHandler::DisableKerberos;

        let mut sch = ServiceComponentHost {
            service_name: "HDFS".to_string(),
            component_name: "NAMENODE".to_string(),
            hostname: "host1".to_string(),
            ..Default::default()
        };
        // Fully unsecured already: nothing to do.
        assert!(!handler.should_process(&sch));

        sch.security_state = SecurityState::SecuredKerberos;
        assert!(handler.should_process(&sch));

        sch.security_state = SecurityState::Unsecuring;
        assert!(!handler.should_process(&sch));
    }
}
