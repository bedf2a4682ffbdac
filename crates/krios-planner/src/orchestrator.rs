//! The top-level planning entry points.
//!
//! `handle` ties the pieces together: build the Kerberos details, resolve
//! the affected identities (failing fast on unresolvable configuration),
//! validate the KDC administrator credential once, let the operation handler
//! emit its stages, and only then record the security-state transitions on
//! the cluster snapshot. Either a fully planned container is returned or an
//! error is raised before any state is touched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use krios_core::{
    ClusterSnapshot, CredentialError, Directives, KerberosDescriptor, KriosError,
    MaintenanceState, RegenerateMode, SecurityType, ServiceComponentHost,
};
use krios_identity::{calculate_configurations, resolve_active_identities, KerberosDetails};
use krios_kdc::{validate_admin_credentials, CredentialStore, KdcOperationHandler};

use crate::command::KERBEROS_CLIENT_ROLE;
use crate::handler::{OperationHandler, PlanningContext, ServiceComponentFilter};
use crate::order::RoleCommandOrder;
use crate::stage::StageContainer;

/// Plans operations against a cluster snapshot.
pub struct Orchestrator {
    order: RoleCommandOrder,
    authenticated_user: String,
}

impl Orchestrator {
    pub fn new(order: RoleCommandOrder, authenticated_user: impl Into<String>) -> Self {
        Self {
            order,
            authenticated_user: authenticated_user.into(),
        }
    }

    /// Transition the cluster to the requested security type.
    ///
    /// A cluster already in the requested state is a no-op (empty container)
    /// unless the `force_toggle_kerberos` directive is set.
    #[allow(clippy::too_many_arguments)]
    pub async fn toggle_kerberos(
        &self,
        cluster: &mut ClusterSnapshot,
        descriptor: &KerberosDescriptor,
        kdc: &mut dyn KdcOperationHandler,
        credentials: &CredentialStore,
        security_type: SecurityType,
        directives: &Directives,
        force_kerberos_client_hosts: &BTreeSet<String>,
        request_id: u64,
    ) -> Result<StageContainer, KriosError> {
        if cluster.security_type == security_type && !directives.force_toggle_kerberos() {
            info!(
                cluster = %cluster.cluster_name,
                security_type = %security_type,
                "cluster is already in the requested security state; nothing to do"
            );
            return Ok(StageContainer::new(request_id));
        }

        let handler = match security_type {
            SecurityType::Kerberos => OperationHandler::EnableKerberos,
            SecurityType::None => OperationHandler::DisableKerberos,
        };

        let container = self
            .handle(
                cluster,
                descriptor,
                kdc,
                credentials,
                handler,
                None,
                None,
                None,
                directives,
                force_kerberos_client_hosts,
                request_id,
            )
            .await?;

        cluster.security_type = security_type;
        Ok(container)
    }

    /// Plan creation and distribution of principals and keytabs for the
    /// identities selected by the filters.
    #[allow(clippy::too_many_arguments)]
    pub async fn ensure_identities(
        &self,
        cluster: &mut ClusterSnapshot,
        descriptor: &KerberosDescriptor,
        kdc: &mut dyn KdcOperationHandler,
        credentials: &CredentialStore,
        service_component_filter: Option<&ServiceComponentFilter>,
        host_filter: Option<&BTreeSet<String>>,
        identity_filter: Option<&BTreeSet<String>>,
        update_configurations: bool,
        include_server_identity: bool,
        directives: &Directives,
        force_kerberos_client_hosts: &BTreeSet<String>,
        request_id: u64,
    ) -> Result<StageContainer, KriosError> {
        let handler = OperationHandler::CreatePrincipalsAndKeytabs {
            regenerate_all: directives.regenerate_keytabs() == RegenerateMode::All,
            update_configurations,
            include_server_identity,
        };
        self.handle(
            cluster,
            descriptor,
            kdc,
            credentials,
            handler,
            service_component_filter,
            host_filter,
            identity_filter,
            directives,
            force_kerberos_client_hosts,
            request_id,
        )
        .await
    }

    /// Plan destruction of the principals and keytabs selected by the
    /// filters.
    #[allow(clippy::too_many_arguments)]
    pub async fn delete_identities(
        &self,
        cluster: &mut ClusterSnapshot,
        descriptor: &KerberosDescriptor,
        kdc: &mut dyn KdcOperationHandler,
        credentials: &CredentialStore,
        service_component_filter: Option<&ServiceComponentFilter>,
        host_filter: Option<&BTreeSet<String>>,
        identity_filter: Option<&BTreeSet<String>>,
        directives: &Directives,
        request_id: u64,
    ) -> Result<StageContainer, KriosError> {
        self.handle(
            cluster,
            descriptor,
            kdc,
            credentials,
            OperationHandler::DeletePrincipalsAndKeytabs,
            service_component_filter,
            host_filter,
            identity_filter,
            directives,
            &BTreeSet::new(),
            request_id,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle(
        &self,
        cluster: &mut ClusterSnapshot,
        descriptor: &KerberosDescriptor,
        kdc: &mut dyn KdcOperationHandler,
        credentials: &CredentialStore,
        handler: OperationHandler,
        service_component_filter: Option<&ServiceComponentFilter>,
        host_filter: Option<&BTreeSet<String>>,
        identity_filter: Option<&BTreeSet<String>>,
        directives: &Directives,
        force_kerberos_client_hosts: &BTreeSet<String>,
        request_id: u64,
    ) -> Result<StageContainer, KriosError> {
        let operation_id = Uuid::new_v4();
        let details =
            KerberosDetails::from_cluster(cluster, directives.manage_kerberos_identities())?;
        info!(
            %operation_id,
            cluster = %cluster.cluster_name,
            realm = %details.default_realm(),
            handler = ?handler,
            "planning Kerberos operation"
        );

        // Resolving up front both scopes the operation and fails fast on
        // unresolvable identity configuration, before any stage exists.
        let active = resolve_active_identities(
            cluster,
            descriptor,
            host_filter,
            service_filter_of(service_component_filter).as_ref(),
            None,
            true,
        )?;
        info!(
            %operation_id,
            hosts = active.len(),
            identities = active.values().map(Vec::len).sum::<usize>(),
            "resolved active identities"
        );

        let service_component_hosts = scope_service_component_hosts(
            cluster,
            &handler,
            service_component_filter,
            host_filter,
        );

        let mut hosts_with_valid_kerberos_client =
            cluster.hosts_with_installed_component(KERBEROS_CLIENT_ROLE);
        hosts_with_valid_kerberos_client.extend(force_kerberos_client_hosts.iter().cloned());

        let mut data_directory: Option<PathBuf> = None;
        let mut pending_directory = None;
        if details.manage_identities() {
            let credential = credentials
                .get_kdc_credential(&cluster.cluster_name)
                .ok_or_else(|| KriosError::Credential(CredentialError::missing_credential()))?;
            validate_admin_credentials(
                kdc,
                &credential,
                details.default_realm(),
                details.kerberos_env(),
            )
            .await?;

            // The directory is dropped (deleted) if planning fails below.
            let directory = tempfile::Builder::new()
                .prefix("krios-data-")
                .tempdir()?;
            data_directory = Some(directory.path().to_path_buf());
            pending_directory = Some(directory);
        }

        let server_host = cluster
            .server_host
            .clone()
            .unwrap_or_else(|| "localhost".to_string());
        let cluster_host_info = calculate_configurations(cluster, None)
            .remove(krios_identity::calculator::CLUSTER_HOST_INFO)
            .map(|info| serde_json::to_string(&info))
            .transpose()?
            .unwrap_or_else(|| "{}".to_string());
        let host_params = serde_json::to_string(&BTreeMap::from([(
            "cluster_name",
            cluster.cluster_name.as_str(),
        )]))?;

        let mut container = StageContainer::new(request_id);
        let ctx = PlanningContext {
            cluster,
            details: &details,
            order: &self.order,
            authenticated_user: &self.authenticated_user,
            server_host: &server_host,
            data_directory: data_directory.as_deref(),
            service_component_filter,
            host_filter,
            identity_filter,
            service_component_hosts: &service_component_hosts,
            hosts_with_valid_kerberos_client: &hosts_with_valid_kerberos_client,
            cluster_host_info: &cluster_host_info,
            host_params: &host_params,
        };
        let last_stage_id = handler.create_stages(&ctx, &mut container)?;

        // Planning succeeded: the data directory now belongs to the
        // operation (the cleanup stage deletes it after execution).
        if let Some(directory) = pending_directory {
            let _ = directory.keep();
        }

        apply_security_states(cluster, &handler, &service_component_hosts);

        info!(
            %operation_id,
            stages = container.len(),
            last_stage_id,
            "planned Kerberos operation"
        );
        Ok(container)
    }
}

/// Reduce a service/component filter to the plain service-name filter the
/// identity resolver understands.
fn service_filter_of(
    filter: Option<&ServiceComponentFilter>,
) -> Option<BTreeSet<String>> {
    filter.map(|f| f.keys().cloned().collect())
}

/// Collect the service-component-hosts an operation touches, applying the
/// tri-state filters, maintenance suppression, and the handler's own
/// `should_process` predicate.
fn scope_service_component_hosts(
    cluster: &ClusterSnapshot,
    handler: &OperationHandler,
    service_component_filter: Option<&ServiceComponentFilter>,
    host_filter: Option<&BTreeSet<String>>,
) -> Vec<ServiceComponentHost> {
    let mut scoped = Vec::new();

    for service in cluster.services.values() {
        if service.maintenance == MaintenanceState::On {
            warn!(service = %service.name, "service in maintenance; suppressing its hosts");
            continue;
        }
        let component_filter = match service_component_filter {
            None => None,
            Some(filter) => match filter.get(&service.name) {
                // Service not named by a populated filter: excluded.
                None => continue,
                Some(components) => components.as_ref(),
            },
        };

        for component in service.components.values() {
            if let Some(allowed) = component_filter {
                if !allowed.contains(&component.name) {
                    continue;
                }
            }
            for sch in component.host_instances.values() {
                if let Some(hosts) = host_filter {
                    if !hosts.contains(&sch.hostname) {
                        continue;
                    }
                }
                if let Some(host) = cluster.host(&sch.hostname) {
                    if host.maintenance == MaintenanceState::On {
                        warn!(hostname = %sch.hostname, "host in maintenance; suppressed");
                        continue;
                    }
                }
                if handler.should_process(sch) {
                    scoped.push(sch.clone());
                }
            }
        }
    }

    scoped
}

/// Record the handler's target security states on the processed entities.
/// Called only after the full stage sequence was assembled, so a failed
/// planning pass leaves the snapshot untouched.
fn apply_security_states(
    cluster: &mut ClusterSnapshot,
    handler: &OperationHandler,
    processed: &[ServiceComponentHost],
) {
    let new_desired = handler.new_desired_sch_security_state();
    let new_current = handler.new_sch_security_state();
    let new_service = handler.new_service_security_state();
    if new_desired.is_none() && new_current.is_none() && new_service.is_none() {
        return;
    }

    let keys: BTreeSet<(String, String, String)> = processed
        .iter()
        .map(|sch| {
            (
                sch.service_name.clone(),
                sch.component_name.clone(),
                sch.hostname.clone(),
            )
        })
        .collect();
    let services: BTreeSet<String> = processed.iter().map(|s| s.service_name.clone()).collect();

    cluster.for_each_sch_mut(|sch| {
        let key = (
            sch.service_name.clone(),
            sch.component_name.clone(),
            sch.hostname.clone(),
        );
        if keys.contains(&key) {
            if let Some(state) = new_desired {
                sch.desired_security_state = state;
            }
            if let Some(state) = new_current {
                sch.security_state = state;
            }
        }
    });

    if let Some(state) = new_service {
        for name in services {
            if let Some(service) = cluster.services.get_mut(&name) {
                service.desired_security_state = state;
                service.security_state = state;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krios_core::{Component, Host, SchState, SecurityState, Service};
    use krios_kdc::{InMemoryKdc, PrincipalKeyCredential};

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
        let mut hadoop_env = BTreeMap::new();
        hadoop_env.insert("hdfs_user".to_string(), "hdfs".to_string());
        desired_configs.insert("hadoop-env".to_string(), hadoop_env);

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

    fn create_test_descriptor() -> KerberosDescriptor {
        KerberosDescriptor::from_yaml(
            r#"
properties:
  keytab_dir: "/etc/security/keytabs"
services:
  HDFS:
    name: HDFS
    identities:
      - name: hdfs
        principal:
          value: "${hadoop-env/hdfs_user}@${realm}"
          type: user
        keytab:
          file: "${keytab_dir}/hdfs.headless.keytab"
"#,
        )
        .unwrap()
    }

    fn credentials_with_admin() -> CredentialStore {
        let credentials = CredentialStore::new();
        credentials.set_kdc_credential(
            "c1",
            PrincipalKeyCredential::new("admin/admin@EXAMPLE.COM", "secret"),
        );
        credentials
    }

    #[tokio::test]
    async fn enable_kerberos_plans_expected_sequence() {
        let mut cluster = create_test_cluster(None);
        let descriptor = create_test_descriptor();
        let mut kdc = InMemoryKdc::new();
        let credentials = credentials_with_admin();
        let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), "admin");

        let container = orchestrator
            .toggle_kerberos(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                SecurityType::Kerberos,
                &Directives::default(),
                &BTreeSet::new(),
                1,
            )
            .await
            .unwrap();

        let names: Vec<&str> = container.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Preparing Operations",
                "Create Principals",
                "Create Keytabs",
                "Configure Server Identity",
                "Distribute Keytabs",
                "Update Configurations",
            ]
        );
        assert_eq!(cluster.security_type, SecurityType::Kerberos);
        // Transitional states recorded on the processed SCHs.
        for sch in cluster.service_component_hosts() {
            assert_eq!(sch.desired_security_state, SecurityState::SecuredKerberos);
            assert_eq!(sch.security_state, SecurityState::Securing);
        }
    }

    #[tokio::test]
    async fn delegated_identities_skip_kdc_stages_and_credentials() {
        let mut cluster = create_test_cluster(Some("false"));
        let descriptor = create_test_descriptor();
        let mut kdc = InMemoryKdc::new();
        // No credential in the store: must not be needed.
        let credentials = CredentialStore::new();
        let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), "admin");

        let container = orchestrator
            .toggle_kerberos(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                SecurityType::Kerberos,
                &Directives::default(),
                &BTreeSet::new(),
                1,
            )
            .await
            .unwrap();

        let names: Vec<&str> = container.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Preparing Operations", "Update Configurations"]);
    }

    #[tokio::test]
    async fn missing_credential_aborts_before_any_stage() {
        let mut cluster = create_test_cluster(None);
        let descriptor = create_test_descriptor();
        let mut kdc = InMemoryKdc::new();
        let credentials = CredentialStore::new();
        let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), "admin");

        let err = orchestrator
            .toggle_kerberos(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                SecurityType::Kerberos,
                &Directives::default(),
                &BTreeSet::new(),
                1,
            )
            .await
            .unwrap_err();

        match err {
            KriosError::Credential(c) => assert_eq!(
                c.kind,
                krios_core::CredentialErrorKind::MissingCredential
            ),
            other => panic!("unexpected error: {:?}", other),
        }
        // All-or-nothing: no state transition happened.
        assert_eq!(cluster.security_type, SecurityType::None);
        for sch in cluster.service_component_hosts() {
            assert_eq!(sch.security_state, SecurityState::Unsecured);
        }
    }

    #[tokio::test]
    async fn toggle_short_circuits_unless_forced() {
        let mut cluster = create_test_cluster(None);
        let descriptor = create_test_descriptor();
        let mut kdc = InMemoryKdc::new();
        let credentials = credentials_with_admin();
        let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), "admin");

        // Already NONE; disabling again plans nothing.
        let container = orchestrator
            .toggle_kerberos(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                SecurityType::None,
                &Directives::default(),
                &BTreeSet::new(),
                1,
            )
            .await
            .unwrap();
        assert!(container.is_empty());

        // Forced: the disable sequence is planned anyway.
        let directives = Directives::new(BTreeMap::from([(
            krios_core::directives::FORCE_TOGGLE_KERBEROS.to_string(),
            "true".to_string(),
        )]));
        // Give the SCHs a secured state so the disable handler processes them.
        cluster.for_each_sch_mut(|sch| sch.security_state = SecurityState::SecuredKerberos);
        let container = orchestrator
            .toggle_kerberos(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                SecurityType::None,
                &directives,
                &BTreeSet::new(),
                2,
            )
            .await
            .unwrap();
        assert!(!container.is_empty());
    }

    #[tokio::test]
    async fn ensure_identities_with_filters() {
        let mut cluster = create_test_cluster(None);
        let descriptor = create_test_descriptor();
        let mut kdc = InMemoryKdc::new();
        let credentials = credentials_with_admin();
        let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), "admin");

        let filter: ServiceComponentFilter =
            BTreeMap::from([("HDFS".to_string(), None)]);
        let hosts = BTreeSet::from(["host1".to_string()]);

        let container = orchestrator
            .ensure_identities(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                Some(&filter),
                Some(&hosts),
                None,
                false,
                false,
                &Directives::default(),
                &BTreeSet::new(),
                9,
            )
            .await
            .unwrap();

        assert_eq!(container.request_id(), 9);
        let first_params: BTreeMap<String, String> =
            serde_json::from_str(&container.stages()[0].command_params).unwrap();
        assert!(first_params.contains_key(crate::command::SERVICE_COMPONENT_FILTER));
        assert!(first_params.contains_key(crate::command::HOST_FILTER));
        assert!(!first_params.contains_key(crate::command::IDENTITY_FILTER));
        assert_eq!(first_params[crate::command::REGENERATE_ALL], "false");
    }

    #[tokio::test]
    async fn maintenance_hosts_are_suppressed_not_fatal() {
        let mut cluster = create_test_cluster(None);
        cluster.hosts[0].maintenance = MaintenanceState::On;
        let descriptor = create_test_descriptor();
        let mut kdc = InMemoryKdc::new();
        let credentials = credentials_with_admin();
        let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), "admin");

        let container = orchestrator
            .toggle_kerberos(
                &mut cluster,
                &descriptor,
                &mut kdc,
                &credentials,
                SecurityType::Kerberos,
                &Directives::default(),
                &BTreeSet::new(),
                1,
            )
            .await
            .unwrap();

        // The operation proceeds; the distribute stage simply has no tasks.
        let distribute = container
            .stages()
            .iter()
            .find(|s| s.name == "Distribute Keytabs")
            .unwrap();
        assert!(distribute.is_empty());
    }
}
