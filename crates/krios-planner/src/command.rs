//! Execution command assembly.
//!
//! The execution command is the leaf artifact of planning: the per-host
//! payload (script, timeout, configuration snapshot, parameters) handed to
//! the external agent. The command parameter keys below are a wire contract
//! consumed downstream; do not rename them.

use krios_core::ClusterSnapshot;
use krios_identity::calculate_configurations;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const AUTHENTICATED_USER_NAME: &str = "authenticated_user_name";
pub const DEFAULT_REALM: &str = "default_realm";
pub const KDC_TYPE: &str = "kdc_type";
pub const DATA_DIRECTORY: &str = "data_directory";
pub const SERVICE_COMPONENT_FILTER: &str = "service_component_filter";
pub const HOST_FILTER: &str = "host_filter";
pub const IDENTITY_FILTER: &str = "identity_filter";
pub const REGENERATE_ALL: &str = "regenerate_all";
pub const INCLUDE_AMBARI_IDENTITY: &str = "include_ambari_identity";
pub const UPDATE_CONFIGURATIONS: &str = "update_configurations";
pub const UPDATE_CONFIGURATION_NOTE: &str = "update_configuration_note";

/// Names of the in-process server actions the planner schedules.
pub mod server_actions {
    pub const PREPARE_ENABLE_KERBEROS_OPERATIONS: &str = "PrepareEnableKerberosOperations";
    pub const PREPARE_DISABLE_KERBEROS_OPERATIONS: &str = "PrepareDisableKerberosOperations";
    pub const PREPARE_KERBEROS_IDENTITIES: &str = "PrepareKerberosIdentities";
    pub const CREATE_PRINCIPALS: &str = "CreatePrincipals";
    pub const CREATE_KEYTAB_FILES: &str = "CreateKeytabFiles";
    pub const CONFIGURE_SERVER_IDENTITY: &str = "ConfigureServerIdentity";
    pub const UPDATE_KERBEROS_CONFIGURATIONS: &str = "UpdateKerberosConfigurations";
    pub const DESTROY_PRINCIPALS: &str = "DestroyPrincipals";
    pub const CLEANUP_KERBEROS_DATA: &str = "CleanupKerberosData";
}

/// The Kerberos client component: keytab distribution and removal target
/// hosts carrying an installed instance of this role.
pub const KERBEROS_CLIENT_ROLE: &str = "KERBEROS_CLIENT";
pub const KERBEROS_CLIENT_SCRIPT: &str = "scripts/kerberos_client.py";
pub const SET_KEYTAB_COMMAND: &str = "SET_KEYTAB";
pub const REMOVE_KEYTAB_COMMAND: &str = "REMOVE_KEYTAB";

/// Role parameter naming the custom command an agent script dispatches on.
pub const CUSTOM_COMMAND_PARAM: &str = "custom_command";
pub const CUSTOM_COMMAND: &str = "CUSTOM_COMMAND";

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 900;

/// The per-host executable command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCommand {
    pub cluster_name: String,
    pub hostname: String,
    pub service_name: String,
    pub role: String,
    pub role_command: String,
    pub script: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub command_params: BTreeMap<String, String>,
    #[serde(default)]
    pub role_params: BTreeMap<String, String>,
    /// Configuration snapshot calculated for the target host.
    #[serde(default)]
    pub configurations: BTreeMap<String, BTreeMap<String, String>>,
}

/// Assemble an agent execution command, including the host-scoped
/// configuration snapshot.
#[allow(clippy::too_many_arguments)]
pub fn build_agent_command(
    cluster: &ClusterSnapshot,
    hostname: &str,
    service_name: &str,
    role: &str,
    role_command: &str,
    script: &str,
    timeout_secs: u64,
    command_params: BTreeMap<String, String>,
    role_params: BTreeMap<String, String>,
) -> ExecutionCommand {
    ExecutionCommand {
        cluster_name: cluster.cluster_name.clone(),
        hostname: hostname.to_string(),
        service_name: service_name.to_string(),
        role: role.to_string(),
        role_command: role_command.to_string(),
        script: script.to_string(),
        timeout_secs,
        command_params,
        role_params,
        configurations: calculate_configurations(cluster, Some(hostname)),
    }
}
