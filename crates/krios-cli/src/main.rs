use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use krios_core::{ClusterSnapshot, Directives, KerberosDescriptor, SecurityType};
use krios_identity::{resolve_active_identities, AuthToLocalBuilder};
use krios_kdc::{CredentialStore, InMemoryKdc, MitKdcHandler, PrincipalKeyCredential};
use krios_planner::{Orchestrator, RoleCommandOrder, StageContainer};

#[derive(Parser, Debug)]
#[command(name = "krios", version, about = "Krios cluster security orchestrator CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a security operation against a cluster snapshot
    Plan {
        #[command(subcommand)]
        cmd: PlanCommand,
    },

    /// Render auth-to-local rules for a set of principal mappings
    AuthToLocal {
        /// Default realm, e.g. EXAMPLE.COM
        #[arg(long)]
        realm: String,

        /// Mapping in the form PRINCIPAL=LOCAL, repeatable
        #[arg(long = "map", value_name = "PRINCIPAL=LOCAL")]
        mappings: Vec<String>,
    },

    /// Resolve the active identities for a cluster snapshot
    ResolveIdentities {
        #[command(flatten)]
        inputs: SnapshotInputs,

        /// Restrict to one host
        #[arg(long)]
        host: Option<String>,

        /// Keep literal _HOST placeholders instead of substituting hostnames
        #[arg(long, default_value_t = false)]
        keep_host_placeholder: bool,
    },
}

#[derive(clap::Args, Debug)]
struct SnapshotInputs {
    /// Cluster snapshot file (YAML)
    #[arg(long)]
    cluster: PathBuf,

    /// Kerberos descriptor file (YAML)
    #[arg(long)]
    descriptor: PathBuf,
}

#[derive(clap::Args, Debug)]
struct KdcOptions {
    /// KDC administrator principal. When set (with a password) the real
    /// kadmin-backed handler is used; otherwise planning runs against an
    /// in-memory KDC.
    #[arg(long, env = "KRIOS_KDC_ADMIN_PRINCIPAL")]
    admin_principal: Option<String>,

    /// KDC administrator password
    #[arg(long, env = "KRIOS_KDC_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    /// Plan an enable/disable Kerberos operation
    Toggle {
        #[command(flatten)]
        inputs: SnapshotInputs,

        /// Target security type: kerberos or none
        #[arg(long)]
        security_type: String,

        /// Plan even when the cluster is already in the requested state
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Delegate identity management to an external administrator
        #[arg(long, default_value_t = false)]
        delegate_identities: bool,

        #[command(flatten)]
        kdc: KdcOptions,
    },

    /// Plan creation/distribution of principals and keytabs
    EnsureIdentities {
        #[command(flatten)]
        inputs: SnapshotInputs,

        /// Regenerate mode: all or missing
        #[arg(long)]
        regenerate: Option<String>,

        /// Also plan a configuration update stage
        #[arg(long, default_value_t = false)]
        update_configurations: bool,

        /// Include the management server's own identity
        #[arg(long, default_value_t = false)]
        include_server_identity: bool,

        /// Restrict to these services, repeatable
        #[arg(long = "service")]
        services: Vec<String>,

        /// Restrict to these hosts, repeatable
        #[arg(long = "target-host")]
        hosts: Vec<String>,

        #[command(flatten)]
        kdc: KdcOptions,
    },

    /// Plan destruction of principals and keytabs
    DeleteIdentities {
        #[command(flatten)]
        inputs: SnapshotInputs,

        #[arg(long = "service")]
        services: Vec<String>,

        #[arg(long = "target-host")]
        hosts: Vec<String>,

        #[command(flatten)]
        kdc: KdcOptions,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Plan { cmd } => run_plan(cmd).await?,
        Command::AuthToLocal { realm, mappings } => run_auth_to_local(&realm, &mappings)?,
        Command::ResolveIdentities {
            inputs,
            host,
            keep_host_placeholder,
        } => run_resolve_identities(&inputs, host.as_deref(), !keep_host_placeholder)?,
    }

    Ok(())
}

fn load_cluster(path: &Path) -> anyhow::Result<ClusterSnapshot> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    let cluster: ClusterSnapshot = serde_yaml::from_str(&content)?;
    tracing::info!(
        cluster = %cluster.cluster_name,
        hosts = cluster.hosts.len(),
        services = cluster.services.len(),
        "loaded cluster snapshot"
    );
    Ok(cluster)
}

fn load_descriptor(path: &Path) -> anyhow::Result<KerberosDescriptor> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    Ok(KerberosDescriptor::from_yaml(&content)?)
}

fn parse_security_type(value: &str) -> anyhow::Result<SecurityType> {
    match value.to_lowercase().as_str() {
        "kerberos" => Ok(SecurityType::Kerberos),
        "none" => Ok(SecurityType::None),
        other => Err(anyhow::anyhow!(
            "invalid security type '{}'; expected 'kerberos' or 'none'",
            other
        )),
    }
}

/// Install the admin credential (when provided) and pick the KDC handler:
/// kadmin-backed with a credential, in-memory otherwise.
fn setup_kdc(
    options: &KdcOptions,
    cluster_name: &str,
    credentials: &CredentialStore,
) -> Box<dyn krios_kdc::KdcOperationHandler> {
    match (&options.admin_principal, &options.admin_password) {
        (Some(principal), Some(password)) => {
            credentials.set_kdc_credential(
                cluster_name,
                PrincipalKeyCredential::new(principal.clone(), password.clone()),
            );
            Box::new(MitKdcHandler::new())
        }
        _ => {
            // Dry-run planning: accept any credential.
            credentials.set_kdc_credential(
                cluster_name,
                PrincipalKeyCredential::new("admin/admin", "unused"),
            );
            Box::new(InMemoryKdc::new())
        }
    }
}

fn print_container(container: &StageContainer) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(container)?);
    Ok(())
}

fn service_filter_of(
    services: &[String],
) -> Option<BTreeMap<String, Option<BTreeSet<String>>>> {
    if services.is_empty() {
        return None;
    }
    Some(
        services
            .iter()
            .map(|name| (name.clone(), None))
            .collect(),
    )
}

fn host_filter_of(hosts: &[String]) -> Option<BTreeSet<String>> {
    if hosts.is_empty() {
        None
    } else {
        Some(hosts.iter().cloned().collect())
    }
}

async fn run_plan(cmd: PlanCommand) -> anyhow::Result<()> {
    match cmd {
        PlanCommand::Toggle {
            inputs,
            security_type,
            force,
            delegate_identities,
            kdc,
        } => {
            let mut cluster = load_cluster(&inputs.cluster)?;
            let descriptor = load_descriptor(&inputs.descriptor)?;
            let security_type = parse_security_type(&security_type)?;

            let mut raw = BTreeMap::new();
            if force {
                raw.insert(
                    krios_core::directives::FORCE_TOGGLE_KERBEROS.to_string(),
                    "true".to_string(),
                );
            }
            if delegate_identities {
                raw.insert(
                    krios_core::directives::MANAGE_KERBEROS_IDENTITIES.to_string(),
                    "false".to_string(),
                );
            }
            let directives = Directives::new(raw);

            let credentials = CredentialStore::new();
            let mut handler = setup_kdc(&kdc, &cluster.cluster_name, &credentials);
            let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), whoami());

            let container = orchestrator
                .toggle_kerberos(
                    &mut cluster,
                    &descriptor,
                    &mut *handler,
                    &credentials,
                    security_type,
                    &directives,
                    &BTreeSet::new(),
                    1,
                )
                .await?;
            print_container(&container)
        }

        PlanCommand::EnsureIdentities {
            inputs,
            regenerate,
            update_configurations,
            include_server_identity,
            services,
            hosts,
            kdc,
        } => {
            let mut cluster = load_cluster(&inputs.cluster)?;
            let descriptor = load_descriptor(&inputs.descriptor)?;

            let mut raw = BTreeMap::new();
            if let Some(mode) = regenerate {
                raw.insert(
                    krios_core::directives::REGENERATE_KEYTABS.to_string(),
                    mode,
                );
            }
            let directives = Directives::new(raw);

            let credentials = CredentialStore::new();
            let mut handler = setup_kdc(&kdc, &cluster.cluster_name, &credentials);
            let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), whoami());

            let service_filter = service_filter_of(&services);
            let host_filter = host_filter_of(&hosts);
            let container = orchestrator
                .ensure_identities(
                    &mut cluster,
                    &descriptor,
                    &mut *handler,
                    &credentials,
                    service_filter.as_ref(),
                    host_filter.as_ref(),
                    None,
                    update_configurations,
                    include_server_identity,
                    &directives,
                    &BTreeSet::new(),
                    1,
                )
                .await?;
            print_container(&container)
        }

        PlanCommand::DeleteIdentities {
            inputs,
            services,
            hosts,
            kdc,
        } => {
            let mut cluster = load_cluster(&inputs.cluster)?;
            let descriptor = load_descriptor(&inputs.descriptor)?;

            let credentials = CredentialStore::new();
            let mut handler = setup_kdc(&kdc, &cluster.cluster_name, &credentials);
            let orchestrator = Orchestrator::new(RoleCommandOrder::default_order(), whoami());

            let service_filter = service_filter_of(&services);
            let host_filter = host_filter_of(&hosts);
            let container = orchestrator
                .delete_identities(
                    &mut cluster,
                    &descriptor,
                    &mut *handler,
                    &credentials,
                    service_filter.as_ref(),
                    host_filter.as_ref(),
                    None,
                    &Directives::default(),
                    1,
                )
                .await?;
            print_container(&container)
        }
    }
}

fn run_auth_to_local(realm: &str, mappings: &[String]) -> anyhow::Result<()> {
    let mut builder = AuthToLocalBuilder::new();
    for mapping in mappings {
        let (principal, local) = mapping.split_once('=').ok_or_else(|| {
            anyhow::anyhow!("invalid --map '{}'; expected PRINCIPAL=LOCAL", mapping)
        })?;
        builder.add_rule(principal, local)?;
    }
    println!("{}", builder.generate(realm));
    Ok(())
}

fn run_resolve_identities(
    inputs: &SnapshotInputs,
    host: Option<&str>,
    replace_host_placeholder: bool,
) -> anyhow::Result<()> {
    let cluster = load_cluster(&inputs.cluster)?;
    let descriptor = load_descriptor(&inputs.descriptor)?;

    let host_filter = host.map(|h| BTreeSet::from([h.to_string()]));
    let active = resolve_active_identities(
        &cluster,
        &descriptor,
        host_filter.as_ref(),
        None,
        None,
        replace_host_placeholder,
    )?;

    for (hostname, identities) in &active {
        println!("{}:", hostname);
        for identity in identities {
            match &identity.keytab {
                Some(keytab) => println!("  {} -> {}", identity.principal, keytab.path),
                None => println!("  {}", identity.principal),
            }
        }
    }
    Ok(())
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "krios".to_string())
}
