//! Stages and the stage container.
//!
//! A stage is a unit of work scoped to one cluster/request: topology and
//! parameter JSON plus a host → role → task map. Two task kinds exist:
//! server actions run in-process on the management server, agent executions
//! run on a remote host through a fully assembled execution command.

use krios_core::KriosError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::command::ExecutionCommand;
use crate::order::RoleCommand;

/// Role under which in-process server actions are recorded in a stage.
pub const SERVER_ACTION_ROLE: &str = "SERVER_ACTION";

/// Role command used for server-action tasks.
pub const EXECUTE_COMMAND: &str = "EXECUTE";

/// One task inside a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Executes in-process, identified by a server action name.
    ServerAction { action: String },
    /// Executes on a remote host via the external agent.
    AgentExecution { command: ExecutionCommand },
}

impl Task {
    /// The (role, command) pair this task contributes to the ordering graph.
    pub fn role_command(&self, role: &str) -> RoleCommand {
        match self {
            Task::ServerAction { .. } => RoleCommand::new(role, EXECUTE_COMMAND),
            Task::AgentExecution { command } => RoleCommand::new(role, &command.role_command),
        }
    }
}

/// A unit of orchestrated work: an ordered batch of per-host tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique, monotonically assigned within a request.
    pub id: u64,
    pub name: String,
    /// JSON-encoded cluster/host topology info.
    pub cluster_host_info: String,
    /// JSON-encoded command parameters.
    pub command_params: String,
    /// JSON-encoded host parameters.
    pub host_params: String,
    tasks: BTreeMap<String, BTreeMap<String, Task>>,
}

impl Stage {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        cluster_host_info: impl Into<String>,
        command_params: impl Into<String>,
        host_params: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            cluster_host_info: cluster_host_info.into(),
            command_params: command_params.into(),
            host_params: host_params.into(),
            tasks: BTreeMap::new(),
        }
    }

    /// Record a task for (host, role). Host-role pairs are unique within a
    /// stage; adding a duplicate overwrites rather than duplicates.
    pub fn add_task(&mut self, hostname: impl Into<String>, role: impl Into<String>, task: Task) {
        self.tasks
            .entry(hostname.into())
            .or_default()
            .insert(role.into(), task);
    }

    pub fn tasks(&self) -> &BTreeMap<String, BTreeMap<String, Task>> {
        &self.tasks
    }

    pub fn task_count(&self) -> usize {
        self.tasks.values().map(|roles| roles.len()).sum()
    }

    /// A stage may legitimately carry zero tasks; it still exists for
    /// ordering purposes.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The distinct (role, command) pairs present in this stage.
    pub fn role_command_pairs(&self) -> Vec<RoleCommand> {
        let mut pairs: Vec<RoleCommand> = Vec::new();
        for roles in self.tasks.values() {
            for (role, task) in roles {
                let pair = task.role_command(role);
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        pairs.sort();
        pairs
    }

    /// A copy of this stage's metadata with a new id and no tasks; used when
    /// the ordering graph splits a stage.
    pub fn split(&self, id: u64) -> Stage {
        Stage::new(
            id,
            self.name.clone(),
            self.cluster_host_info.clone(),
            self.command_params.clone(),
            self.host_params.clone(),
        )
    }
}

/// Ordered, append-only sequence of stages for one request.
///
/// Planners read `last_stage_id` before adding, so multiple planner calls
/// against the same container never collide. The container becomes the
/// caller's unit of submission; it is not mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageContainer {
    request_id: u64,
    stages: Vec<Stage>,
}

impl StageContainer {
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            stages: Vec::new(),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The highest stage id in the container, 0 when empty. New stages are
    /// numbered from `last_stage_id() + 1`.
    pub fn last_stage_id(&self) -> u64 {
        self.stages.last().map(|s| s.id).unwrap_or(0)
    }

    pub fn add_stage(&mut self, stage: Stage) -> Result<(), KriosError> {
        if stage.id <= self.last_stage_id() {
            return Err(KriosError::validation(format!(
                "stage id {} is not greater than the container's last stage id {}",
                stage.id,
                self.last_stage_id()
            )));
        }
        self.stages.push(stage);
        Ok(())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
