//! Role-command ordering.
//!
//! A flat stage may mix tasks whose (role, command) pairs carry global
//! ordering constraints (NAMENODE must start before DATANODE starts). The
//! order graph collects the pairs present in a stage, applies the injected
//! precedence table, and linearizes the tasks into one or more sequential
//! stages. The table is explicit and immutable so tests can substitute a
//! minimal ordering.

use krios_core::KriosError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::stage::Stage;

/// A (role, command) pair: one node in the ordering graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleCommand {
    pub role: String,
    pub command: String,
}

impl RoleCommand {
    pub fn new(role: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            command: command.into(),
        }
    }
}

/// Immutable precedence table: each key depends on (must run after) every
/// pair in its value set.
#[derive(Debug, Clone, Default)]
pub struct RoleCommandOrder {
    dependencies: BTreeMap<RoleCommand, BTreeSet<RoleCommand>>,
}

impl RoleCommandOrder {
    pub fn new(dependencies: BTreeMap<RoleCommand, BTreeSet<RoleCommand>>) -> Self {
        Self { dependencies }
    }

    /// The built-in ordering table for the roles this planner emits.
    pub fn default_order() -> Self {
        let mut dependencies: BTreeMap<RoleCommand, BTreeSet<RoleCommand>> = BTreeMap::new();
        let mut add = |dependent: RoleCommand, blocker: RoleCommand| {
            dependencies.entry(dependent).or_default().insert(blocker);
        };

        add(
            RoleCommand::new("DATANODE", "START"),
            RoleCommand::new("NAMENODE", "START"),
        );
        add(
            RoleCommand::new("NAMENODE", "START"),
            RoleCommand::new("ZOOKEEPER_SERVER", "START"),
        );
        add(
            RoleCommand::new("ZOOKEEPER_SERVER", "STOP"),
            RoleCommand::new("NAMENODE", "STOP"),
        );
        add(
            RoleCommand::new("ZOOKEEPER_SERVER", "STOP"),
            RoleCommand::new("DATANODE", "STOP"),
        );

        Self { dependencies }
    }

    /// Blockers of `pair` that are present in `present`.
    fn present_blockers(
        &self,
        pair: &RoleCommand,
        present: &BTreeSet<RoleCommand>,
    ) -> BTreeSet<RoleCommand> {
        self.dependencies
            .get(pair)
            .map(|blockers| blockers.intersection(present).cloned().collect())
            .unwrap_or_default()
    }

    /// Linearize a stage into dependency-respecting stages numbered from
    /// `first_id`. A stage whose pairs carry no unsatisfied edges passes
    /// through as a single stage. A dependency cycle is a fatal
    /// configuration error, never a silently dropped edge.
    pub fn order_stage(&self, stage: Stage, first_id: u64) -> Result<Vec<Stage>, KriosError> {
        let present: BTreeSet<RoleCommand> = stage.role_command_pairs().into_iter().collect();

        // Layered topological sort (Kahn): each layer holds the pairs whose
        // blockers have all been placed in earlier layers.
        let mut remaining = present.clone();
        let mut placed: BTreeSet<RoleCommand> = BTreeSet::new();
        let mut layers: Vec<BTreeSet<RoleCommand>> = Vec::new();

        while !remaining.is_empty() {
            let ready: BTreeSet<RoleCommand> = remaining
                .iter()
                .filter(|pair| {
                    self.present_blockers(pair, &present)
                        .iter()
                        .all(|blocker| placed.contains(blocker))
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                let cycle: Vec<String> = remaining
                    .iter()
                    .map(|p| format!("{}-{}", p.role, p.command))
                    .collect();
                return Err(KriosError::invalid_configuration(format!(
                    "a cycle was detected in the role command order involving: {}",
                    cycle.join(", ")
                )));
            }

            for pair in &ready {
                remaining.remove(pair);
                placed.insert(pair.clone());
            }
            layers.push(ready);
        }

        // An empty stage, or one with a single layer, passes through intact.
        if layers.len() <= 1 {
            let mut single = stage.split(first_id);
            for (hostname, roles) in stage.tasks() {
                for (role, task) in roles {
                    single.add_task(hostname.clone(), role.clone(), task.clone());
                }
            }
            return Ok(vec![single]);
        }

        let mut stages = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            let mut split = stage.split(first_id + index as u64);
            for (hostname, roles) in stage.tasks() {
                for (role, task) in roles {
                    if layer.contains(&task.role_command(role)) {
                        split.add_task(hostname.clone(), role.clone(), task.clone());
                    }
                }
            }
            stages.push(split);
        }
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExecutionCommand;
    use crate::stage::Task;

    fn agent_task(role: &str, command: &str, hostname: &str) -> Task {
        Task::AgentExecution {
            command: ExecutionCommand {
                cluster_name: "c1".to_string(),
                hostname: hostname.to_string(),
                service_name: "HDFS".to_string(),
                role: role.to_string(),
                role_command: command.to_string(),
                script: format!("scripts/{}.py", role.to_lowercase()),
                timeout_secs: 900,
                command_params: BTreeMap::new(),
                role_params: BTreeMap::new(),
                configurations: BTreeMap::new(),
            },
        }
    }

    fn create_test_order() -> RoleCommandOrder {
        let mut dependencies: BTreeMap<RoleCommand, BTreeSet<RoleCommand>> = BTreeMap::new();
        dependencies
            .entry(RoleCommand::new("DATANODE", "START"))
            .or_default()
            .insert(RoleCommand::new("NAMENODE", "START"));
        RoleCommandOrder::new(dependencies)
    }

    #[test]
    fn splits_on_present_dependency() {
        let order = create_test_order();
        let mut stage = Stage::new(0, "Start Services", "{}", "{}", "{}");
        stage.add_task("host1", "NAMENODE", agent_task("NAMENODE", "START", "host1"));
        stage.add_task("host1", "DATANODE", agent_task("DATANODE", "START", "host1"));
        stage.add_task("host2", "DATANODE", agent_task("DATANODE", "START", "host2"));

        let stages = order.order_stage(stage, 5).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].id, 5);
        assert_eq!(stages[1].id, 6);
        // NAMENODE first, DATANODEs after.
        assert_eq!(stages[0].task_count(), 1);
        assert_eq!(stages[1].task_count(), 2);
    }

    #[test]
    fn passes_through_without_dependencies() {
        let order = create_test_order();
        let mut stage = Stage::new(0, "Distribute Keytabs", "{}", "{}", "{}");
        stage.add_task(
            "host1",
            "KERBEROS_CLIENT",
            agent_task("KERBEROS_CLIENT", "SET_KEYTAB", "host1"),
        );
        stage.add_task(
            "host2",
            "KERBEROS_CLIENT",
            agent_task("KERBEROS_CLIENT", "SET_KEYTAB", "host2"),
        );

        let stages = order.order_stage(stage, 1).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].id, 1);
        assert_eq!(stages[0].task_count(), 2);
    }

    #[test]
    fn empty_stage_survives_ordering() {
        let order = create_test_order();
        let stage = Stage::new(0, "Delete Keytabs", "{}", "{}", "{}");
        let stages = order.order_stage(stage, 3).unwrap();
        assert_eq!(stages.len(), 1);
        assert!(stages[0].is_empty());
    }

    #[test]
    fn cycle_is_fatal() {
        let mut dependencies: BTreeMap<RoleCommand, BTreeSet<RoleCommand>> = BTreeMap::new();
        dependencies
            .entry(RoleCommand::new("A", "START"))
            .or_default()
            .insert(RoleCommand::new("B", "START"));
        dependencies
            .entry(RoleCommand::new("B", "START"))
            .or_default()
            .insert(RoleCommand::new("A", "START"));
        let order = RoleCommandOrder::new(dependencies);

        let mut stage = Stage::new(0, "Cyclic", "{}", "{}", "{}");
        stage.add_task("host1", "A", agent_task("A", "START", "host1"));
        stage.add_task("host1", "B", agent_task("B", "START", "host1"));

        let err = order.order_stage(stage, 1).unwrap_err();
        assert!(matches!(err, KriosError::InvalidConfiguration(_)));
    }

    #[test]
    fn absent_blockers_do_not_split() {
        // DATANODE depends on NAMENODE, but NAMENODE is not in the stage.
        let order = create_test_order();
        let mut stage = Stage::new(0, "Start DataNodes", "{}", "{}", "{}");
        stage.add_task("host1", "DATANODE", agent_task("DATANODE", "START", "host1"));

        let stages = order.order_stage(stage, 1).unwrap();
        assert_eq!(stages.len(), 1);
    }
}
