//! Stage planning engine.
//!
//! Turns a high-level cluster operation into an ordered sequence of stages
//! of per-host tasks: the operation handler state machines decide which
//! stages to emit, the role-command order graph linearizes tasks against
//! global ordering constraints, and the execution command assembler builds
//! the per-host payload an external agent executes.
//!
//! Planning is synchronous, single-threaded per request, and all-or-nothing:
//! either a fully planned stage container is returned (with the security
//! state transitions applied), or an error is raised before any state is
//! touched.

pub mod action;
pub mod command;
pub mod handler;
pub mod order;
pub mod orchestrator;
pub mod stage;

pub use action::{plan_custom_action, ActionCatalog, ActionDefinition, ActionRequest, ResourceFilter};
pub use command::ExecutionCommand;
pub use handler::{OperationHandler, PlanningContext};
pub use order::{RoleCommand, RoleCommandOrder};
pub use orchestrator::Orchestrator;
pub use stage::{Stage, StageContainer, Task};
