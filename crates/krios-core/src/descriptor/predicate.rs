//! `when` predicates: boolean expressions gating identity descriptors.
//!
//! Predicates are evaluated against the current merged configuration and the
//! set of installed service names. Serialized form is externally tagged:
//!
//! ```yaml
//! when:
//!   and:
//!     - contains: ["services", "HIVE"]
//!     - equals: ["kerberos-env/create_ambari_principal", "true"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Evaluation context for a predicate.
pub struct PredicateContext<'a> {
    /// Merged configuration: type -> property -> value.
    pub configurations: &'a BTreeMap<String, BTreeMap<String, String>>,
    /// Names of installed services.
    pub services: &'a BTreeSet<String>,
}

/// Boolean expression over the predicate context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// `equals: ["config-type/property", "literal"]`; a missing variable
    /// never equals anything.
    Equals(String, String),
    /// `contains: ["services", "NAME"]`; only the `services` collection is
    /// defined, unknown collections evaluate false.
    Contains(String, String),
}

impl Predicate {
    pub fn evaluate(&self, ctx: &PredicateContext<'_>) -> bool {
        match self {
            Predicate::And(children) => children.iter().all(|p| p.evaluate(ctx)),
            Predicate::Or(children) => children.iter().any(|p| p.evaluate(ctx)),
            Predicate::Not(child) => !child.evaluate(ctx),
            Predicate::Equals(variable, literal) => {
                lookup(ctx, variable).map(|v| v == literal).unwrap_or(false)
            }
            Predicate::Contains(collection, value) => {
                collection == "services" && ctx.services.contains(value)
            }
        }
    }
}

fn lookup<'a>(ctx: &'a PredicateContext<'_>, variable: &str) -> Option<&'a str> {
    let (config_type, property) = variable.split_once('/')?;
    ctx.configurations
        .get(config_type)?
        .get(property)
        .map(String::as_str)
}
