//! `${type/property}` variable substitution.
//!
//! Identity descriptors embed variables of the form `${config-type/property}`
//! (or `${property}` against the default group) in principal and keytab-path
//! expressions. Substitution resolves against a merged configuration map;
//! values may themselves contain variables, so resolution iterates to a
//! bounded depth.

use krios_core::KriosError;
use regex::Regex;
use std::collections::BTreeMap;

/// Group used when a variable carries no `type/` qualifier.
pub const DEFAULT_GROUP: &str = "";

/// Resolution passes before declaring a reference cyclic.
const MAX_DEPTH: usize = 10;

fn variable_pattern() -> Regex {
    // The grammar is fixed; the expression cannot fail to compile.
    Regex::new(r"\$\{([^\{\}]+)\}").unwrap()
}

/// Replace every resolvable variable in `expression`, leaving unresolved
/// references in place as `${...}` for the caller to inspect.
pub fn replace_variables(
    expression: &str,
    configurations: &BTreeMap<String, BTreeMap<String, String>>,
) -> String {
    let pattern = variable_pattern();
    let mut current = expression.to_string();

    for _ in 0..MAX_DEPTH {
        let mut changed = false;
        let next = pattern
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                match lookup(configurations, &caps[1]) {
                    Some(value) => {
                        changed = true;
                        value.to_string()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
        current = next;
        if !changed {
            break;
        }
    }

    current
}

/// Like [`replace_variables`], but any reference left unresolved is an
/// `InvalidConfiguration` error. Used for required identity fields.
pub fn replace_variables_strict(
    expression: &str,
    configurations: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<String, KriosError> {
    let resolved = replace_variables(expression, configurations);
    if let Some(caps) = variable_pattern().captures(&resolved) {
        return Err(KriosError::invalid_configuration(format!(
            "unresolvable variable '${{{}}}' in expression '{}'",
            &caps[1], expression
        )));
    }
    Ok(resolved)
}

fn lookup<'a>(
    configurations: &'a BTreeMap<String, BTreeMap<String, String>>,
    variable: &str,
) -> Option<&'a str> {
    let (group, property) = match variable.split_once('/') {
        Some((group, property)) => (group, property),
        None => (DEFAULT_GROUP, variable),
    };
    configurations
        .get(group)?
        .get(property)
        .map(String::as_str)
}
