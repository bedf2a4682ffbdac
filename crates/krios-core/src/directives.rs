//! Request-level directives: string-valued flags riding on an operation
//! request that tune planning behavior.

use std::collections::BTreeMap;

/// Directive key: `"false"` delegates identity management to an external
/// administrator; any other value (or absence) means managed.
pub const MANAGE_KERBEROS_IDENTITIES: &str = "manage_kerberos_identities";
/// Directive key: `"true"`/`"all"` regenerate every keytab, `"missing"`
/// regenerates only absent ones.
pub const REGENERATE_KEYTABS: &str = "regenerate_keytabs";
/// Directive key: `"true"` bypasses the "already in this security state"
/// short-circuit when toggling Kerberos.
pub const FORCE_TOGGLE_KERBEROS: &str = "force_toggle_kerberos";

/// Keytab regeneration mode parsed from [`REGENERATE_KEYTABS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateMode {
    None,
    All,
    Missing,
}

/// Parsed view over the raw directive map of a request.
#[derive(Debug, Clone, Default)]
pub struct Directives(BTreeMap<String, String>);

impl Directives {
    pub fn new(raw: BTreeMap<String, String>) -> Self {
        Directives(raw)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Identities are managed unless the directive is literally `"false"`.
    pub fn manage_kerberos_identities(&self) -> Option<bool> {
        self.get(MANAGE_KERBEROS_IDENTITIES)
            .map(|v| !v.eq_ignore_ascii_case("false"))
    }

    pub fn regenerate_keytabs(&self) -> RegenerateMode {
        match self.get(REGENERATE_KEYTABS) {
            Some(v) if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("all") => {
                RegenerateMode::All
            }
            Some(v) if v.eq_ignore_ascii_case("missing") => RegenerateMode::Missing,
            _ => RegenerateMode::None,
        }
    }

    pub fn force_toggle_kerberos(&self) -> bool {
        self.get(FORCE_TOGGLE_KERBEROS)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}
