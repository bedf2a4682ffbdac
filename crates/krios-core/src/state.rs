//! Security state machine for services and service-component-hosts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Security state of a service or service-component-host.
///
/// Each entity carries both a desired and a current security state. Enabling
/// Kerberos moves entities toward `SecuredKerberos`, disabling moves them
/// toward `Unsecured`; `Securing` and `Unsecuring` are the transitional
/// current states set while an operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityState {
    Unsecured,
    Securing,
    SecuredKerberos,
    Unsecuring,
}

impl SecurityState {
    /// An endpoint state is a valid desired state; transitional states are not.
    pub fn is_endpoint(self) -> bool {
        matches!(self, SecurityState::Unsecured | SecurityState::SecuredKerberos)
    }

    pub fn is_transitional(self) -> bool {
        !self.is_endpoint()
    }
}

impl Default for SecurityState {
    fn default() -> Self {
        SecurityState::Unsecured
    }
}

impl fmt::Display for SecurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityState::Unsecured => "UNSECURED",
            SecurityState::Securing => "SECURING",
            SecurityState::SecuredKerberos => "SECURED_KERBEROS",
            SecurityState::Unsecuring => "UNSECURING",
        };
        write!(f, "{}", s)
    }
}

/// Cluster-wide security type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityType {
    None,
    Kerberos,
}

impl Default for SecurityType {
    fn default() -> Self {
        SecurityType::None
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityType::None => write!(f, "NONE"),
            SecurityType::Kerberos => write!(f, "KERBEROS"),
        }
    }
}
