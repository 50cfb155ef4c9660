//! Principal capability contract
//!
//! Users and groups share one small surface: an identifier and the key under
//! which their roles live in the ledger. Group ledger keys are namespaced with
//! a fixed prefix so one ledger file serves both kinds; ids starting with that
//! prefix are a documented constraint, not validated.

/// Ledger-key namespace prefix for group principals
pub(crate) const GROUP_LEDGER_PREFIX: &str = "group:";

/// Common capability surface of users and groups
pub trait Principal {
    /// Principal identifier
    fn id(&self) -> &str;

    /// Key under which this principal's roles are stored in the ledger
    fn ledger_key(&self) -> String;
}
