use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The operation a request asks for, or the operation a rule governs.
///
/// `Ignore` marks an operation the engine does not control: as a
/// request it is always allowed without consulting any store, and as a
/// rule operation it never matches any real request.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum Operation {
    #[strum(serialize = "READ")]
    Read,
    #[strum(serialize = "MODIFY")]
    Modify,
    #[strum(serialize = "IGNORE")]
    Ignore,
}

impl Operation {
    /// Whether a grant of `self` satisfies a request for `requested`.
    ///
    /// A grant of `Modify` subsumes a `Read` request; a grant of `Read`
    /// does not subsume `Modify`.
    pub fn grants(self, requested: Operation) -> bool {
        match (self, requested) {
            (Operation::Ignore, _) => false,
            (granted, requested) if granted == requested => true,
            (Operation::Modify, Operation::Read) => true,
            _ => false,
        }
    }
}

/// The outcome of a resolution. There is no third state: every
/// unmatched case degrades to `Deny`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
pub enum Decision {
    #[strum(serialize = "ALLOW")]
    Allow,
    #[strum(serialize = "DENY")]
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Decision, Operation};
    use core::str::FromStr;

    #[test]
    fn subsumption() {
        assert!(Operation::Modify.grants(Operation::Modify));
        assert!(Operation::Modify.grants(Operation::Read));
        assert!(Operation::Read.grants(Operation::Read));
        assert!(!Operation::Read.grants(Operation::Modify));
    }

    #[test]
    fn ignore_grants_nothing() {
        assert!(!Operation::Ignore.grants(Operation::Read));
        assert!(!Operation::Ignore.grants(Operation::Modify));
        assert!(!Operation::Ignore.grants(Operation::Ignore));
    }

    #[test]
    fn wire_words() {
        assert_eq!(Operation::from_str("MODIFY").unwrap(), Operation::Modify);
        assert_eq!(Operation::from_str("READ").unwrap(), Operation::Read);
        assert!(Operation::from_str("modify").is_err());
        assert_eq!(Operation::Modify.to_string(), "MODIFY");
    }

    #[test]
    fn decision_from_bool() {
        assert_eq!(Decision::from(true), Decision::Allow);
        assert_eq!(Decision::from(false), Decision::Deny);
        assert!(Decision::Allow.is_allowed());
        assert!(!Decision::Deny.is_allowed());
    }
}
