//! Classified errors carried into the `Error` state.
//!
//! Every operational failure a state observes is converted into an
//! [`UpdateError`] before it leaves the state, so routing logic can match on
//! [`Severity`] instead of inspecting error strings.

use std::fmt;

/// How the control loop must react to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Retrying later is meaningful; the loop routes back to `Idle`.
    Transient,
    /// Retrying cannot fix this; the loop must stop.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Transient => "transient",
            Severity::Fatal => "fatal",
        })
    }
}

/// An error tagged with its [`Severity`].
#[derive(Debug)]
pub struct UpdateError {
    severity: Severity,
    cause: eyre::Report,
}

impl UpdateError {
    pub fn transient(cause: impl Into<eyre::Report>) -> Self {
        Self {
            severity: Severity::Transient,
            cause: cause.into(),
        }
    }

    pub fn fatal(cause: impl Into<eyre::Report>) -> Self {
        Self {
            severity: Severity::Fatal,
            cause: cause.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub fn cause(&self) -> &eyre::Report {
        &self.cause
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.severity, self.cause)
    }
}

// Reports carry no usable identity, so two errors count as equal when their
// severity and rendered cause match. State identity comparisons in tests rely
// on this.
impl PartialEq for UpdateError {
    fn eq(&self, other: &Self) -> bool {
        self.severity == other.severity
            && self.cause.to_string() == other.cause.to_string()
    }
}

#[cfg(test)]
mod tests {
    use eyre::eyre;

    use super::*;

    #[test]
    fn equality_requires_matching_severity_and_cause() {
        let a = UpdateError::transient(eyre!("reboot error"));
        let b = UpdateError::transient(eyre!("reboot error"));
        let c = UpdateError::fatal(eyre!("reboot error"));
        let d = UpdateError::transient(eyre!("different"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn fatal_is_fatal() {
        assert!(UpdateError::fatal(eyre!("x")).is_fatal());
        assert!(!UpdateError::transient(eyre!("x")).is_fatal());
    }
}
