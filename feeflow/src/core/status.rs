//! Run status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of a single run of a job's external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The child process is still alive.
    Running,
    /// The child exited with code 0.
    Succeeded,
    /// The child exited non-zero, died on a signal, or could not be spawned.
    Failed,
    /// The child was terminated for exceeding its memory ceiling.
    KilledMemory,
    /// The child was terminated for exceeding its wall-clock timeout.
    KilledTimeout,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::KilledMemory => write!(f, "killed-memory"),
            Self::KilledTimeout => write!(f, "killed-timeout"),
        }
    }
}

impl RunStatus {
    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true for every terminal status other than success.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::KilledMemory | Self::KilledTimeout)
    }

    /// Returns true if the supervisor had to kill the child.
    #[must_use]
    pub fn is_resource_kill(&self) -> bool {
        matches!(self, Self::KilledMemory | Self::KilledTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Running.to_string(), "running");
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(RunStatus::Failed.to_string(), "failed");
        assert_eq!(RunStatus::KilledMemory.to_string(), "killed-memory");
        assert_eq!(RunStatus::KilledTimeout.to_string(), "killed-timeout");
    }

    #[test]
    fn test_run_status_classification() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_success());
        assert!(!RunStatus::Succeeded.is_failure());
        assert!(RunStatus::Failed.is_failure());
        assert!(RunStatus::KilledMemory.is_failure());
        assert!(RunStatus::KilledTimeout.is_resource_kill());
        assert!(!RunStatus::Failed.is_resource_kill());
    }

    #[test]
    fn test_run_status_serialize() {
        let json = serde_json::to_string(&RunStatus::KilledMemory).unwrap();
        assert_eq!(json, r#""killed-memory""#);

        let deserialized: RunStatus = serde_json::from_str(r#""killed-timeout""#).unwrap();
        assert_eq!(deserialized, RunStatus::KilledTimeout);
    }
}
