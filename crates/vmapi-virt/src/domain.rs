//! Domain handle and live domain state.

use std::fmt;
use uuid::Uuid;

/// Handle to a domain as known by the hypervisor.
///
/// A handle is only meaningful for the duration of one operation; callers
/// re-acquire it by identifier instead of keeping it around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    uuid: Uuid,
}

impl Domain {
    /// Wrap a domain UUID returned by the hypervisor.
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid }
    }

    /// The domain's intrinsic identity.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Live state of a domain, mirroring libvirt's `virDomainState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    /// No state reported
    NoState,
    /// Domain is running
    Running,
    /// Domain is blocked on a resource
    Blocked,
    /// Domain is paused by the user
    Paused,
    /// Domain is being shut down
    Shutdown,
    /// Domain is shut off
    Shutoff,
    /// Domain has crashed
    Crashed,
    /// Domain is suspended by guest power management
    PmSuspended,
}

impl DomainState {
    /// Parse the human-readable state printed by `virsh domstate`.
    ///
    /// Anything unrecognised is reported as [`DomainState::NoState`].
    pub fn from_virsh(output: &str) -> Self {
        match output.trim() {
            "running" => Self::Running,
            "idle" | "blocked" => Self::Blocked,
            "paused" => Self::Paused,
            "in shutdown" => Self::Shutdown,
            "shut off" => Self::Shutoff,
            "crashed" => Self::Crashed,
            "pmsuspended" => Self::PmSuspended,
            other => {
                tracing::debug!(state = %other, "Unrecognised domain state");
                Self::NoState
            }
        }
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainState::NoState => write!(f, "no state"),
            DomainState::Running => write!(f, "running"),
            DomainState::Blocked => write!(f, "blocked"),
            DomainState::Paused => write!(f, "paused"),
            DomainState::Shutdown => write!(f, "in shutdown"),
            DomainState::Shutoff => write!(f, "shut off"),
            DomainState::Crashed => write!(f, "crashed"),
            DomainState::PmSuspended => write!(f, "pmsuspended"),
        }
    }
}
