use std::fmt;

/// Machine-readable error codes for scripts and agents driving the CLI.
///
/// Attach a code to an `anyhow` error with `.context(ErrorCode::X)` and
/// recover it with `err.downcast_ref::<ErrorCode>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    StateReadFailed,
    StateWriteFailed,
    EventLogInvalid,
    InvalidEdit,
    InvalidMove,
    IndexInconsistent,
    SimulationFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::StateReadFailed => "E1002",
            Self::StateWriteFailed => "E1003",
            Self::EventLogInvalid => "E2001",
            Self::InvalidEdit => "E2002",
            Self::InvalidMove => "E2003",
            Self::IndexInconsistent => "E3001",
            Self::SimulationFailed => "E4001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::StateReadFailed => "Could not read saved tree",
            Self::StateWriteFailed => "Could not write saved tree",
            Self::EventLogInvalid => "Event log is invalid",
            Self::InvalidEdit => "Invalid local edit",
            Self::InvalidMove => "Move rejected",
            Self::IndexInconsistent => "Child index is inconsistent with node store",
            Self::SimulationFailed => "Simulation found invariant violations",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .locus/config.toml and retry."),
            Self::StateReadFailed => {
                Some("Check the state file path, or delete it to start from a seeded tree.")
            }
            Self::StateWriteFailed => Some("Check disk space and write permissions."),
            Self::EventLogInvalid => {
                Some("Each line must be one {\"type\": ..., \"payload\": ...} JSON object.")
            }
            Self::InvalidEdit => Some("New nodes need both parent_id and pos."),
            Self::InvalidMove => Some("Pick a parent outside the node's own subtree."),
            Self::IndexInconsistent => Some("Reload the tree from its saved records to rebuild the index."),
            Self::SimulationFailed => Some("Replay the first failing seed with `locus sim replay`."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
