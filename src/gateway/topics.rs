//! Topic map for the `dropster/` namespace.

pub const PREFIX: &str = "dropster";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Periodic measurement snapshots.
    Data,
    /// Mode and actuator state, retained.
    Status,
    /// Inbound commands.
    Control,
    Alerts,
    Errors,
    /// Acks, heartbeats, lifecycle and config replies.
    System,
}

impl Topic {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Data => "dropster/data",
            Self::Status => "dropster/status",
            Self::Control => "dropster/control",
            Self::Alerts => "dropster/alerts",
            Self::Errors => "dropster/errors",
            Self::System => "dropster/system",
        }
    }

    /// Only status is retained, so a late subscriber sees the current mode.
    pub const fn retained(self) -> bool {
        matches!(self, Self::Status)
    }
}
