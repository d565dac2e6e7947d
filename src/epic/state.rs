//! Epic lifecycle states and the transition table.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an epic.
///
/// `Released` is the only terminal state; an abandoned epic also ends here,
/// carrying a failure reason on the epic itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicState {
    Planned,
    ContractsLocked,
    Implementing,
    Parked,
    Review,
    Integrated,
    Released,
}

impl EpicState {
    /// All states in lifecycle order.
    pub const ALL: [EpicState; 7] = [
        EpicState::Planned,
        EpicState::ContractsLocked,
        EpicState::Implementing,
        EpicState::Parked,
        EpicState::Review,
        EpicState::Integrated,
        EpicState::Released,
    ];

    /// Whether `next` is reachable from `self` in a single step.
    pub fn can_transition_to(self, next: EpicState) -> bool {
        use EpicState::*;
        matches!(
            (self, next),
            (Planned, ContractsLocked)
                | (ContractsLocked, Implementing)
                | (Implementing, Parked)
                | (Parked, Implementing)
                | (Implementing, Review)
                | (Implementing, Released)
                | (Review, Integrated)
                | (Review, Released)
                | (Integrated, Released)
        )
    }

    /// States reachable from `self` in a single step.
    pub fn successors(self) -> Vec<EpicState> {
        Self::ALL
            .into_iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    /// Integrated or Released: the epic no longer blocks its layer.
    pub fn is_terminal_for_layer(self) -> bool {
        matches!(self, EpicState::Integrated | EpicState::Released)
    }

    /// Only `Released` accepts no further transitions.
    pub fn is_final(self) -> bool {
        self == EpicState::Released
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EpicState::Planned => "planned",
            EpicState::ContractsLocked => "contracts_locked",
            EpicState::Implementing => "implementing",
            EpicState::Parked => "parked",
            EpicState::Review => "review",
            EpicState::Integrated => "integrated",
            EpicState::Released => "released",
        }
    }
}

impl std::fmt::Display for EpicState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EpicState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "planned" => Ok(EpicState::Planned),
            "contracts_locked" | "contractslocked" => Ok(EpicState::ContractsLocked),
            "implementing" => Ok(EpicState::Implementing),
            "parked" => Ok(EpicState::Parked),
            "review" => Ok(EpicState::Review),
            "integrated" => Ok(EpicState::Integrated),
            "released" => Ok(EpicState::Released),
            other => Err(format!("unknown epic state '{}'", other)),
        }
    }
}
