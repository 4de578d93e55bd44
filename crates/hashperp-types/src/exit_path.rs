//! The independent ways a participant can leave a live contract.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HashPerpError, Position, ScriptPathKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPath {
    EarlyExit,
    MutualAgreement,
    /// Opens `timeout_exit_delay_blocks` after expiry.
    Timeout,
    /// Opens at expiry.
    ForcedSettlement,
    DisputeResolution,
    EmergencyExit,
}

impl ExitPath {
    pub const ALL: [Self; 6] = [
        Self::EarlyExit,
        Self::MutualAgreement,
        Self::Timeout,
        Self::ForcedSettlement,
        Self::DisputeResolution,
        Self::EmergencyExit,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarlyExit => "early_exit",
            Self::MutualAgreement => "mutual_agreement",
            Self::Timeout => "timeout",
            Self::ForcedSettlement => "forced_settlement",
            Self::DisputeResolution => "dispute_resolution",
            Self::EmergencyExit => "emergency_exit",
        }
    }

    /// Tapscript leaf the exit spends through, given the initiator's side.
    #[must_use]
    pub fn leaf(self, initiator: Position) -> ScriptPathKind {
        match self {
            Self::EarlyExit | Self::MutualAgreement => ScriptPathKind::Cooperative,
            Self::Timeout => ScriptPathKind::Timeout,
            Self::ForcedSettlement | Self::DisputeResolution => {
                ScriptPathKind::for_position(initiator)
            }
            Self::EmergencyExit => ScriptPathKind::Sweep,
        }
    }

    /// Reason recorded in the audit ledger.
    #[must_use]
    pub fn audit_reason(self) -> &'static str {
        match self {
            Self::EarlyExit => "voluntary_early_exit",
            Self::MutualAgreement => "mutual_agreement",
            Self::Timeout => "settlement_timeout",
            Self::ForcedSettlement => "forced_settlement",
            Self::DisputeResolution => "dispute_resolution",
            Self::EmergencyExit => "emergency_protocol_action",
        }
    }
}

impl std::fmt::Display for ExitPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitPath {
    type Err = HashPerpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| HashPerpError::ExitPathUnavailable {
                path: s.to_string(),
                reason: "unknown exit path".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_mapping() {
        assert_eq!(
            ExitPath::EarlyExit.leaf(Position::Seller),
            ScriptPathKind::Cooperative
        );
        assert_eq!(
            ExitPath::ForcedSettlement.leaf(Position::Seller),
            ScriptPathKind::Seller
        );
        assert_eq!(
            ExitPath::DisputeResolution.leaf(Position::Buyer),
            ScriptPathKind::Buyer
        );
        assert_eq!(ExitPath::Timeout.leaf(Position::Buyer), ScriptPathKind::Timeout);
        assert_eq!(ExitPath::EmergencyExit.leaf(Position::Buyer), ScriptPathKind::Sweep);
    }

    #[test]
    fn parse_known_and_unknown() {
        for path in ExitPath::ALL {
            assert_eq!(path.as_str().parse::<ExitPath>().unwrap(), path);
        }
        let err = "teleport".parse::<ExitPath>().unwrap_err();
        assert!(matches!(err, HashPerpError::ExitPathUnavailable { .. }));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ExitPath::ForcedSettlement).unwrap();
        assert_eq!(json, "\"forced_settlement\"");
    }
}
