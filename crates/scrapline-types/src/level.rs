use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The seven fixed stages of the intake pipeline.
///
/// Serialized as the level number (1..=7) so persisted `levelData` maps and
/// evidence rows stay keyed by integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OperationalLevel {
    VendorDispatch = 1,
    GateEntry = 2,
    WeighbridgeGross = 3,
    MaterialInspection = 4,
    WeighbridgeTare = 5,
    GrnGeneration = 6,
    GatePassExit = 7,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("operational level out of range: {0} (expected 1..=7)")]
pub struct InvalidLevel(pub u8);

impl OperationalLevel {
    pub const ALL: [OperationalLevel; 7] = [
        Self::VendorDispatch,
        Self::GateEntry,
        Self::WeighbridgeGross,
        Self::MaterialInspection,
        Self::WeighbridgeTare,
        Self::GrnGeneration,
        Self::GatePassExit,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Result<Self, InvalidLevel> {
        match n {
            1 => Ok(Self::VendorDispatch),
            2 => Ok(Self::GateEntry),
            3 => Ok(Self::WeighbridgeGross),
            4 => Ok(Self::MaterialInspection),
            5 => Ok(Self::WeighbridgeTare),
            6 => Ok(Self::GrnGeneration),
            7 => Ok(Self::GatePassExit),
            other => Err(InvalidLevel(other)),
        }
    }

    /// The following stage, or `None` at exit.
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1).ok()
    }

    /// Canonical wire name, e.g. `L1_VENDOR_DISPATCH`.
    pub fn name(self) -> &'static str {
        match self {
            Self::VendorDispatch => "L1_VENDOR_DISPATCH",
            Self::GateEntry => "L2_GATE_ENTRY",
            Self::WeighbridgeGross => "L3_WEIGHBRIDGE_GROSS",
            Self::MaterialInspection => "L4_MATERIAL_INSPECTION",
            Self::WeighbridgeTare => "L5_WEIGHBRIDGE_TARE",
            Self::GrnGeneration => "L6_GRN_GENERATION",
            Self::GatePassExit => "L7_GATE_PASS_EXIT",
        }
    }

    /// Levels recorded by an operator through a level-completion call.
    ///
    /// L3 and L5 come from weighbridge captures and L7 from gate-pass
    /// issuance.
    pub fn is_operator_recorded(self) -> bool {
        matches!(
            self,
            Self::VendorDispatch | Self::GateEntry | Self::MaterialInspection | Self::GrnGeneration
        )
    }

    /// Whether approving this level's record moves the transaction on by itself.
    ///
    /// Gate entry, inspection and GRN are stations: the next stage is driven by
    /// an instrument (gross weighing, tare weighing, gate-pass issuance).
    pub fn advances_on_approval(self) -> bool {
        matches!(self, Self::VendorDispatch)
    }
}

impl From<OperationalLevel> for u8 {
    fn from(level: OperationalLevel) -> Self {
        level.number()
    }
}

impl TryFrom<u8> for OperationalLevel {
    type Error = InvalidLevel;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n)
    }
}

impl std::fmt::Display for OperationalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_names_line_up() {
        for (i, level) in OperationalLevel::ALL.iter().enumerate() {
            assert_eq!(level.number() as usize, i + 1);
            assert!(level.name().starts_with(&format!("L{}_", i + 1)));
        }
    }

    #[test]
    fn next_walks_the_pipeline_and_stops_at_exit() {
        assert_eq!(
            OperationalLevel::VendorDispatch.next(),
            Some(OperationalLevel::GateEntry)
        );
        assert_eq!(OperationalLevel::GatePassExit.next(), None);
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        assert_eq!(OperationalLevel::from_number(0), Err(InvalidLevel(0)));
        assert_eq!(OperationalLevel::from_number(8), Err(InvalidLevel(8)));
    }

    #[test]
    fn serializes_as_level_number() {
        let json = serde_json::to_string(&OperationalLevel::WeighbridgeTare).unwrap();
        assert_eq!(json, "5");
        let back: OperationalLevel = serde_json::from_str("4").unwrap();
        assert_eq!(back, OperationalLevel::MaterialInspection);
        assert!(serde_json::from_str::<OperationalLevel>("9").is_err());
    }
}
