//! 24-bit UDS DTC numbers

/// DTC group addresses for ClearDiagnosticInformation (0x14)
pub mod dtc_group {
    /// All DTC groups (clear all)
    pub const ALL: u32 = 0xFFFFFF;
    pub const POWERTRAIN: u32 = 0x000000;
    pub const CHASSIS: u32 = 0x400000;
    pub const BODY: u32 = 0x800000;
    pub const NETWORK: u32 = 0xC00000;
}

/// Functional group encoded in the two top bits of a DTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtcCategory {
    Powertrain,
    Chassis,
    Body,
    Network,
}

impl DtcCategory {
    const ALL: [DtcCategory; 4] = [
        DtcCategory::Powertrain,
        DtcCategory::Chassis,
        DtcCategory::Body,
        DtcCategory::Network,
    ];

    /// Group address used by ClearDiagnosticInformation
    pub fn group_address(self) -> u32 {
        (self as u32) << 22
    }

    /// Letter of the SAE J2012 code (P, C, B, U)
    pub fn letter(self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

/// A 24-bit DTC number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DtcNumber(pub u32);

impl DtcNumber {
    /// Highest valid DTC value
    pub const MAX: u32 = 0xFFFFFF;

    pub fn category(self) -> DtcCategory {
        DtcCategory::ALL[((self.0 >> 22) & 0x03) as usize]
    }

    /// SAE J2012 code of the upper two bytes, e.g. `P0101`; the failure
    /// type byte is not part of it
    pub fn code(self) -> String {
        format!("{}{:04X}", self.category().letter(), (self.0 >> 8) & 0x3FFF)
    }
}

impl std::fmt::Display for DtcNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}
