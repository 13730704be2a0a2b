//! Event status bytes
//!
//! The UDS status byte layout follows ISO 14229-1 (DTC status mask). The
//! extended, internal and qualification states are Dem-private.

use serde::{Deserialize, Serialize};

/// DTC status byte bit definitions per ISO 14229-1
pub mod status_bit {
    /// Bit 0: Test Failed - most recent test result was failed
    pub const TF: u8 = 0x01;
    /// Bit 1: Test Failed This Operation Cycle
    pub const TFTOC: u8 = 0x02;
    /// Bit 2: Pending DTC - failed in the current or last completed cycle
    pub const PDTC: u8 = 0x04;
    /// Bit 3: Confirmed DTC - malfunction confirmed and stored
    pub const CDTC: u8 = 0x08;
    /// Bit 4: Test Not Completed Since Last Clear
    pub const TNCSLC: u8 = 0x10;
    /// Bit 5: Test Failed Since Last Clear
    pub const TFSLC: u8 = 0x20;
    /// Bit 6: Test Not Completed This Operation Cycle
    pub const TNCTOC: u8 = 0x40;
    /// Bit 7: Warning Indicator Requested
    pub const WIR: u8 = 0x80;

    /// Bits whose external visibility is deferred until driving-cycle qualification
    pub const QUALIFIED_BITS: u8 = CDTC | WIR;
    /// Bits combined by logical OR across the members of a combined DTC
    pub const COMBINED_OR_BITS: u8 = TF | TFTOC | PDTC | CDTC | TFSLC | WIR;
}

/// UDS status byte of an event or DTC
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UdsStatus(u8);

impl UdsStatus {
    /// All bits clear
    pub const CLEARED: UdsStatus = UdsStatus(0x00);
    /// Test not completed since last clear / this cycle (0x50)
    pub const NOT_COMPLETED: UdsStatus = UdsStatus(status_bit::TNCSLC | status_bit::TNCTOC);

    pub const fn from_bits(bits: u8) -> Self {
        UdsStatus(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether all bits of `mask` are set
    pub const fn test(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Whether any bit of `mask` is set
    pub const fn any(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    #[must_use]
    pub const fn with(self, mask: u8) -> Self {
        UdsStatus(self.0 | mask)
    }

    #[must_use]
    pub const fn without(self, mask: u8) -> Self {
        UdsStatus(self.0 & !mask)
    }

    pub fn test_failed(self) -> bool {
        self.test(status_bit::TF)
    }

    pub fn test_failed_this_cycle(self) -> bool {
        self.test(status_bit::TFTOC)
    }

    pub fn pending(self) -> bool {
        self.test(status_bit::PDTC)
    }

    pub fn confirmed(self) -> bool {
        self.test(status_bit::CDTC)
    }

    pub fn not_completed_since_clear(self) -> bool {
        self.test(status_bit::TNCSLC)
    }

    pub fn failed_since_clear(self) -> bool {
        self.test(status_bit::TFSLC)
    }

    pub fn not_completed_this_cycle(self) -> bool {
        self.test(status_bit::TNCTOC)
    }

    pub fn warning_indicator(self) -> bool {
        self.test(status_bit::WIR)
    }

    /// Whether the status matches a client status mask (any common bit)
    pub fn matches_mask(self, mask: u8) -> bool {
        self.any(mask)
    }

    /// Names of the set bits, lowest bit first
    pub fn flag_names(self) -> Vec<&'static str> {
        const NAMES: [&str; 8] = ["TF", "TFTOC", "PDTC", "CDTC", "TNCSLC", "TFSLC", "TNCTOC", "WIR"];
        NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::fmt::Debug for UdsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdsStatus(0x{:02X} {:?})", self.0, self.flag_names())
    }
}

impl std::fmt::Display for UdsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Combine member statuses of a combined DTC
///
/// TF, TFTOC, PDTC, CDTC, TFSLC and WIR are the union of the members.
/// TNCSLC is set if any member has not completed since clear and no
/// member failed since clear; TNCTOC likewise against TFTOC.
pub fn combine_status<I>(members: I) -> UdsStatus
where
    I: IntoIterator<Item = UdsStatus>,
{
    let mut or_bits = 0u8;
    let mut tncslc = false;
    let mut tnctoc = false;
    for status in members {
        or_bits |= status.bits() & status_bit::COMBINED_OR_BITS;
        tncslc |= status.not_completed_since_clear();
        tnctoc |= status.not_completed_this_cycle();
    }

    let mut combined = UdsStatus::from_bits(or_bits);
    if tncslc && or_bits & status_bit::TFSLC == 0 {
        combined = combined.with(status_bit::TNCSLC);
    }
    if tnctoc && or_bits & status_bit::TFTOC == 0 {
        combined = combined.with(status_bit::TNCTOC);
    }
    combined
}

/// Extended status bits (not visible through UDS)
pub mod ext_status_bit {
    /// Test passed since last clear
    pub const TPSLC: u8 = 0x01;
    /// Similar conditions reached (OBD misfire/fuel system)
    pub const SIMILAR_CONDITIONS: u8 = 0x02;
    /// Qualified confirmed since last clear
    pub const QCSLC: u8 = 0x04;
    /// Monitor disabled this operation cycle (enable conditions not met)
    pub const MONITOR_DISABLED_TOC: u8 = 0x08;
}

/// Extended status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtendedStatus(u8);

impl ExtendedStatus {
    pub const fn from_bits(bits: u8) -> Self {
        ExtendedStatus(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn test(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    #[must_use]
    pub const fn with(self, mask: u8) -> Self {
        ExtendedStatus(self.0 | mask)
    }

    #[must_use]
    pub const fn without(self, mask: u8) -> Self {
        ExtendedStatus(self.0 & !mask)
    }
}

/// Storage lifecycle of an event's fault memory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredStatus {
    /// No entry
    #[default]
    None,
    /// Entry exists, event not aging
    Active,
    /// Aging in progress
    Aging,
    /// Aging completed, entry retained
    Aged,
}

impl StoredStatus {
    pub fn to_byte(self) -> u8 {
        match self {
            StoredStatus::None => 0,
            StoredStatus::Active => 1,
            StoredStatus::Aging => 2,
            StoredStatus::Aged => 3,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(StoredStatus::None),
            1 => Some(StoredStatus::Active),
            2 => Some(StoredStatus::Aging),
            3 => Some(StoredStatus::Aged),
            _ => None,
        }
    }
}

/// Dem-internal per-event state bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InternalStatus {
    /// Event is unavailable (disconnected)
    pub disconnected: bool,
    /// Fault detection counter reached the threshold this cycle
    pub fdc_toc: bool,
    /// Storage lifecycle
    pub stored: StoredStatus,
}

/// Qualification bits: CDTC/WIR positions mark the bits that are qualified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifyStatus(u8);

impl Default for QualifyStatus {
    fn default() -> Self {
        QualifyStatus::QUALIFIED
    }
}

impl QualifyStatus {
    /// CDTC and WIR externally visible
    pub const QUALIFIED: QualifyStatus = QualifyStatus(status_bit::QUALIFIED_BITS);
    /// CDTC and WIR masked until qualification
    pub const UNQUALIFIED: QualifyStatus = QualifyStatus(0);

    pub const fn from_bits(bits: u8) -> Self {
        QualifyStatus(bits & status_bit::QUALIFIED_BITS)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_qualified(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    #[must_use]
    pub const fn with(self, bit: u8) -> Self {
        QualifyStatus((self.0 | bit) & status_bit::QUALIFIED_BITS)
    }

    #[must_use]
    pub const fn without(self, bit: u8) -> Self {
        QualifyStatus(self.0 & !bit)
    }

    /// External view of `status`: unqualified CDTC/WIR bits are masked
    pub fn apply(self, status: UdsStatus) -> UdsStatus {
        status.without(status_bit::QUALIFIED_BITS & !self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::status_bit::*;
    use super::*;

    #[test]
    fn test_status_accessors() {
        let status = UdsStatus::from_bits(TF | CDTC);
        assert!(status.test_failed());
        assert!(status.confirmed());
        assert!(!status.pending());
        assert!(status.matches_mask(CDTC | PDTC));
        assert!(!status.matches_mask(PDTC));
        assert_eq!(status.flag_names(), vec!["TF", "CDTC"]);
        assert_eq!(status.to_string(), "0x09");
    }

    #[test]
    fn test_combine_status_or_bits() {
        let a = UdsStatus::from_bits(TF | TFTOC | PDTC | TFSLC);
        let b = UdsStatus::from_bits(TNCSLC | TNCTOC);
        let combined = combine_status([a, b]);
        // TNC bits suppressed because one member failed
        assert_eq!(combined.bits(), TF | TFTOC | PDTC | TFSLC);
    }

    #[test]
    fn test_combine_status_not_completed() {
        let a = UdsStatus::from_bits(TNCSLC | TNCTOC);
        let b = UdsStatus::CLEARED;
        assert_eq!(combine_status([a, b]).bits(), TNCSLC | TNCTOC);
        assert_eq!(combine_status(std::iter::empty()), UdsStatus::CLEARED);
    }

    #[test]
    fn test_qualify_masks_external_status() {
        let status = UdsStatus::from_bits(TF | CDTC | WIR);
        assert_eq!(QualifyStatus::UNQUALIFIED.apply(status).bits(), TF);
        assert_eq!(QualifyStatus::QUALIFIED.apply(status), status);
        assert_eq!(
            QualifyStatus::UNQUALIFIED.with(CDTC).apply(status).bits(),
            TF | CDTC
        );
    }

    #[test]
    fn test_stored_status_byte_roundtrip() {
        for stored in [
            StoredStatus::None,
            StoredStatus::Active,
            StoredStatus::Aging,
            StoredStatus::Aged,
        ] {
            assert_eq!(StoredStatus::from_byte(stored.to_byte()), Some(stored));
        }
        assert_eq!(StoredStatus::from_byte(9), None);
    }
}
