//! Payload layouts of the Dem NV blocks

use bytes::BufMut;

use super::codec::{decode_block, encode_block, PayloadReader};
use crate::error::NvError;
use crate::ids::{DtcIndex, EventId};
use crate::memory::{MemoryEntry, PermanentEntry};

pub const KIND_ADMIN: u8 = 0x01;
pub const KIND_STATUS: u8 = 0x02;
pub const KIND_ENTRY: u8 = 0x03;
pub const KIND_PERMANENT: u8 = 0x04;

/// Global administrative data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdminBlock {
    /// Identifies the configuration the data was written with
    pub layout_id: u32,
    /// Next chronology stamp
    pub timestamp: u32,
    /// Overflow flag per memory id
    pub overflow: Vec<bool>,
    /// Started flag per operation cycle
    pub cycles_started: Vec<bool>,
}

/// Persisted part of one event's status data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventRecord {
    pub uds: u8,
    pub ext: u8,
    pub stored: u8,
    pub trip: u8,
    pub healing: u8,
    pub qualify: u8,
}

/// Event statuses, MIL group trip counters and combined DTC statuses
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusBlock {
    /// Index 0 is event id 1
    pub events: Vec<EventRecord>,
    pub mil_trip: Vec<u8>,
    pub dtc_status: Vec<u8>,
}

pub fn encode_admin(admin: &AdminBlock) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.put_u32_le(admin.layout_id);
    payload.put_u32_le(admin.timestamp);
    payload.put_u8(admin.overflow.len() as u8);
    for flag in &admin.overflow {
        payload.put_u8(*flag as u8);
    }
    payload.put_u8(admin.cycles_started.len() as u8);
    for flag in &admin.cycles_started {
        payload.put_u8(*flag as u8);
    }
    encode_block(KIND_ADMIN, &payload)
}

pub fn decode_admin(bytes: &[u8]) -> Result<AdminBlock, NvError> {
    let mut r = PayloadReader::new(decode_block(KIND_ADMIN, bytes)?);
    let layout_id = r.u32()?;
    let timestamp = r.u32()?;
    let overflow = (0..r.u8()?).map(|_| r.bool()).collect::<Result<_, _>>()?;
    let cycles_started = (0..r.u8()?).map(|_| r.bool()).collect::<Result<_, _>>()?;
    r.finish()?;
    Ok(AdminBlock {
        layout_id,
        timestamp,
        overflow,
        cycles_started,
    })
}

pub fn encode_status(status: &StatusBlock) -> Vec<u8> {
    let mut payload = Vec::with_capacity(6 + status.events.len() * 6);
    payload.put_u16_le(status.events.len() as u16);
    for e in &status.events {
        payload.put_u8(e.uds);
        payload.put_u8(e.ext);
        payload.put_u8(e.stored);
        payload.put_u8(e.trip);
        payload.put_u8(e.healing);
        payload.put_u8(e.qualify);
    }
    payload.put_u16_le(status.mil_trip.len() as u16);
    payload.put_slice(&status.mil_trip);
    payload.put_u16_le(status.dtc_status.len() as u16);
    payload.put_slice(&status.dtc_status);
    encode_block(KIND_STATUS, &payload)
}

pub fn decode_status(bytes: &[u8]) -> Result<StatusBlock, NvError> {
    let mut r = PayloadReader::new(decode_block(KIND_STATUS, bytes)?);
    let count = r.u16()?;
    let mut events = Vec::with_capacity(count as usize);
    for _ in 0..count {
        events.push(EventRecord {
            uds: r.u8()?,
            ext: r.u8()?,
            stored: r.u8()?,
            trip: r.u8()?,
            healing: r.u8()?,
            qualify: r.u8()?,
        });
    }
    let mil_count = r.u16()? as usize;
    let mil_trip = r.bytes(mil_count)?;
    let dtc_count = r.u16()? as usize;
    let dtc_status = r.bytes(dtc_count)?;
    r.finish()?;
    Ok(StatusBlock {
        events,
        mil_trip,
        dtc_status,
    })
}

pub fn encode_entry(entry: &MemoryEntry) -> Vec<u8> {
    let mut payload = Vec::with_capacity(24 + entry.data.len());
    payload.put_u16_le(entry.event.0);
    payload.put_u32_le(entry.timestamp);
    payload.put_u8(entry.occurrence_counter);
    payload.put_u8(entry.aging_counter);
    payload.put_i8(entry.max_fdc);
    payload.put_u8(entry.cycles_since_first_failed);
    payload.put_u8(entry.cycles_since_last_failed);
    payload.put_u8(entry.failed_cycles);
    payload.put_u8(entry.pre_confirmed_status);
    payload.put_u8(entry.aging_only as u8);
    payload.put_u32_le(entry.snapshot_valid);
    payload.put_u32_le(entry.extended_valid);
    payload.put_u16_le(entry.data.len() as u16);
    payload.put_slice(&entry.data);
    encode_block(KIND_ENTRY, &payload)
}

/// Decode an entry; the record buffer must match `data_size`
pub fn decode_entry(bytes: &[u8], data_size: usize) -> Result<MemoryEntry, NvError> {
    let mut r = PayloadReader::new(decode_block(KIND_ENTRY, bytes)?);
    let mut entry = MemoryEntry::new(data_size);
    entry.event = EventId(r.u16()?);
    entry.timestamp = r.u32()?;
    entry.occurrence_counter = r.u8()?;
    entry.aging_counter = r.u8()?;
    entry.max_fdc = r.i8()?;
    entry.cycles_since_first_failed = r.u8()?;
    entry.cycles_since_last_failed = r.u8()?;
    entry.failed_cycles = r.u8()?;
    entry.pre_confirmed_status = r.u8()?;
    entry.aging_only = r.bool()?;
    entry.snapshot_valid = r.u32()?;
    entry.extended_valid = r.u32()?;
    let len = r.u16()? as usize;
    if len != data_size {
        return Err(NvError::LengthMismatch {
            expected: data_size,
            got: len,
        });
    }
    entry.data = r.bytes(len)?;
    r.finish()?;
    Ok(entry)
}

pub fn encode_permanent(slots: &[Option<PermanentEntry>]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + slots.len() * 5);
    payload.put_u16_le(slots.len() as u16);
    for slot in slots {
        match slot {
            Some(entry) => {
                payload.put_u8(1);
                payload.put_u16_le(entry.dtc.0);
                payload.put_u16_le(entry.event.0);
            }
            None => {
                payload.put_u8(0);
                payload.put_u16_le(0);
                payload.put_u16_le(0);
            }
        }
    }
    encode_block(KIND_PERMANENT, &payload)
}

pub fn decode_permanent(bytes: &[u8]) -> Result<Vec<Option<PermanentEntry>>, NvError> {
    let mut r = PayloadReader::new(decode_block(KIND_PERMANENT, bytes)?);
    let count = r.u16()?;
    let mut slots = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let present = r.bool()?;
        let dtc = DtcIndex(r.u16()?);
        let event = EventId(r.u16()?);
        slots.push(present.then_some(PermanentEntry { dtc, event }));
    }
    r.finish()?;
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_block() {
        let block = StatusBlock {
            events: vec![
                EventRecord {
                    uds: 0x2F,
                    ext: 0x01,
                    stored: 1,
                    trip: 2,
                    healing: 0,
                    qualify: 0x88,
                },
                EventRecord::default(),
            ],
            mil_trip: vec![3],
            dtc_status: vec![0x09, 0x00],
        };
        assert_eq!(decode_status(&encode_status(&block)).unwrap(), block);
    }

    #[test]
    fn test_entry_data_size_must_match() {
        let mut entry = MemoryEntry::new(3);
        entry.occupy(EventId(2), 11, 0x24);
        entry.max_fdc = -12;
        entry.data = vec![1, 2, 3];
        entry.snapshot_valid = 1;
        let bytes = encode_entry(&entry);

        let decoded = decode_entry(&bytes, 3).unwrap();
        assert_eq!(decoded, entry);
        assert!(matches!(
            decode_entry(&bytes, 4),
            Err(NvError::LengthMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_admin_and_permanent() {
        let admin = AdminBlock {
            layout_id: 0xDEADBEEF,
            timestamp: 42,
            overflow: vec![true, false],
            cycles_started: vec![true],
        };
        assert_eq!(decode_admin(&encode_admin(&admin)).unwrap(), admin);

        let slots = vec![
            None,
            Some(PermanentEntry {
                dtc: DtcIndex(4),
                event: EventId(9),
            }),
        ];
        assert_eq!(decode_permanent(&encode_permanent(&slots)).unwrap(), slots);
        assert!(decode_permanent(&encode_admin(&admin)).is_err());
    }
}
