//! LdCom handle validation and SomeIpTp transfers looped through LdCom
//!
//! Run with: cargo test -p dem-tests --test ldcom_someiptp

use std::sync::Arc;

use bsw_core::{DetRecorder, ModuleId, PduInfo};
use cdd_someiptp::{RteError, SomeIpTp, SomeIpTpConfig};
use dem_tests::{LoopbackRouter, Route};
use ldcom::error::det_code;
use ldcom::{service, ApiType, Direction, LdCom, LdComConfig, LdComError, LdComPduConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

const TX: u16 = 0;
const RX: u16 = 1;
const PDUR_TX: u16 = 7;
const HEADER: [u8; 8] = [0x12, 0x34, 0x80, 0x01, 0x00, 0x00, 0x00, 0x20];

fn ldcom_config() -> LdComConfig {
    LdComConfig {
        pdus: vec![
            LdComPduConfig::new("someip_tx", Direction::Tx, ApiType::Tp, PDUR_TX),
            LdComPduConfig::new("someip_rx", Direction::Rx, ApiType::Tp, 0),
        ],
    }
}

struct Stack {
    ldcom: Arc<LdCom>,
    router: Arc<LoopbackRouter>,
    det: Arc<DetRecorder>,
    tp: Arc<SomeIpTp>,
}

fn stack(segment: usize) -> Stack {
    let router = LoopbackRouter::new(
        vec![Route {
            pdur_id: PDUR_TX,
            tx: TX,
            rx: RX,
        }],
        segment,
    );
    let det = Arc::new(DetRecorder::new());
    let ldcom = Arc::new(LdCom::new(ldcom_config(), router.clone(), det.clone()));
    router.attach(&ldcom);
    let tp = SomeIpTp::new(
        SomeIpTpConfig {
            tx_pdu: TX,
            rx_pdu: RX,
            header: HEADER.to_vec(),
            max_payload: 64,
        },
        ldcom.clone(),
        det.clone(),
    )
    .unwrap();
    ldcom.init();
    Stack {
        ldcom,
        router,
        det,
        tp,
    }
}

#[test]
fn test_ldcom_bad_handle() {
    let s = stack(8);
    let result = s.ldcom.transmit(2, &PduInfo::new(&[1, 2, 3]));

    assert_eq!(result, Err(LdComError::InvalidSignalId(2)));
    assert!(s
        .det
        .contains(ModuleId::LDCOM, service::TRANSMIT, det_code::INVALID_SIGNAL_ID));
    assert_eq!(s.router.transmit_count(), 0);
}

#[test]
fn test_ldcom_rx_handle_is_not_a_signal() {
    let s = stack(8);
    assert_eq!(
        s.ldcom.transmit(RX, &PduInfo::new(&[1])),
        Err(LdComError::InvalidSignalId(RX))
    );
    assert_eq!(s.router.transmit_count(), 0);
}

#[rstest]
#[case::byte_wise(1)]
#[case::odd_segments(7)]
#[case::single_segment(128)]
fn test_someiptp_loopback(#[case] segment: usize) {
    let s = stack(segment);
    let payload: Vec<u8> = (0u8..40).collect();

    s.tp.write(&payload).unwrap();
    assert_eq!(s.router.transmit_count(), 1);
    assert!(!s.tp.is_busy());

    let mut out = [0u8; 64];
    let len = s.tp.read(&mut out).unwrap();
    assert_eq!(&out[..len], payload.as_slice());
    assert_eq!(s.tp.read(&mut out), Err(RteError::NoData));
    assert!(s.det.errors().is_empty());
}

#[test]
fn test_someiptp_consecutive_payloads() {
    let s = stack(16);
    let mut out = [0u8; 64];
    for round in 0u8..4 {
        let payload = vec![round; usize::from(round) + 1];
        s.tp.write(&payload).unwrap();
        assert_eq!(s.tp.read(&mut out), Ok(payload.len()));
        assert_eq!(&out[..payload.len()], payload.as_slice());
    }
    // Only the newest payload is kept when the reader falls behind
    s.tp.write(&[0xA1]).unwrap();
    s.tp.write(&[0xB2, 0xB2]).unwrap();
    assert_eq!(s.tp.read(&mut out), Ok(2));
    assert_eq!(&out[..2], &[0xB2, 0xB2]);
}

#[test]
fn test_someiptp_limits() {
    let s = stack(16);
    assert_eq!(
        s.tp.write(&[0u8; 65]),
        Err(RteError::Limit { len: 65, limit: 64 })
    );
    s.tp.write(&[0u8; 64]).unwrap();
    let mut small = [0u8; 10];
    assert_eq!(
        s.tp.read(&mut small),
        Err(RteError::Limit { len: 64, limit: 10 })
    );
}

#[test]
fn test_someiptp_uninitialised_ldcom() {
    let s = stack(16);
    s.ldcom.deinit();
    assert_eq!(s.tp.write(&[1, 2, 3]), Err(RteError::ComStopped));
    assert!(!s.tp.is_busy());
    assert!(s
        .det
        .contains(ModuleId::LDCOM, service::TRANSMIT, det_code::UNINIT));
    assert_eq!(s.router.transmit_count(), 0);
}
