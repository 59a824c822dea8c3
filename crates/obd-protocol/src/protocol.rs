//! ISO-TP (ISO 15765-2) framing
//!
//! Only the parts the poller needs: classify a received frame by its
//! protocol control information and build the flow control reply.

use crate::frame::CanFrame;

/// Flow control: continue to send, no block limit, 25 ms separation time
const FLOW_CONTROL_CTS: [u8; 8] = [0x30, 0x00, 0x19, 0, 0, 0, 0, 0];

/// A received ISO-TP frame, borrowing the payload of the CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoTpFrame<'a> {
    /// Complete message in one frame
    Single { len: u8, data: &'a [u8] },
    /// Start of a segmented message
    First { total: u16, data: &'a [u8] },
    /// Continuation of a segmented message
    Consecutive { seq: u8, data: &'a [u8] },
    /// Flow control sent by the receiving side
    FlowControl { status: u8, block_size: u8, st_min: u8 },
}

impl<'a> IsoTpFrame<'a> {
    /// Classify `payload` by its PCI nibble. Returns `None` for empty or
    /// reserved frames.
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        let pci = *payload.first()?;
        match pci >> 4 {
            0x0 => Some(IsoTpFrame::Single {
                len: pci & 0x0F,
                data: &payload[1..],
            }),
            0x1 if payload.len() >= 2 => Some(IsoTpFrame::First {
                total: (u16::from(pci & 0x0F) << 8) | u16::from(payload[1]),
                data: &payload[2..],
            }),
            0x2 => Some(IsoTpFrame::Consecutive {
                seq: pci & 0x0F,
                data: &payload[1..],
            }),
            0x3 if payload.len() >= 3 => Some(IsoTpFrame::FlowControl {
                status: pci & 0x0F,
                block_size: payload[1],
                st_min: payload[2],
            }),
            _ => None,
        }
    }
}

/// Flow control frame addressed to `id`
pub fn flow_control_frame(id: u16) -> CanFrame {
    CanFrame::padded(id, FLOW_CONTROL_CTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let payload = [0x04, 0x41, 0x0D, 0x32, 0x00];
        match IsoTpFrame::parse(&payload) {
            Some(IsoTpFrame::Single { len, data }) => {
                assert_eq!(len, 4);
                assert_eq!(&data[..3], &[0x41, 0x0D, 0x32]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_first_and_consecutive() {
        let first = [0x10, 0x14, 0x49, 0x02, 0x01, 0x57, 0x30, 0x4C];
        assert!(matches!(
            IsoTpFrame::parse(&first),
            Some(IsoTpFrame::First { total: 0x14, .. })
        ));
        let next = [0x21, 0x30, 0x30, 0x30, 0x30, 0x34, 0x33, 0x4D];
        assert!(matches!(
            IsoTpFrame::parse(&next),
            Some(IsoTpFrame::Consecutive { seq: 1, .. })
        ));
    }

    #[test]
    fn test_reserved_and_empty() {
        assert_eq!(IsoTpFrame::parse(&[]), None);
        assert_eq!(IsoTpFrame::parse(&[0x40, 0x00]), None);
        assert_eq!(IsoTpFrame::parse(&[0x10]), None);
    }

    #[test]
    fn test_flow_control_layout() {
        let frame = flow_control_frame(0x7E0);
        assert_eq!(frame.id, 0x7E0);
        assert_eq!(frame.data, [0x30, 0x00, 0x19, 0, 0, 0, 0, 0]);
        assert_eq!(
            IsoTpFrame::parse(frame.payload()),
            Some(IsoTpFrame::FlowControl {
                status: 0,
                block_size: 0,
                st_min: 0x19
            })
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_parse_never_panics(payload in proptest::collection::vec(proptest::num::u8::ANY, 0..=8)) {
            let _ = IsoTpFrame::parse(&payload);
        }
    }
}
