//! CAN frame record

use crate::error::ObdError;

/// Highest 11 bit identifier
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Receive channel a frame arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxChannel {
    /// Always active channel (poll responses, primary vehicle bus)
    Primary,
    /// Passive channel, only serviced when the driver asks for it
    Secondary,
}

impl RxChannel {
    /// Both channels in service order
    pub const ALL: [RxChannel; 2] = [RxChannel::Primary, RxChannel::Secondary];

    /// Mailbox index
    pub fn index(self) -> usize {
        match self {
            RxChannel::Primary => 0,
            RxChannel::Secondary => 1,
        }
    }
}

/// A single received or transmitted CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanFrame {
    /// 11 bit identifier
    pub id: u16,
    /// Acceptance filter that matched (receive only)
    pub filter: u8,
    /// Number of valid payload bytes (0..=8)
    pub len: u8,
    /// Payload, zero padded
    pub data: [u8; 8],
}

impl CanFrame {
    /// Build a frame from an identifier and up to 8 payload bytes.
    pub fn new(id: u16, payload: &[u8]) -> Result<Self, ObdError> {
        if id > MAX_STANDARD_ID {
            return Err(ObdError::InvalidIdentifier(id));
        }
        if payload.len() > 8 {
            return Err(ObdError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            filter: 0,
            len: payload.len() as u8,
            data,
        })
    }

    /// Full 8 byte frame (requests are always padded to 8).
    pub fn padded(id: u16, data: [u8; 8]) -> Self {
        Self {
            id: id & MAX_STANDARD_ID,
            filter: 0,
            len: 8,
            data,
        }
    }

    /// Tag the acceptance filter that matched.
    pub fn with_filter(mut self, filter: u8) -> Self {
        self.filter = filter;
        self
    }

    /// Valid payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len.min(8))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bounds() {
        assert!(CanFrame::new(0x7DF, &[0x02, 0x01, 0x0D]).is_ok());
        assert_eq!(
            CanFrame::new(0x800, &[]),
            Err(ObdError::InvalidIdentifier(0x800))
        );
        assert_eq!(
            CanFrame::new(0x100, &[0; 9]),
            Err(ObdError::PayloadTooLong(9))
        );
    }

    #[test]
    fn test_payload_respects_length() {
        let frame = CanFrame::new(0x100, &[1, 2, 3]).unwrap();
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(frame.data, [1, 2, 3, 0, 0, 0, 0, 0]);
    }
}
