//! MP-0 message codec
//!
//! Outbound: text in the scratch buffer, optional paranoid envelope,
//! transport RC4, base64 and a CRLF terminator. Inbound is the inverse.
//! All buffers are fixed size and reused for every message.

use crate::error::RelayError;
use crate::reports::{render, Report, ReportSource};
use crate::session::Session;
use crate::transport::Transport;
use relay_crypto::{crc16, decode_into, encode_into, encoded_len};
use std::fmt::{self, Write};
use tracing::debug;

/// Message text capacity, prefix included
pub const MSG_CAPACITY: usize = 256;

/// Paranoid staging capacity: one message body
pub const STAGING_CAPACITY: usize = MSG_CAPACITY;

/// Prefix of every application message
pub const MSG_PREFIX: &str = "MP-0 ";

/// Prefix of a paranoid envelope
const PARANOID_PREFIX: &[u8] = b"MP-0 EM";

/// Plain text before transport encryption. A paranoid envelope carries
/// the body in base64, so it outgrows the scratch text by a third.
const PLAIN_CAPACITY: usize = PARANOID_PREFIX.len() + 1 + b64_len(STAGING_CAPACITY);

/// Base64 of a full plain buffer
const WIRE_CAPACITY: usize = b64_len(PLAIN_CAPACITY);

const fn b64_len(len: usize) -> usize {
    (len + 2) / 3 * 4
}

/// Message types that bypass the paranoid layer
const PARANOID_EXEMPT: &[u8] = b"EAagP";

/// Text buffer messages are composed in
pub type Scratch = heapless::String<MSG_CAPACITY>;

/// Transmission policy for change-gated reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Send unconditionally; the transport frame is already open
    Force = 0,
    /// Send if changed; the transport frame is already open
    Changed = 1,
    /// Send if changed, opening the transport frame on the first change
    ChangedLazy = 2,
}

pub struct MessageCodec {
    text: Scratch,
    plain: [u8; PLAIN_CAPACITY],
    staging: [u8; STAGING_CAPACITY],
    wire: [u8; WIRE_CAPACITY],
    crcs: [Option<u16>; Report::SLOTS],
    firmware: &'static str,
}

impl std::fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCodec")
            .field("firmware", &self.firmware)
            .field("crcs", &self.crcs)
            .finish_non_exhaustive()
    }
}

impl MessageCodec {
    pub fn new(firmware: &'static str) -> Self {
        Self {
            text: Scratch::new(),
            plain: [0; PLAIN_CAPACITY],
            staging: [0; STAGING_CAPACITY],
            wire: [0; WIRE_CAPACITY],
            crcs: [None; Report::SLOTS],
            firmware,
        }
    }

    pub fn firmware(&self) -> &'static str {
        self.firmware
    }

    /// The message currently in the scratch buffer
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Compose `MP-0 ` followed by whatever `body` writes.
    /// Fails when the text does not fit.
    pub fn compose<F>(&mut self, body: F) -> Result<(), RelayError>
    where
        F: FnOnce(&mut Scratch) -> fmt::Result,
    {
        self.text.clear();
        self.text
            .push_str(MSG_PREFIX)
            .map_err(|_| RelayError::Overflow(MSG_CAPACITY))?;
        body(&mut self.text).map_err(|_| RelayError::Overflow(MSG_CAPACITY))
    }

    /// Compose `MP-0 <head><tail>`, cutting `tail` off at capacity
    pub fn compose_truncated(&mut self, head: &str, tail: &str) -> Result<(), RelayError> {
        self.compose(|out| out.write_str(head))?;
        self.extend_truncated(tail.chars());
        Ok(())
    }

    /// Append characters to the scratch text until it is full
    pub fn extend_truncated<I: IntoIterator<Item = char>>(&mut self, chars: I) {
        for c in chars {
            if self.text.push(c).is_err() {
                break;
            }
        }
    }

    /// Forget every previous render, so the next change-gated report is sent
    pub fn reset_changes(&mut self) {
        self.crcs = [None; Report::SLOTS];
    }

    /// Render a report and send it according to `mode`.
    ///
    /// Returns the mode to chain into the next report: a lazily opened
    /// frame turns `ChangedLazy` into `Changed`, so the caller closes the
    /// frame only when the returned mode differs from `ChangedLazy`.
    pub fn report(
        &mut self,
        report: Report,
        mode: ReportMode,
        src: &ReportSource<'_>,
        session: &mut Session,
        transport: &mut dyn Transport,
    ) -> Result<ReportMode, RelayError> {
        let Some(slot) = report.slot() else {
            return Ok(mode);
        };

        self.text.clear();
        self.text
            .push_str(MSG_PREFIX)
            .map_err(|_| RelayError::Overflow(MSG_CAPACITY))?;
        let present =
            render(&mut self.text, report, src).map_err(|_| RelayError::Overflow(MSG_CAPACITY))?;
        if !present {
            return Ok(mode);
        }

        let crc = crc16(self.text.as_bytes());
        if mode != ReportMode::Force && self.crcs[slot] == Some(crc) {
            return Ok(mode);
        }

        let mode = if mode == ReportMode::ChangedLazy {
            transport.begin()?;
            ReportMode::Changed
        } else {
            mode
        };
        self.send(session, transport)?;
        self.crcs[slot] = Some(crc);
        Ok(mode)
    }

    /// Encode the scratch text and write it as one line
    pub fn send(&mut self, session: &mut Session, transport: &mut dyn Transport) -> Result<(), RelayError> {
        let mut len = self.text.len();
        self.plain[..len].copy_from_slice(self.text.as_bytes());

        if len > MSG_PREFIX.len() && session.paranoid_active() {
            let code = self.plain[MSG_PREFIX.len()];
            if !PARANOID_EXEMPT.contains(&code) {
                len = self.wrap_paranoid(len, session)?;
            }
        }

        session.encrypt(&mut self.plain[..len])?;
        let n = encode_into(&self.plain[..len], &mut self.wire)?;
        transport.write(&self.wire[..n])?;
        transport.write(b"\r\n")?;
        Ok(())
    }

    /// Replace `MP-0 <code><body>` with `MP-0 EM<code><base64(rc4(body))>`
    fn wrap_paranoid(&mut self, len: usize, session: &Session) -> Result<usize, RelayError> {
        let Some(mut cipher) = session.paranoid_cipher()? else {
            return Ok(len);
        };
        let code = self.plain[MSG_PREFIX.len()];
        let body = &self.plain[MSG_PREFIX.len() + 1..len];
        let body_len = body.len();
        self.staging[..body_len].copy_from_slice(body);
        cipher.apply_keystream(&mut self.staging[..body_len]);

        let head = PARANOID_PREFIX.len() + 1;
        if head + encoded_len(body_len) > PLAIN_CAPACITY {
            return Err(RelayError::Overflow(head + encoded_len(body_len)));
        }
        self.plain[..PARANOID_PREFIX.len()].copy_from_slice(PARANOID_PREFIX);
        self.plain[PARANOID_PREFIX.len()] = code;
        let n = encode_into(&self.staging[..body_len], &mut self.plain[head..])?;
        Ok(head + n)
    }

    /// Decode an inbound line into the message body after `MP-0 `.
    ///
    /// A paranoid envelope is opened; its result is `<code><body>`.
    pub fn decode(&mut self, line: &str, session: &mut Session) -> Result<Scratch, RelayError> {
        let n = decode_into(line.as_bytes(), &mut self.plain)?;
        session.decrypt(&mut self.plain[..n])?;

        let text = &self.plain[..n];
        let Some(body) = text.strip_prefix(MSG_PREFIX.as_bytes()) else {
            debug!("Inbound message without prefix ({} bytes)", n);
            return Err(RelayError::BadPrefix);
        };

        let mut out = Scratch::new();
        match body.strip_prefix(b"EM") {
            Some([code, encoded @ ..]) => {
                let m = decode_into(encoded, &mut self.staging)?;
                let mut cipher = session.paranoid_cipher()?.ok_or(RelayError::Malformed)?;
                cipher.apply_keystream(&mut self.staging[..m]);
                let inner =
                    std::str::from_utf8(&self.staging[..m]).map_err(|_| RelayError::Malformed)?;
                out.push(*code as char).map_err(|_| RelayError::Overflow(MSG_CAPACITY))?;
                out.push_str(inner).map_err(|_| RelayError::Overflow(MSG_CAPACITY))?;
            }
            _ => {
                let body = std::str::from_utf8(body).map_err(|_| RelayError::Malformed)?;
                out.push_str(body).map_err(|_| RelayError::Overflow(MSG_CAPACITY))?;
            }
        }
        Ok(out)
    }
}

/// Append as much of `text` as fits
pub(crate) fn push_truncated<const N: usize>(out: &mut heapless::String<N>, text: &str) {
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
}
