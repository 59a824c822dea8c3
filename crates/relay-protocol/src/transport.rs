//! Collaborators outside the protocol: the relay link, the cellular modem
//! and the local text command interpreter.

use std::fmt;
use std::io;

/// Line transport to the relay server.
///
/// Messages are written between `begin` and `commit`, which bracket one
/// transmission frame. The registration line is written outside a frame.
pub trait Transport {
    fn begin(&mut self) -> io::Result<()>;
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn commit(&mut self) -> io::Result<()>;
}

/// Cellular modem services used by commands 40, 41 and 49
pub trait Modem {
    fn send_sms(&mut self, number: &str, text: &str) -> io::Result<()>;
    /// Start a USSD request; the result arrives later
    fn send_ussd(&mut self, code: &str) -> io::Result<()>;
    fn raw_command(&mut self, text: &str) -> io::Result<()>;
}

/// Interpreter for the SMS style text commands wrapped by command 7
pub trait TextCommandHandler {
    /// Run `command`, writing its reply to `reply`.
    /// Returns false for unknown commands.
    fn execute(&mut self, command: &str, reply: &mut dyn fmt::Write) -> bool;
}

/// Transport that keeps everything written to it
#[derive(Debug, Default)]
pub struct MemoryTransport {
    buffer: Vec<u8>,
    open: bool,
    frames_opened: usize,
    frames_committed: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete lines written so far, terminators removed
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer)
            .split_terminator("\r\n")
            .map(str::to_owned)
            .collect()
    }

    /// Raw bytes written so far
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn frames_opened(&self) -> usize {
        self.frames_opened
    }

    pub fn frames_committed(&self) -> usize {
        self.frames_committed
    }

    /// Whether a frame is open
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Transport for MemoryTransport {
    fn begin(&mut self) -> io::Result<()> {
        if self.open {
            return Err(io::Error::new(io::ErrorKind::Other, "frame already open"));
        }
        self.open = true;
        self.frames_opened += 1;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::Other, "no frame open"));
        }
        self.open = false;
        self.frames_committed += 1;
        Ok(())
    }
}

/// Something the modem was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemRequest {
    Sms { number: String, text: String },
    Ussd(String),
    Raw(String),
}

/// Modem that records requests and optionally fails them
#[derive(Debug, Default)]
pub struct RecordingModem {
    pub requests: Vec<ModemRequest>,
    pub fail: bool,
}

impl RecordingModem {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, request: ModemRequest) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "modem busy"));
        }
        self.requests.push(request);
        Ok(())
    }
}

impl Modem for RecordingModem {
    fn send_sms(&mut self, number: &str, text: &str) -> io::Result<()> {
        self.record(ModemRequest::Sms {
            number: number.to_owned(),
            text: text.to_owned(),
        })
    }

    fn send_ussd(&mut self, code: &str) -> io::Result<()> {
        self.record(ModemRequest::Ussd(code.to_owned()))
    }

    fn raw_command(&mut self, text: &str) -> io::Result<()> {
        self.record(ModemRequest::Raw(text.to_owned()))
    }
}

/// Text command handler that knows no commands
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTextCommands;

impl TextCommandHandler for NoTextCommands {
    fn execute(&mut self, _command: &str, _reply: &mut dyn fmt::Write) -> bool {
        false
    }
}
