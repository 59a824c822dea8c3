//! Host-side collaborators: an outbound byte buffer standing in for the
//! modem's send window, a modem that only logs, and a minimal text shell.

use relay_protocol::{Modem, TextCommandHandler, Transport, FIRMWARE_VERSION};
use std::fmt;
use std::io;
use tracing::info;

/// Collects outbound bytes until the connection task writes them out
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    bytes: Vec<u8>,
}

impl OutboundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Everything buffered so far, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

impl Transport for OutboundBuffer {
    fn begin(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Modem without a radio: requests are logged and succeed
#[derive(Debug, Default)]
pub struct LoggingModem;

impl Modem for LoggingModem {
    fn send_sms(&mut self, number: &str, text: &str) -> io::Result<()> {
        info!("SMS to {}: {}", number, text);
        Ok(())
    }

    fn send_ussd(&mut self, code: &str) -> io::Result<()> {
        info!("USSD {}", code);
        Ok(())
    }

    fn raw_command(&mut self, text: &str) -> io::Result<()> {
        info!("Modem command {}", text);
        Ok(())
    }
}

/// Text commands available through command 7
#[derive(Debug, Default)]
pub struct ModuleShell;

impl TextCommandHandler for ModuleShell {
    fn execute(&mut self, command: &str, reply: &mut dyn fmt::Write) -> bool {
        match command.trim().to_ascii_uppercase().as_str() {
            "VERSION" => write!(reply, "Firmware {}", FIRMWARE_VERSION).is_ok(),
            "HELP" => reply.write_str("Commands: VERSION, HELP").is_ok(),
            _ => false,
        }
    }
}
