//! Relay Protocol
//!
//! The MP-0 conversation between the module and the relay server: the
//! authenticated session, the report and alert codec, and the command
//! dispatcher. The transport, the modem and the text command interpreter
//! are collaborators behind traits.

mod codec;
mod command;
mod error;
mod relay;
mod reports;
mod session;
mod transport;

pub use codec::{MessageCodec, ReportMode, Scratch, MSG_CAPACITY, MSG_PREFIX, STAGING_CAPACITY};
pub use command::{CommandEffects, PendingCommand, COMMAND_ARG_CAPACITY};
pub use error::{CommandError, RelayError, SessionError};
pub use relay::{Relay, RelayEnv, FIRMWARE_VERSION};
pub use reports::{render, render_status_alert, Report, ReportSource};
pub use session::{RegistrationLine, Session, SessionState, REGISTRATION_CAPACITY};
pub use transport::{
    MemoryTransport, Modem, ModemRequest, NoTextCommands, RecordingModem, TextCommandHandler,
    Transport,
};
