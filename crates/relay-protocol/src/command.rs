//! Server command dispatch
//!
//! Commands arrive as `C<code>,<args>`. The vehicle driver sees every
//! command first; the generic table below handles what it declines.
//! Replies are `c<code>,<status>[,<data>]`.

use crate::codec::{push_truncated, MSG_CAPACITY};
use crate::error::{CommandError, RelayError};
use crate::relay::{Relay, RelayEnv};
use crate::reports::render_status_alert;
use bitflags::bitflags;
use std::fmt::Write;
use storage::{param, PARAM_MAX};
use tracing::{debug, info, warn};
use vehicle::{CommandStatus, FEATURES_MAX, FEATURE_CANWRITE};

/// Longest argument text kept for a command
pub const COMMAND_ARG_CAPACITY: usize = 100;

bitflags! {
    /// Side effects of a command the owner must act on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandEffects: u8 {
        /// The driver was re-initialised
        const REINITIALISE_DRIVER = 0x01;
        /// The module must restart
        const REBOOT = 0x02;
    }
}

/// The single outstanding command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub code: i32,
    pub args: heapless::String<COMMAND_ARG_CAPACITY>,
}

impl PendingCommand {
    /// Parse `<code>[,<args>]`. A missing or bad code reads as 0.
    pub fn parse(text: &str) -> Self {
        let (code, args) = text.split_once(',').unwrap_or((text, ""));
        let mut kept = heapless::String::new();
        push_truncated(&mut kept, args);
        Self {
            code: leading_int(code),
            args: kept,
        }
    }
}

/// Integer prefix of `text`, 0 if there is none
fn leading_int(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |acc, d| acc.wrapping_mul(10).wrapping_add(i32::from(d - b'0')));
    if negative {
        -value
    } else {
        value
    }
}

/// Parse `<index>,<value>`, the value being everything after the comma
fn index_and_value(args: &str) -> Result<(usize, &str), CommandError> {
    let (index, value) = args.split_once(',').ok_or(CommandError::InvalidSyntax)?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| CommandError::InvalidSyntax)?;
    Ok((index, value))
}

/// Command 7 output: newlines become CR, commas become semicolons
fn escape_output(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().map(|c| match c {
        '\n' => '\r',
        ',' => ';',
        other => other,
    })
}

impl Relay {
    /// Run the pending command, if any, and clear it
    pub(crate) fn run_pending(&mut self, env: &mut RelayEnv<'_>) -> Result<CommandEffects, RelayError> {
        let Some(command) = self.pending.take() else {
            return Ok(CommandEffects::empty());
        };
        debug!("Command {} '{}'", command.code, command.args);

        env.transport.begin()?;
        let result = self.dispatch(&command, env);
        env.transport.commit()?;
        let effects = result?;

        if effects.contains(CommandEffects::REINITIALISE_DRIVER) {
            env.vehicle.reinitialise(&*env.store);
        }
        Ok(effects)
    }

    fn dispatch(
        &mut self,
        command: &PendingCommand,
        env: &mut RelayEnv<'_>,
    ) -> Result<CommandEffects, RelayError> {
        let code = command.code;
        if let Some(reply) = env.vehicle.handle_command(true, code, &command.args) {
            self.codec.compose(|out| {
                write!(out, "c{},{}", code, reply.status.code())?;
                if !reply.data.is_empty() {
                    write!(out, ",{}", reply.data)?;
                }
                Ok(())
            })?;
            self.codec.send(&mut self.session, env.transport)?;
            return Ok(CommandEffects::empty());
        }

        let args = command.args.as_str();
        let outcome = match code {
            1 => self.list_features(env).map(|_| CommandEffects::empty()),
            2 => self.set_feature(args, env),
            3 => self.list_parameters(env).map(|_| CommandEffects::empty()),
            4 => self.set_parameter(args, env),
            5 => {
                info!("Reboot requested by server");
                Ok(CommandEffects::REBOOT)
            }
            6 => self.status_alert(env).map(|_| CommandEffects::empty()),
            7 => self.text_command(args, env),
            40 => self.send_sms(args, env),
            41 => self.send_ussd(args, env),
            49 => self.raw_modem_command(args, env),
            _ => Err(CommandError::Unimplemented.into()),
        };

        match outcome {
            Ok(effects) => {
                // Listings and command 7 write their own replies
                if !matches!(code, 1 | 3 | 7) {
                    self.reply(code, CommandStatus::Ok, "", env)?;
                }
                Ok(effects)
            }
            Err(CommandFailure::Command(err)) => {
                let status = match err {
                    CommandError::Unimplemented => CommandStatus::Unimplemented,
                    _ => CommandStatus::Error,
                };
                debug!("Command {} failed: {}", code, err);
                let reason = if status == CommandStatus::Error {
                    err.to_string()
                } else {
                    String::new()
                };
                self.reply(code, status, &reason, env)?;
                Ok(CommandEffects::empty())
            }
            Err(CommandFailure::Relay(err)) => Err(err),
        }
    }

    fn reply(
        &mut self,
        code: i32,
        status: CommandStatus,
        data: &str,
        env: &mut RelayEnv<'_>,
    ) -> Result<(), RelayError> {
        self.codec.compose(|out| {
            write!(out, "c{},{}", code, status.code())?;
            if !data.is_empty() {
                out.write_char(',')?;
            }
            Ok(())
        })?;
        self.codec.extend_truncated(data.chars());
        self.codec.send(&mut self.session, env.transport)
    }

    fn list_features(&mut self, env: &mut RelayEnv<'_>) -> Result<(), CommandFailure> {
        for (index, value) in env.vehicle.context().features.iter() {
            self.codec
                .compose(|out| write!(out, "c1,0,{},{},{}", index, FEATURES_MAX, value))?;
            self.codec.send(&mut self.session, env.transport)?;
        }
        Ok(())
    }

    fn set_feature(&mut self, args: &str, env: &mut RelayEnv<'_>) -> Result<CommandEffects, CommandFailure> {
        let (index, value) = index_and_value(args)?;
        if index >= FEATURES_MAX {
            return Err(CommandError::OutOfRange.into());
        }
        let value = leading_int(value);

        env.vehicle
            .context_mut()
            .features
            .set(index, value, &mut *env.store)
            .map_err(|err| CommandError::Failed(err.to_string()))?;
        info!("Feature {} set to {}", index, value);

        if index == FEATURE_CANWRITE {
            Ok(CommandEffects::REINITIALISE_DRIVER)
        } else {
            Ok(CommandEffects::empty())
        }
    }

    fn list_parameters(&mut self, env: &mut RelayEnv<'_>) -> Result<(), CommandFailure> {
        for index in 0..PARAM_MAX {
            let value = match index {
                param::MODULEPASS | param::SERVERPASS => "",
                _ => env.store.get(index),
            };
            self.codec
                .compose(|out| write!(out, "c3,0,{},{},{}", index, PARAM_MAX, value))?;
            self.codec.send(&mut self.session, env.transport)?;
        }
        Ok(())
    }

    fn set_parameter(&mut self, args: &str, env: &mut RelayEnv<'_>) -> Result<CommandEffects, CommandFailure> {
        let (index, value) = index_and_value(args)?;
        if index >= param::WRITABLE_LIMIT {
            return Err(CommandError::OutOfRange.into());
        }
        if index < param::AUTH_PARAMS && value.is_empty() {
            return Err(CommandError::OutOfRange.into());
        }
        env.store.set(index, value).map_err(|err| {
            warn!("Parameter {} rejected: {}", index, err);
            CommandError::OutOfRange
        })?;
        info!("Parameter {} updated", index);

        match index {
            param::MILESKM | param::VEHICLETYPE => Ok(CommandEffects::REINITIALISE_DRIVER),
            _ => Ok(CommandEffects::empty()),
        }
    }

    fn status_alert(&mut self, env: &mut RelayEnv<'_>) -> Result<(), CommandFailure> {
        let ctx = env.vehicle.context();
        self.codec.compose(|out| {
            out.write_str("PA")?;
            render_status_alert(out, ctx)
        })?;
        self.codec.send(&mut self.session, env.transport)?;
        Ok(())
    }

    fn text_command(&mut self, args: &str, env: &mut RelayEnv<'_>) -> Result<CommandEffects, CommandFailure> {
        if args.is_empty() {
            return Err(CommandError::InvalidSyntax.into());
        }
        let mut output = heapless::String::<MSG_CAPACITY>::new();
        if !env.text.execute(args, &mut output) {
            return Err(CommandError::Failed("Unknown command".to_owned()).into());
        }

        self.codec.compose(|out| out.write_str("c7,0,"))?;
        self.codec.extend_truncated(escape_output(&output));
        self.codec.send(&mut self.session, env.transport)?;
        Ok(CommandEffects::empty())
    }

    fn send_sms(&mut self, args: &str, env: &mut RelayEnv<'_>) -> Result<CommandEffects, CommandFailure> {
        let (number, text) = args.split_once(',').ok_or(CommandError::InvalidSyntax)?;
        if number.is_empty() || text.is_empty() {
            return Err(CommandError::InvalidSyntax.into());
        }
        env.modem
            .send_sms(number, text)
            .map_err(|err| CommandError::Failed(err.to_string()))?;
        Ok(CommandEffects::empty())
    }

    fn send_ussd(&mut self, args: &str, env: &mut RelayEnv<'_>) -> Result<CommandEffects, CommandFailure> {
        if args.is_empty() {
            return Err(CommandError::InvalidSyntax.into());
        }
        env.modem
            .send_ussd(args)
            .map_err(|err| CommandError::Failed(err.to_string()))?;
        Ok(CommandEffects::empty())
    }

    fn raw_modem_command(
        &mut self,
        args: &str,
        env: &mut RelayEnv<'_>,
    ) -> Result<CommandEffects, CommandFailure> {
        if args.is_empty() {
            return Err(CommandError::InvalidSyntax.into());
        }
        env.modem
            .raw_command(args)
            .map_err(|err| CommandError::Failed(err.to_string()))?;
        Ok(CommandEffects::empty())
    }
}

/// A command either fails inline or takes the link down with it
enum CommandFailure {
    Command(CommandError),
    Relay(RelayError),
}

impl From<CommandError> for CommandFailure {
    fn from(err: CommandError) -> Self {
        CommandFailure::Command(err)
    }
}

impl From<RelayError> for CommandFailure {
    fn from(err: RelayError) -> Self {
        CommandFailure::Relay(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let cmd = PendingCommand::parse("4,2,K");
        assert_eq!(cmd.code, 4);
        assert_eq!(cmd.args.as_str(), "2,K");

        let cmd = PendingCommand::parse("1");
        assert_eq!(cmd.code, 1);
        assert!(cmd.args.is_empty());

        assert_eq!(PendingCommand::parse("x,1").code, 0);
    }

    #[test]
    fn test_parse_truncates_args() {
        let long = "y".repeat(300);
        let cmd = PendingCommand::parse(&format!("7,{}", long));
        assert_eq!(cmd.args.len(), COMMAND_ARG_CAPACITY);
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("42abc"), 42);
        assert_eq!(leading_int("-7"), -7);
        assert_eq!(leading_int(" 12"), 12);
        assert_eq!(leading_int(""), 0);
    }

    #[test]
    fn test_index_and_value() {
        assert_eq!(index_and_value("2,K"), Ok((2, "K")));
        assert_eq!(index_and_value("0,"), Ok((0, "")));
        assert_eq!(index_and_value("x,1"), Err(CommandError::InvalidSyntax));
        assert_eq!(index_and_value("5"), Err(CommandError::InvalidSyntax));
    }

    #[test]
    fn test_escape_output() {
        let escaped: String = escape_output("a,b\nc").collect();
        assert_eq!(escaped, "a;b\rc");
    }

    proptest::proptest! {
        #[test]
        fn prop_parse_keeps_code(code in 0i32..100_000, args in "[ -~]{0,40}") {
            let cmd = PendingCommand::parse(&format!("{},{}", code, args));
            proptest::prop_assert_eq!(cmd.code, code);
            proptest::prop_assert_eq!(cmd.args.as_str(), args.as_str());
        }
    }
}
