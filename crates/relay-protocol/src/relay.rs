//! The relay engine: what the module says to the server and when

use crate::codec::{MessageCodec, ReportMode};
use crate::command::{CommandEffects, PendingCommand};
use crate::error::RelayError;
use crate::reports::{render_status_alert, Report, ReportSource};
use crate::session::Session;
use crate::transport::{Modem, TextCommandHandler, Transport};
use relay_crypto::{Token, TokenGenerator};
use std::fmt::Write;
use storage::{param, ParameterStore};
use tracing::{debug, info, warn};
use vehicle::{Notify, Vehicle};

/// Prefix of the server welcome
const WELCOME_PREFIX: &str = "MP-S 0 ";

/// Forwarded SMS text is cut to this many characters
const SMS_FORWARD_LIMIT: usize = 70;

/// Firmware version reported in `F`
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the relay reads or drives, borrowed for one call
pub struct RelayEnv<'a> {
    pub vehicle: &'a mut Vehicle,
    pub store: &'a mut dyn ParameterStore,
    pub transport: &'a mut dyn Transport,
    pub modem: &'a mut dyn Modem,
    pub text: &'a mut dyn TextCommandHandler,
}

#[derive(Debug)]
pub struct Relay {
    pub(crate) session: Session,
    pub(crate) codec: MessageCodec,
    pub(crate) pending: Option<PendingCommand>,
    apps_connected: bool,
}

impl Relay {
    pub fn new(tokens: TokenGenerator) -> Self {
        Self {
            session: Session::new(tokens),
            codec: MessageCodec::new(FIRMWARE_VERSION),
            pending: None,
            apps_connected: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Whether the server reported connected client apps
    pub fn apps_connected(&self) -> bool {
        self.apps_connected
    }

    /// The command waiting to run, if any
    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Send the registration line with a fresh token from `tokens`
    pub fn register(
        &mut self,
        tokens: TokenGenerator,
        store: &dyn ParameterStore,
        transport: &mut dyn Transport,
    ) -> Result<(), RelayError> {
        self.session.reseed(tokens);
        let line = self
            .session
            .register(store.get(param::SERVERPASS), store.get(param::VEHICLEID))?;
        self.write_registration(&line, transport)
    }

    /// Send the registration line for a fixed client token
    pub fn register_with_token(
        &mut self,
        token: Token,
        store: &dyn ParameterStore,
        transport: &mut dyn Transport,
    ) -> Result<(), RelayError> {
        let line = self.session.register_with_token(
            token,
            store.get(param::SERVERPASS),
            store.get(param::VEHICLEID),
        )?;
        self.write_registration(&line, transport)
    }

    fn write_registration(&mut self, line: &str, transport: &mut dyn Transport) -> Result<(), RelayError> {
        self.apps_connected = false;
        self.pending = None;
        self.codec.reset_changes();
        transport.write(line.as_bytes())?;
        transport.write(b"\r\n")?;
        info!("Registration sent");
        Ok(())
    }

    /// The link went down
    pub fn on_disconnected(&mut self) {
        self.session.reset();
        self.apps_connected = false;
        self.pending = None;
        info!("Relay disconnected");
    }

    /// Handle one line from the server.
    ///
    /// `BadPrefix` means the link must be dropped.
    pub fn on_line(&mut self, line: &str, env: &mut RelayEnv<'_>) -> Result<CommandEffects, RelayError> {
        let line = line.trim_end();
        if !self.session.is_authenticated() {
            match line.strip_prefix(WELCOME_PREFIX) {
                Some(body) => self.on_welcome(body, env)?,
                None => debug!("Ignoring unauthenticated line"),
            }
            return Ok(CommandEffects::empty());
        }

        let message = self.codec.decode(line, &mut self.session)?;
        let mut chars = message.chars();
        match chars.next() {
            Some('A') => {
                self.frame(env.transport, |out| out.write_char('a'))?;
            }
            Some('Z') => {
                self.apps_connected = !matches!(chars.next(), Some('0') | None);
                info!("Client apps connected: {}", self.apps_connected);
                if self.apps_connected {
                    self.send_burst(env)?;
                }
            }
            Some('C') => {
                if self.pending.is_some() {
                    warn!("Command arrived with one outstanding, replacing it");
                }
                self.pending = Some(PendingCommand::parse(chars.as_str()));
                return self.run_pending(env);
            }
            _ => debug!("Ignoring message '{}'", message),
        }
        Ok(CommandEffects::empty())
    }

    fn on_welcome(&mut self, body: &str, env: &mut RelayEnv<'_>) -> Result<(), RelayError> {
        if let Err(err) = self.session.welcome(body, env.store.get(param::SERVERPASS)) {
            warn!("Server welcome rejected: {}", err);
            return Ok(());
        }

        if env.store.get(param::PARANOID).starts_with('P') {
            let token = self.session.enable_paranoid(env.store.get(param::MODULEPASS));
            self.frame(env.transport, |out| write!(out, "ET{}", token))?;
            info!("Paranoid mode enabled");
        } else {
            self.session.disable_paranoid();
        }
        Ok(())
    }

    /// Compose one message and send it in its own transport frame
    fn frame<F>(&mut self, transport: &mut dyn Transport, body: F) -> Result<(), RelayError>
    where
        F: FnOnce(&mut crate::codec::Scratch) -> std::fmt::Result,
    {
        self.codec.compose(body)?;
        transport.begin()?;
        let sent = self.codec.send(&mut self.session, transport);
        transport.commit()?;
        sent
    }

    /// Every report, unconditionally, in one frame
    fn send_burst(&mut self, env: &mut RelayEnv<'_>) -> Result<(), RelayError> {
        let src = ReportSource {
            ctx: env.vehicle.context(),
            store: &*env.store,
            firmware: self.codec.firmware(),
        };
        env.transport.begin()?;
        let mut result = Ok(ReportMode::Force);
        for report in Report::BURST {
            result = self
                .codec
                .report(report, ReportMode::Force, &src, &mut self.session, env.transport);
            if result.is_err() {
                break;
            }
        }
        env.transport.commit()?;
        result.map(|_| ())
    }

    /// Send whichever of S, D, L, W and the group reports changed, in one
    /// frame opened only if something did. Returns whether anything was sent.
    pub fn send_reports(&mut self, env: &mut RelayEnv<'_>) -> Result<bool, RelayError> {
        if !self.session.is_authenticated() {
            return Ok(false);
        }
        let mut reports = vec![Report::Stat, Report::Environment, Report::Gps, Report::Tpms];
        reports.extend((0..param::GROUPS.len()).map(Report::Group));
        self.send_changed(&reports, env)
    }

    /// Stream the location while apps watch and streaming is enabled
    pub fn stream_location(&mut self, env: &mut RelayEnv<'_>) -> Result<bool, RelayError> {
        if !self.session.is_authenticated()
            || !self.apps_connected
            || !env.vehicle.context().features.stream()
        {
            return Ok(false);
        }
        self.send_changed(&[Report::Gps], env)
    }

    fn send_changed(&mut self, reports: &[Report], env: &mut RelayEnv<'_>) -> Result<bool, RelayError> {
        let src = ReportSource {
            ctx: env.vehicle.context(),
            store: &*env.store,
            firmware: self.codec.firmware(),
        };
        let mut mode = ReportMode::ChangedLazy;
        let mut result = Ok(());
        for &report in reports {
            match self
                .codec
                .report(report, mode, &src, &mut self.session, env.transport)
            {
                Ok(next) => mode = next,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        let opened = mode != ReportMode::ChangedLazy;
        if opened {
            env.transport.commit()?;
        }
        result.map(|_| opened)
    }

    /// Send pending status and environment notifications, then clear them
    pub fn send_notifications(&mut self, env: &mut RelayEnv<'_>) -> Result<(), RelayError> {
        if !self.session.is_authenticated() {
            return Ok(());
        }
        let notify = env.vehicle.context_mut().take_notifications();
        if notify.contains(Notify::STATUS) {
            self.send_status_alert(env)?;
        }
        if notify.contains(Notify::ENVIRONMENT) {
            let src = ReportSource {
                ctx: env.vehicle.context(),
                store: &*env.store,
                firmware: self.codec.firmware(),
            };
            env.transport.begin()?;
            let sent = self.codec.report(
                Report::Environment,
                ReportMode::Force,
                &src,
                &mut self.session,
                env.transport,
            );
            env.transport.commit()?;
            sent?;
        }
        Ok(())
    }

    /// `PA` alert with the charge status
    pub fn send_status_alert(&mut self, env: &mut RelayEnv<'_>) -> Result<(), RelayError> {
        if !self.session.is_authenticated() {
            return Ok(());
        }
        let ctx = env.vehicle.context();
        self.frame(env.transport, |out| {
            out.write_str("PA")?;
            render_status_alert(out, ctx)
        })
    }

    /// `PA` alert with free text, truncated to fit
    pub fn send_alert(&mut self, text: &str, transport: &mut dyn Transport) -> Result<(), RelayError> {
        if !self.session.is_authenticated() {
            debug!("Alert dropped, not connected");
            return Ok(());
        }
        self.codec.compose_truncated("PA", text)?;
        self.send_framed(transport)
    }

    /// Forward an incoming SMS as an alert
    pub fn forward_sms(
        &mut self,
        caller: &str,
        text: &str,
        transport: &mut dyn Transport,
    ) -> Result<(), RelayError> {
        if !self.session.is_authenticated() {
            return Ok(());
        }
        self.codec.compose_truncated("PASMS FROM: ", caller)?;
        self.codec.extend_truncated(" - MSG: ".chars());
        self.codec
            .extend_truncated(text.chars().take(SMS_FORWARD_LIMIT));
        self.send_framed(transport)
    }

    /// `PE` vehicle error code
    pub fn send_error_code(
        &mut self,
        vehicle_type: &str,
        code: u16,
        data: u32,
        transport: &mut dyn Transport,
    ) -> Result<(), RelayError> {
        if !self.session.is_authenticated() {
            return Ok(());
        }
        self.codec
            .compose(|out| write!(out, "PE{},{},{}", vehicle_type, code, data))?;
        self.send_framed(transport)
    }

    /// Second reply to command 41, once the modem has the USSD result
    pub fn ussd_result(&mut self, text: &str, transport: &mut dyn Transport) -> Result<(), RelayError> {
        if !self.session.is_authenticated() {
            return Ok(());
        }
        self.codec.compose_truncated("c41,0,", text)?;
        self.send_framed(transport)
    }

    fn send_framed(&mut self, transport: &mut dyn Transport) -> Result<(), RelayError> {
        transport.begin()?;
        let sent = self.codec.send(&mut self.session, transport);
        transport.commit()?;
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, ModemRequest, RecordingModem};
    use relay_crypto::{decode_into, digest_b64, encode_into, hmac_md5, parse_token, Rc4};
    use storage::SlotStore;
    use vehicle::{
        CommandReply, CommandStatus, FrameCapture, Units, VehicleContext, VehicleDriver,
    };

    const SECRET: &str = "s3cret";

    /// Answers `help`, echoes everything else it is given after `echo `
    struct Shell;

    impl TextCommandHandler for Shell {
        fn execute(&mut self, command: &str, reply: &mut dyn std::fmt::Write) -> bool {
            match command.strip_prefix("echo ") {
                Some(rest) => reply.write_str(rest).is_ok(),
                None => false,
            }
        }
    }

    /// Claims command 1 for itself
    struct ClaimingDriver;

    impl VehicleDriver for ClaimingDriver {
        fn vehicle_type(&self) -> &'static str {
            "XX"
        }

        fn handle_command(
            &mut self,
            _ctx: &mut VehicleContext,
            _msg_mode: bool,
            code: i32,
            _arg: &str,
        ) -> Option<CommandReply> {
            (code == 1).then(|| CommandReply::with_data(CommandStatus::Ok, "driver"))
        }
    }

    struct Harness {
        store: SlotStore,
        vehicle: Vehicle,
        transport: MemoryTransport,
        modem: RecordingModem,
        shell: Shell,
        server_rx: Rc4,
        server_tx: Rc4,
        seen: usize,
    }

    impl Harness {
        fn new(paranoid: bool) -> Self {
            let mut store = SlotStore::new();
            store.set(param::SERVERPASS, SECRET).unwrap();
            store.set(param::VEHICLEID, "TESTCAR").unwrap();
            store.set(param::MODULEPASS, "modpass").unwrap();
            if paranoid {
                store.set(param::PARANOID, "P").unwrap();
            }
            let (_capture, frames) = FrameCapture::new(8);
            let vehicle = Vehicle::new(&store, frames);
            let key = hmac_md5(
                format!("{}{}", "B".repeat(22), "A".repeat(22)).as_bytes(),
                SECRET.as_bytes(),
            );
            Self {
                store,
                vehicle,
                transport: MemoryTransport::new(),
                modem: RecordingModem::new(),
                shell: Shell,
                server_rx: Rc4::primed(&key).unwrap(),
                server_tx: Rc4::primed(&key).unwrap(),
                seen: 0,
            }
        }

        fn env(&mut self) -> RelayEnv<'_> {
            RelayEnv {
                vehicle: &mut self.vehicle,
                store: &mut self.store,
                transport: &mut self.transport,
                modem: &mut self.modem,
                text: &mut self.shell,
            }
        }

        /// Encrypt a message the way the server does
        fn server_line(&mut self, text: &str) -> String {
            let mut plain = text.as_bytes().to_vec();
            self.server_tx.apply_keystream(&mut plain);
            let mut out = [0u8; 512];
            let n = encode_into(&plain, &mut out).unwrap();
            String::from_utf8(out[..n].to_vec()).unwrap()
        }

        /// Messages sent since the last call, decrypted
        fn received(&mut self) -> Vec<String> {
            let lines = self.transport.lines();
            let fresh = lines[self.seen..].to_vec();
            self.seen = lines.len();
            fresh
                .iter()
                .map(|line| {
                    let mut buf = [0u8; 512];
                    let n = decode_into(line.as_bytes(), &mut buf).unwrap();
                    self.server_rx.apply_keystream(&mut buf[..n]);
                    String::from_utf8(buf[..n].to_vec()).unwrap()
                })
                .collect()
        }
    }

    fn welcome() -> String {
        let server_token = "B".repeat(22);
        let digest = digest_b64(server_token.as_bytes(), SECRET.as_bytes());
        format!("MP-S 0 {} {}", server_token, std::str::from_utf8(&digest).unwrap())
    }

    fn connected(paranoid: bool) -> (Relay, Harness) {
        let mut h = Harness::new(paranoid);
        let mut relay = Relay::new(TokenGenerator::from_seed(11));
        relay
            .register_with_token(parse_token(&"A".repeat(22)).unwrap(), &h.store, &mut h.transport)
            .unwrap();
        h.seen = 1;
        relay.on_line(&welcome(), &mut h.env()).unwrap();
        assert!(relay.is_authenticated());
        (relay, h)
    }

    fn command(relay: &mut Relay, h: &mut Harness, text: &str) -> CommandEffects {
        let line = h.server_line(&format!("MP-0 C{}", text));
        relay.on_line(&line, &mut h.env()).unwrap()
    }

    #[test]
    fn test_status_report_wire_bytes() {
        let (mut relay, mut h) = connected(false);
        assert_eq!(
            h.transport.lines()[0],
            "MP-C 0 AAAAAAAAAAAAAAAAAAAAAA 1ZzX6MULguK/1Mlk6jH7Rg== TESTCAR"
        );
        assert_eq!(
            welcome(),
            "MP-S 0 BBBBBBBBBBBBBBBBBBBBBB s+0HrGEJfdFgEaQ29fM3oQ=="
        );

        let state = &mut h.vehicle.context_mut().state;
        state.soc = 42;
        state.ideal_range = 120;
        state.est_range = 100;

        assert!(relay.send_reports(&mut h.env()).unwrap());
        assert_eq!(
            h.transport.lines()[1],
            "3ZH880oWq9iime/W1rb6BInbs9+iFNTNgMVdl+pbyx8RTLqMcwD78sObBPmGymRujorQAYi9jxXKcURg"
        );
        assert_eq!(
            h.received()[0],
            "MP-0 S42,M,0,0,stopped,standard,120,100,0,0,0,0,0,0,0,0,0,-1"
        );
        assert_eq!(h.transport.frames_opened(), 1);
        assert_eq!(h.transport.frames_committed(), 1);
    }

    #[test]
    fn test_unchanged_reports_stay_quiet() {
        let (mut relay, mut h) = connected(false);
        assert!(relay.send_reports(&mut h.env()).unwrap());
        // S, D and L; no TPMS data and no groups configured
        assert_eq!(h.received().len(), 3);

        assert!(!relay.send_reports(&mut h.env()).unwrap());
        assert_eq!(h.transport.frames_opened(), 1);

        h.vehicle.context_mut().state.soc = 10;
        assert!(relay.send_reports(&mut h.env()).unwrap());
        let fresh = h.received();
        assert_eq!(fresh.len(), 1);
        assert!(fresh[0].starts_with("MP-0 S10,"));
    }

    #[test]
    fn test_bad_welcome_leaves_session_closed() {
        let mut h = Harness::new(false);
        let mut relay = Relay::new(TokenGenerator::from_seed(11));
        relay
            .register_with_token(parse_token(&"A".repeat(22)).unwrap(), &h.store, &mut h.transport)
            .unwrap();

        relay.on_line("garbage", &mut h.env()).unwrap();
        relay
            .on_line("MP-S 0 BBBBBBBBBBBBBBBBBBBBBB AAAAAAAAAAAAAAAAAAAAAA==", &mut h.env())
            .unwrap();
        assert!(!relay.is_authenticated());

        // Reports and alerts are held back
        assert!(!relay.send_reports(&mut h.env()).unwrap());
        relay.send_alert("hello", &mut h.transport).unwrap();
        assert_eq!(h.transport.lines().len(), 1);
    }

    #[test]
    fn test_ping() {
        let (mut relay, mut h) = connected(false);
        let line = h.server_line("MP-0 A");
        relay.on_line(&line, &mut h.env()).unwrap();
        assert_eq!(h.received(), vec!["MP-0 a"]);
    }

    #[test]
    fn test_bad_prefix_drops_link() {
        let (mut relay, mut h) = connected(false);
        let line = h.server_line("XX-0 A");
        assert!(matches!(
            relay.on_line(&line, &mut h.env()),
            Err(RelayError::BadPrefix)
        ));
    }

    #[test]
    fn test_apps_connected_burst() {
        let (mut relay, mut h) = connected(false);
        let line = h.server_line("MP-0 Z1");
        relay.on_line(&line, &mut h.env()).unwrap();
        assert!(relay.apps_connected());

        let burst = h.received();
        let kinds: Vec<char> = burst.iter().map(|m| m.chars().nth(5).unwrap()).collect();
        assert_eq!(kinds, vec!['S', 'L', 'F', 'D', 'V']);
        assert_eq!(h.transport.frames_opened(), 1);

        let line = h.server_line("MP-0 Z0");
        relay.on_line(&line, &mut h.env()).unwrap();
        assert!(!relay.apps_connected());
        assert!(h.received().is_empty());
    }

    #[test]
    fn test_feature_out_of_range() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "2,99,1");
        assert_eq!(h.received(), vec!["MP-0 c2,1,Parameter out of range"]);
        assert!(relay.pending().is_none());
    }

    #[test]
    fn test_feature_syntax() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "2,x");
        assert_eq!(h.received(), vec!["MP-0 c2,1,Invalid syntax"]);
    }

    #[test]
    fn test_canwrite_reinitialises() {
        let (mut relay, mut h) = connected(false);
        let effects = command(&mut relay, &mut h, "2,15,1");
        assert_eq!(effects, CommandEffects::REINITIALISE_DRIVER);
        assert!(h.vehicle.context().features.can_write());
        assert_eq!(h.store.get(param::FEATURE_S + 7), "1");
        assert_eq!(h.received(), vec!["MP-0 c2,0"]);
    }

    #[test]
    fn test_empty_auth_parameter_rejected() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "4,0,");
        assert_eq!(h.received(), vec!["MP-0 c4,1,Parameter out of range"]);

        command(&mut relay, &mut h, "4,24,5");
        assert_eq!(h.received(), vec!["MP-0 c4,1,Parameter out of range"]);
    }

    #[test]
    fn test_units_parameter_reinitialises_once() {
        let (mut relay, mut h) = connected(false);
        let effects = command(&mut relay, &mut h, "4,2,K");
        assert_eq!(effects, CommandEffects::REINITIALISE_DRIVER);
        assert_eq!(h.vehicle.context().units, Units::Kilometers);
        assert_eq!(h.received(), vec!["MP-0 c4,0"]);

        let effects = command(&mut relay, &mut h, "4,4,relay.example.com");
        assert!(effects.is_empty());
        assert_eq!(h.store.get(param::SERVERIP), "relay.example.com");
    }

    #[test]
    fn test_list_parameters_hides_secrets() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "3");
        let lines = h.received();
        assert_eq!(lines.len(), storage::PARAM_MAX);
        assert_eq!(lines[param::MODULEPASS], "MP-0 c3,0,1,32,");
        assert_eq!(lines[param::VEHICLEID], "MP-0 c3,0,8,32,TESTCAR");
        assert_eq!(lines[param::SERVERPASS], "MP-0 c3,0,9,32,");
        assert!(lines.iter().all(|line| line.starts_with("MP-0 c3,0,")));
    }

    #[test]
    fn test_list_features() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "1");
        let lines = h.received();
        // One line per feature and no trailing status line
        assert_eq!(lines.len(), 16);
        assert_eq!(lines[0], "MP-0 c1,0,0,16,0");
        assert_eq!(lines[15], "MP-0 c1,0,15,16,0");
        assert!(lines.iter().all(|line| line.split(',').count() == 5));
    }

    #[test]
    fn test_driver_handles_first() {
        let mut h = Harness::new(false);
        let (_capture, frames) = FrameCapture::new(8);
        h.vehicle = Vehicle::with_driver(Box::new(ClaimingDriver), &h.store, frames);
        let mut relay = Relay::new(TokenGenerator::from_seed(11));
        relay
            .register_with_token(parse_token(&"A".repeat(22)).unwrap(), &h.store, &mut h.transport)
            .unwrap();
        h.seen = 1;
        relay.on_line(&welcome(), &mut h.env()).unwrap();

        command(&mut relay, &mut h, "1");
        assert_eq!(h.received(), vec!["MP-0 c1,0,driver"]);
        command(&mut relay, &mut h, "99");
        assert_eq!(h.received(), vec!["MP-0 c99,3"]);
    }

    #[test]
    fn test_reboot_and_status_alert() {
        let (mut relay, mut h) = connected(false);
        assert_eq!(command(&mut relay, &mut h, "5"), CommandEffects::REBOOT);
        assert_eq!(h.received(), vec!["MP-0 c5,0"]);

        h.vehicle.context_mut().state.soc = 77;
        command(&mut relay, &mut h, "6");
        assert_eq!(
            h.received(),
            vec![
                "MP-0 PAStandard - Charging Stopped\rIdeal Range: 0 mi SOC: 77%",
                "MP-0 c6,0"
            ]
        );
    }

    #[test]
    fn test_text_command_escaped() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "7,echo a,b\nc");
        assert_eq!(h.received(), vec!["MP-0 c7,0,a;b\rc"]);

        command(&mut relay, &mut h, "7,nope");
        assert_eq!(h.received(), vec!["MP-0 c7,1,Unknown command"]);

        command(&mut relay, &mut h, "7");
        assert_eq!(h.received(), vec!["MP-0 c7,1,Invalid syntax"]);
    }

    #[test]
    fn test_modem_commands() {
        let (mut relay, mut h) = connected(false);
        command(&mut relay, &mut h, "40,+15550100,hello there");
        command(&mut relay, &mut h, "40,+15550100");
        command(&mut relay, &mut h, "41,*100#");
        command(&mut relay, &mut h, "49,AT+CSQ");
        assert_eq!(
            h.received(),
            vec!["MP-0 c40,0", "MP-0 c40,1,Invalid syntax", "MP-0 c41,0", "MP-0 c49,0"]
        );
        assert_eq!(
            h.modem.requests,
            vec![
                ModemRequest::Sms {
                    number: "+15550100".into(),
                    text: "hello there".into()
                },
                ModemRequest::Ussd("*100#".into()),
                ModemRequest::Raw("AT+CSQ".into()),
            ]
        );

        relay.ussd_result("Balance 5.00", &mut h.transport).unwrap();
        assert_eq!(h.received(), vec!["MP-0 c41,0,Balance 5.00"]);

        h.modem.fail = true;
        command(&mut relay, &mut h, "49,AT");
        assert_eq!(h.received(), vec!["MP-0 c49,1,modem busy"]);
    }

    #[test]
    fn test_alerts() {
        let (mut relay, mut h) = connected(false);
        relay
            .forward_sms("+15550100", &"m".repeat(100), &mut h.transport)
            .unwrap();
        relay.send_error_code("O2", 17, 3, &mut h.transport).unwrap();

        let lines = h.received();
        assert_eq!(lines[0], format!("MP-0 PASMS FROM: +15550100 - MSG: {}", "m".repeat(70)));
        assert_eq!(lines[1], "MP-0 PEO2,17,3");
    }

    #[test]
    fn test_notifications_sent_once() {
        let (mut relay, mut h) = connected(false);
        h.vehicle
            .context_mut()
            .request_notification(Notify::STATUS | Notify::ENVIRONMENT);
        relay.send_notifications(&mut h.env()).unwrap();
        let lines = h.received();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("MP-0 PA"));
        assert!(lines[1].starts_with("MP-0 D"));

        relay.send_notifications(&mut h.env()).unwrap();
        assert!(h.received().is_empty());
    }

    #[test]
    fn test_streaming_requires_apps() {
        let (mut relay, mut h) = connected(false);
        let store = &mut h.store;
        h.vehicle
            .context_mut()
            .features
            .set(vehicle::FEATURE_STREAM, 1, store)
            .unwrap();
        assert!(!relay.stream_location(&mut h.env()).unwrap());

        let line = h.server_line("MP-0 Z1");
        relay.on_line(&line, &mut h.env()).unwrap();
        h.received();

        h.vehicle.context_mut().state.latitude = 1000;
        assert!(relay.stream_location(&mut h.env()).unwrap());
        let lines = h.received();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("MP-0 L"));
    }

    #[test]
    fn test_paranoid_layer() {
        let (mut relay, mut h) = connected(true);
        let announce = h.received();
        assert_eq!(announce.len(), 1);
        let ptoken = announce[0].strip_prefix("MP-0 ET").unwrap().to_owned();
        assert_eq!(ptoken.len(), 22);

        command(&mut relay, &mut h, "5");
        let reply = h.received();
        let encoded = reply[0].strip_prefix("MP-0 EMc").unwrap();
        let mut body = [0u8; 64];
        let n = decode_into(encoded.as_bytes(), &mut body).unwrap();
        let pdigest = hmac_md5(ptoken.as_bytes(), b"modpass");
        Rc4::primed(&pdigest).unwrap().apply_keystream(&mut body[..n]);
        assert_eq!(&body[..n], b"5,0");

        // Alerts are exempt
        relay.send_alert("plain", &mut h.transport).unwrap();
        assert_eq!(h.received(), vec!["MP-0 PAplain"]);
    }

    #[test]
    fn test_disconnect_resets() {
        let (mut relay, mut h) = connected(false);
        relay.on_disconnected();
        assert!(!relay.is_authenticated());
        let line = h.server_line("MP-0 A");
        relay.on_line(&line, &mut h.env()).unwrap();
        assert_eq!(h.transport.lines().len(), 1);
    }
}
