//! Session handshake and cipher state
//!
//! The module registers with a fresh token and an HMAC of it under the
//! server password. The server answers with its own token and digest; once
//! that checks out both sides key an RC4 stream per direction from
//! `HMAC(server_token || client_token, password)`.
//!
//! The optional paranoid layer keys a second cipher from a module-generated
//! token and the module password. That cipher is re-primed for every message.

use crate::error::SessionError;
use relay_crypto::{digest_b64, hmac_md5, verify_b64, Digest, Rc4, Token, TokenGenerator};
use tracing::{debug, info, warn};

/// Registration line capacity (without the line terminator)
pub const REGISTRATION_CAPACITY: usize = 128;

/// Longest server token we accept
const MAX_SERVER_TOKEN: usize = 64;

/// Registration line `MP-C 0 <token> <digest> <vehicle id>`
pub type RegistrationLine = heapless::String<REGISTRATION_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Registration sent, waiting for `MP-S 0`
    AwaitingWelcome,
    Authenticated,
}

pub struct Session {
    state: SessionState,
    tokens: TokenGenerator,
    client_token: Token,
    rx: Option<Rc4>,
    tx: Option<Rc4>,
    paranoid_token: Option<Token>,
    paranoid_digest: Option<Digest>,
    paranoid_active: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("paranoid_active", &self.paranoid_active)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(tokens: TokenGenerator) -> Self {
        Self {
            state: SessionState::Idle,
            tokens,
            client_token: Token::new(),
            rx: None,
            tx: None,
            paranoid_token: None,
            paranoid_digest: None,
            paranoid_active: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Whether outbound bodies get the paranoid layer
    pub fn paranoid_active(&self) -> bool {
        self.paranoid_active
    }

    /// Replace the token source, e.g. with fresh timer and CAN entropy
    pub fn reseed(&mut self, tokens: TokenGenerator) {
        self.tokens = tokens;
    }

    /// Draw a client token and build the registration line
    pub fn register(
        &mut self,
        secret: &str,
        vehicle_id: &str,
    ) -> Result<RegistrationLine, SessionError> {
        let token = self.tokens.next_token();
        self.register_with_token(token, secret, vehicle_id)
    }

    /// Build the registration line around a given client token
    pub fn register_with_token(
        &mut self,
        token: Token,
        secret: &str,
        vehicle_id: &str,
    ) -> Result<RegistrationLine, SessionError> {
        self.reset();
        let digest = digest_b64(token.as_bytes(), secret.as_bytes());
        let digest = std::str::from_utf8(&digest).map_err(|_| SessionError::Malformed)?;

        let mut line = RegistrationLine::new();
        for part in ["MP-C 0 ", token.as_str(), " ", digest, " ", vehicle_id] {
            line.push_str(part).map_err(|_| SessionError::Malformed)?;
        }

        debug!("Registering vehicle '{}' with token {}", vehicle_id, token);
        self.client_token = token;
        self.state = SessionState::AwaitingWelcome;
        Ok(line)
    }

    /// Check the server welcome (`<token> <digest>`, prefix already removed)
    /// and key both directions.
    pub fn welcome(&mut self, body: &str, secret: &str) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingWelcome {
            return Err(SessionError::NotRegistered);
        }

        let (server_token, digest) = body
            .trim_end()
            .split_once(' ')
            .ok_or(SessionError::Malformed)?;
        if server_token.is_empty() || server_token.len() > MAX_SERVER_TOKEN {
            return Err(SessionError::Malformed);
        }

        if server_token == self.client_token.as_str() {
            warn!("Server welcome replays our own token");
            return Err(SessionError::Replay);
        }

        verify_b64(server_token.as_bytes(), secret.as_bytes(), digest.trim().as_bytes())
            .map_err(|_| SessionError::DigestMismatch)?;

        let mut keyed = heapless::Vec::<u8, { MAX_SERVER_TOKEN + 32 }>::new();
        keyed
            .extend_from_slice(server_token.as_bytes())
            .and_then(|_| keyed.extend_from_slice(self.client_token.as_bytes()))
            .map_err(|_| SessionError::Malformed)?;
        let key = hmac_md5(&keyed, secret.as_bytes());

        self.rx = Some(Rc4::primed(&key)?);
        self.tx = Some(Rc4::primed(&key)?);
        self.state = SessionState::Authenticated;
        debug!("Server token {}", server_token);
        info!("Session authenticated");
        Ok(())
    }

    /// Turn on the paranoid layer, creating its token on first use.
    ///
    /// The token survives reconnects so the server keeps a single key.
    /// The returned token must be announced with `ET`.
    pub fn enable_paranoid(&mut self, module_pass: &str) -> Token {
        let token = match &self.paranoid_token {
            Some(token) => token.clone(),
            None => {
                let token = self.tokens.next_token();
                self.paranoid_token = Some(token.clone());
                token
            }
        };
        self.paranoid_digest = Some(hmac_md5(token.as_bytes(), module_pass.as_bytes()));
        self.paranoid_active = true;
        debug!("Paranoid token {}", token);
        token
    }

    pub fn disable_paranoid(&mut self) {
        self.paranoid_active = false;
    }

    /// A freshly primed paranoid cipher, if the layer is active
    pub fn paranoid_cipher(&self) -> Result<Option<Rc4>, SessionError> {
        match (self.paranoid_active, &self.paranoid_digest) {
            (true, Some(digest)) => Ok(Some(Rc4::primed(digest)?)),
            _ => Ok(None),
        }
    }

    /// Encrypt outbound text in place
    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<(), SessionError> {
        let tx = self.tx.as_mut().ok_or(SessionError::NotAuthenticated)?;
        tx.apply_keystream(data);
        Ok(())
    }

    /// Decrypt inbound text in place
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<(), SessionError> {
        let rx = self.rx.as_mut().ok_or(SessionError::NotAuthenticated)?;
        rx.apply_keystream(data);
        Ok(())
    }

    /// Forget the connection; the paranoid token is kept
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.rx = None;
        self.tx = None;
        self.paranoid_active = false;
    }
}
