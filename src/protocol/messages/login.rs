//! Login handshake: 10101 in, 20104 or 20103 out.

use futures::future::BoxFuture;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{error, info, warn};

use crate::core::bytestream::{ByteReader, ByteWriter, EMPTY_STRING};
use crate::core::types::LogicLong;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{ClientMessage, HandlerContext, ServerMessage};
use crate::protocol::messages::ids;
use crate::service::{Player, PlayerStore, TeamRegistry};
use crate::transport::directory::OnlineIdentity;
use crate::transport::session::ConnectionSession;

const GENERATED_TOKEN_LEN: usize = 40;
const SERVER_ENVIRONMENT: &str = "dev";

const TEXT_ALREADY_ONLINE: &str = "You are already logged in somewhere else.";
const TEXT_SERVER_ISSUE: &str = "The server is currently experiencing some issues. Sorry!";

/// Reason codes the client understands in a LoginFailed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LoginFailedReason {
    LoginFailed = 6,
    UpdateAvailable = 8,
    ConnectionError = 9,
    MaintenanceBreak = 10,
    Banned = 11,
    AccountLocked = 13,
}

/// Client login request.
#[derive(Debug, Clone, Default)]
pub struct LoginMessage {
    pub account: LogicLong,
    pub token: String,
    pub major: i32,
    pub minor: i32,
    pub build: i32,
    pub fingerprint_sha: String,
    pub device_uuid: String,
    pub device_identifier: String,
    pub system_language: i32,
    pub region: String,
}

impl LoginMessage {
    fn resolve_player(&self, ctx: &HandlerContext) -> Result<Player> {
        let players = &ctx.services.players;

        if !self.token.is_empty() {
            if let Some(player) = players.load_by_token(&self.token)? {
                if let Err(e) = players.touch_login(player.id) {
                    warn!(error = %e, "failed to record login time");
                }
                return Ok(player);
            }
        }

        let token = if self.token.is_empty() {
            generate_token()
        } else {
            self.token.clone()
        };
        players.create_player(self.account, &token, &self.region)
    }

    async fn handle(self, session: &mut ConnectionSession, ctx: &HandlerContext) -> Result<()> {
        if session.is_active() {
            warn!(conn_id = session.id(), "login on an already authenticated connection ignored");
            return Ok(());
        }

        let player = match self.resolve_player(ctx) {
            Ok(player) => player,
            Err(e) => {
                error!(conn_id = session.id(), error = %e, "failed to load or create player");
                let reply = LoginFailedMessage::new(
                    LoginFailedReason::LoginFailed,
                    &self.fingerprint_sha,
                    TEXT_SERVER_ISSUE,
                );
                session.send(&reply).await;
                return Ok(());
            }
        };

        // register what the login resolved to, not what the client claimed
        let identity = OnlineIdentity::new(player.id, player.token.clone());
        if let Err(e) = ctx.directories.online.try_register(session.id(), identity) {
            if matches!(e, ProtocolError::AlreadyOnline) {
                ctx.metrics.duplicate_login();
            }
            warn!(
                conn_id = session.id(),
                high = player.id.high,
                low = player.id.low,
                error = %e,
                "login rejected"
            );
            let reply = LoginFailedMessage::new(
                LoginFailedReason::LoginFailed,
                &self.fingerprint_sha,
                TEXT_ALREADY_ONLINE,
            );
            session.send(&reply).await;
            return Ok(());
        }

        let group = player.alliance.as_ref().map(|m| m.alliance);
        ctx.directories
            .broadcast
            .add(session.handle().clone(), group)?;

        let ok = LoginOkMessage::new(&player, &self);
        let team = player.team_id;
        let player_id = player.id;
        info!(
            conn_id = session.id(),
            high = player.id.high,
            low = player.id.low,
            region = %player.region,
            "player logged in"
        );
        session.establish(player)?;
        session.send(&ok).await;

        if let Some(team) = team {
            if let Err(e) = ctx.services.teams.join(session.id(), player_id, Some(team)) {
                warn!(conn_id = session.id(), team, error = %e, "could not rejoin team");
            }
        }

        Ok(())
    }
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_TOKEN_LEN)
        .map(char::from)
        .collect()
}

impl ClientMessage for LoginMessage {
    fn name(&self) -> &'static str {
        "Login"
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        let mut reader = ByteReader::new(payload);

        let high = reader.read_i32()?;
        let low = reader.read_i32()?;
        self.account = LogicLong::new(high, low);
        self.token = reader.read_string_or_empty()?;

        self.major = reader.read_i32()?;
        self.minor = reader.read_i32()?;
        self.build = reader.read_i32()?;

        self.fingerprint_sha = reader.read_string_or_empty()?;
        reader.read_string()?;
        self.device_uuid = reader.read_string_or_empty()?;
        reader.read_string()?;
        self.device_identifier = reader.read_string_or_empty()?;

        self.system_language = reader.read_varint()?;
        self.region = reader.read_string_or_empty()?;
        Ok(())
    }

    fn starts_login(&self) -> bool {
        true
    }

    fn process<'a>(
        self: Box<Self>,
        session: &'a mut ConnectionSession,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { (*self).handle(session, ctx).await })
    }
}

/// Successful login: echoes the resolved account and the client version.
#[derive(Debug, Clone)]
pub struct LoginOkMessage {
    pub account: LogicLong,
    pub token: String,
    pub major: i32,
    pub minor: i32,
    pub build: i32,
    pub region: String,
}

impl LoginOkMessage {
    pub fn new(player: &Player, login: &LoginMessage) -> Self {
        Self {
            account: player.id,
            token: player.token.clone(),
            major: login.major,
            minor: login.minor,
            build: login.build,
            region: login.region.clone(),
        }
    }
}

impl ServerMessage for LoginOkMessage {
    fn id(&self) -> u16 {
        ids::LOGIN_OK
    }

    fn encode(&self, writer: &mut ByteWriter) {
        // account id, then home id, which is the same pair
        for _ in 0..2 {
            writer.write_i32(self.account.high);
            writer.write_i32(self.account.low);
        }
        writer.write_str(&self.token);

        // facebook and game center ids
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);

        writer.write_i32(self.major);
        writer.write_i32(self.minor);
        writer.write_i32(self.build);
        writer.write_str(SERVER_ENVIRONMENT);

        // session count, play time, days since started
        writer.write_i32(0);
        writer.write_i32(0);
        writer.write_i32(0);

        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
        writer.write_i32(0);
        writer.write_string(EMPTY_STRING);
        writer.write_str(&self.region);
        writer.write_string(EMPTY_STRING);
        writer.write_i32(1);
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
    }
}

/// Refused login with a human-readable reason.
#[derive(Debug, Clone)]
pub struct LoginFailedMessage {
    pub reason: LoginFailedReason,
    pub fingerprint_sha: String,
    pub text: String,
}

impl LoginFailedMessage {
    pub fn new(reason: LoginFailedReason, fingerprint_sha: &str, text: &str) -> Self {
        Self {
            reason,
            fingerprint_sha: fingerprint_sha.to_string(),
            text: text.to_string(),
        }
    }
}

impl ServerMessage for LoginFailedMessage {
    fn id(&self) -> u16 {
        ids::LOGIN_FAILED
    }

    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.reason as i32);
        writer.write_str(&self.fingerprint_sha);

        // redirect host, content url, update url
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);

        writer.write_str(&self.text);

        writer.write_i32(0);
        writer.write_bool(false);
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
        writer.write_i32(0);
        writer.write_i32(3);
        writer.write_string(EMPTY_STRING);
        writer.write_string(EMPTY_STRING);
        writer.write_i32(0);
        writer.write_i32(0);
        writer.write_bool(false);
        writer.write_bool(false);
    }
}
