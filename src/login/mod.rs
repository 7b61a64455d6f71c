//! Authorizer login
//!
//! Two paths share one [`Login`] record:
//!
//! ```text
//! MD5:  Disconnected -> AwaitingFlapVersion -> ScreennameSent -> AwaitingKey
//!                    -> LoginSent -> Authenticated | LoginError
//! XOR:  Disconnected -> AwaitingFlapVersion -> XorLoginSent
//!                    -> Authenticated | LoginError
//! ```
//!
//! Screen names starting with a digit are ICQ UINs and take the XOR path.
//! That authorizer never sends a key, so the XOR path skips straight from
//! the open connection to the channel-1 login frame, and its reply comes
//! back as a channel-4 TLV chain instead of a 0x17/0x03 SNAC.

pub mod packet;
pub mod server;

use bytes::Bytes;

use crate::codec::TlvChain;
use crate::config::ClientInfo;
use crate::error::{OscarError, Result};
use crate::network::flap::FrameType;
use crate::session::{ConnId, Session};
use crate::snac::auth;

pub use packet::{AuthSuccess, LoginResult, VersionInfo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginState {
    #[default]
    Disconnected,
    AwaitingFlapVersion,
    ScreennameSent,
    AwaitingKey,
    LoginSent,
    XorLoginSent,
    Authenticated,
    LoginError,
}

impl LoginState {
    pub fn name(&self) -> &'static str {
        match self {
            LoginState::Disconnected => "Disconnected",
            LoginState::AwaitingFlapVersion => "AwaitingFlapVersion",
            LoginState::ScreennameSent => "ScreennameSent",
            LoginState::AwaitingKey => "AwaitingKey",
            LoginState::LoginSent => "LoginSent",
            LoginState::XorLoginSent => "XorLoginSent",
            LoginState::Authenticated => "Authenticated",
            LoginState::LoginError => "LoginError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPath {
    /// 0x17/0x06 -> key -> 0x17/0x02 with an MD5 digest
    Md5,
    /// One channel-1 frame with an XOR-encoded password
    Xor,
}

impl LoginPath {
    pub fn for_screen_name(screen_name: &str) -> Self {
        if screen_name.starts_with(|c: char| c.is_ascii_digit()) {
            LoginPath::Xor
        } else {
            LoginPath::Md5
        }
    }
}

/// Login progress for one session. Owned by [`Session::login`].
#[derive(Debug, Default)]
pub struct Login {
    state: LoginState,
    path: Option<LoginPath>,
    conn: Option<ConnId>,
    screen_name: Option<String>,
    key: Option<Bytes>,
    result: Option<LoginResult>,
}

impl Login {
    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn path(&self) -> Option<LoginPath> {
        self.path
    }

    /// The authorizer connection, once one is bound.
    pub fn conn(&self) -> Option<ConnId> {
        self.conn
    }

    pub fn screen_name(&self) -> Option<&str> {
        self.screen_name.as_deref()
    }

    pub fn result(&self) -> Option<&LoginResult> {
        self.result.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == LoginState::Authenticated
    }

    /// Drops everything and returns to `Disconnected`.
    pub fn reset(&mut self) {
        if self.state != LoginState::Disconnected {
            tracing::debug!("[login] [reset] from={}", self.state.name());
        }
        *self = Self::default();
    }

    /// Binds a freshly opened authorizer connection.
    ///
    /// Allowed from `Disconnected` and from a finished attempt, so a failed
    /// login can be retried on a new connection.
    pub fn connect(&mut self, conn: ConnId) -> Result<()> {
        match self.state {
            LoginState::Disconnected | LoginState::LoginError | LoginState::Authenticated => {
                *self = Self {
                    state: LoginState::AwaitingFlapVersion,
                    conn: Some(conn),
                    ..Self::default()
                };
                Ok(())
            }
            _ => Err(self.invalid("connect")),
        }
    }

    /// Records a key from 0x17/0x07.
    pub fn on_key(&mut self, conn: ConnId, key: Bytes) -> Result<()> {
        self.check_conn(conn, "key")?;
        if self.state != LoginState::ScreennameSent {
            return Err(self.invalid("key"));
        }
        tracing::debug!("[login] [key] conn={conn} len={}", key.len());
        self.key = Some(key);
        self.state = LoginState::AwaitingKey;
        Ok(())
    }

    /// Applies a 0x17/0x03 reply.
    ///
    /// An error reply may arrive straight after the screen name when the
    /// name itself is rejected.
    pub fn on_auth_response(&mut self, conn: ConnId, tlvs: &TlvChain) -> Result<LoginResult> {
        self.check_conn(conn, "auth_response")?;
        match self.state {
            LoginState::ScreennameSent
            | LoginState::AwaitingKey
            | LoginState::LoginSent
            | LoginState::XorLoginSent => self.finish(tlvs),
            _ => Err(self.invalid("auth_response")),
        }
    }

    /// True when a channel-4 frame on `conn` carries the XOR login reply.
    pub fn expects_signoff_reply(&self, conn: ConnId) -> bool {
        self.state == LoginState::XorLoginSent && self.conn == Some(conn)
    }

    /// Applies the XOR path's channel-4 reply.
    pub fn handle_signoff_frame(&mut self, conn: ConnId, tlvs: &TlvChain) -> Result<LoginResult> {
        self.check_conn(conn, "signoff")?;
        if self.state != LoginState::XorLoginSent {
            return Err(self.invalid("signoff"));
        }
        self.finish(tlvs)
    }

    fn finish(&mut self, tlvs: &TlvChain) -> Result<LoginResult> {
        let fallback = self.screen_name.clone().unwrap_or_default();
        let result = packet::parse_auth_response(tlvs, &fallback)?;
        match &result {
            LoginResult::Success(s) => {
                tracing::info!(
                    "[login] [success] sn={} bos={} cookie_len={}",
                    s.screen_name,
                    s.bos_ip,
                    s.cookie.as_bytes().len()
                );
                self.state = LoginState::Authenticated;
            }
            LoginResult::Failure { code, url, .. } => {
                tracing::warn!(
                    "[login] [failure] code=0x{code:04x} url={}",
                    url.as_deref().unwrap_or("")
                );
                self.state = LoginState::LoginError;
            }
        }
        self.key = None;
        self.result = Some(result.clone());
        Ok(result)
    }

    fn check_conn(&self, conn: ConnId, event: &'static str) -> Result<()> {
        if self.conn != Some(conn) {
            tracing::warn!("[login] [stray] event={event} conn={conn} bound={:?}", self.conn);
            return Err(self.invalid(event));
        }
        Ok(())
    }

    fn invalid(&self, event: &'static str) -> OscarError {
        OscarError::InvalidTransition {
            from: self.state.name(),
            event,
        }
    }
}

/// Starts a login on the authorizer connection `conn`.
///
/// MD5 path: queues the FLAP version acknowledgement and 0x17/0x06.
/// XOR path: records the path and sends nothing; the whole login goes out
/// with [`send_login`].
pub fn request_login(session: &mut Session, conn: ConnId, screen_name: &str) -> Result<LoginPath> {
    session.conn(conn)?;
    if session.login.conn() != Some(conn) {
        session.login.connect(conn)?;
    }
    if session.login.state != LoginState::AwaitingFlapVersion {
        return Err(session.login.invalid("request_login"));
    }

    let path = LoginPath::for_screen_name(screen_name);
    session.login.path = Some(path);
    session.login.screen_name = Some(screen_name.to_string());
    session.screen_name = screen_name.to_string();

    match path {
        LoginPath::Md5 => {
            let body = packet::screen_name_request(screen_name)?;
            session.conn_mut(conn)?.send_flap_version()?;
            session.send_snac(conn, auth::FAMILY, auth::SUBTYPE_LOGIN_REQUEST, &body)?;
            session.login.state = LoginState::ScreennameSent;
            tracing::info!("[login] [request] conn={conn} sn={screen_name} path=md5");
        }
        LoginPath::Xor => {
            tracing::info!("[login] [request] conn={conn} sn={screen_name} path=xor");
        }
    }
    Ok(path)
}

/// Sends the credentials.
///
/// MD5 path: requires the key, queues 0x17/0x02. XOR path: queues the
/// channel-1 login frame; `info` is ignored because the ICQ authorizer only
/// accepts its own client block.
pub fn send_login(
    session: &mut Session,
    conn: ConnId,
    password: &str,
    info: &ClientInfo,
) -> Result<()> {
    session.login.check_conn(conn, "send_login")?;
    let screen_name = session.login.screen_name.clone().unwrap_or_default();

    match (session.login.path, session.login.state) {
        (Some(LoginPath::Md5), LoginState::AwaitingKey) => {
            let key = session.login.key.clone().unwrap_or_default();
            let body = packet::md5_login_request(&screen_name, password, &key, info)?;
            session.send_snac(conn, auth::FAMILY, auth::SUBTYPE_LOGIN, &body)?;
            session.login.state = LoginState::LoginSent;
        }
        (Some(LoginPath::Xor), LoginState::AwaitingFlapVersion) => {
            let payload = packet::xor_login_request(&screen_name, password)?;
            session.conn_mut(conn)?.send(FrameType::Signon, payload)?;
            session.login.state = LoginState::XorLoginSent;
        }
        _ => return Err(session.login.invalid("send_login")),
    }
    tracing::debug!(
        "[login] [send] conn={conn} sn={screen_name} state={}",
        session.login.state.name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::network::crypt::Cookie;
    use crate::session::ConnKind;
    use crate::snac::callbacks::Event;
    use crate::snac::{Dispatcher, SnacHeader};
    use std::sync::{Arc, Mutex};

    fn setup() -> (Dispatcher, Session, ConnId) {
        let mut s = Session::new("");
        let c = s.open_conn_with_sequence(ConnKind::Authorizer, 0x100);
        s.login.connect(c).unwrap();
        (Dispatcher::new(), s, c)
    }

    fn snac(d: &mut Dispatcher, s: &mut Session, c: ConnId, subtype: u16, body: &[u8]) -> bool {
        let h = SnacHeader::new(auth::FAMILY, subtype, 0, 0);
        d.dispatch(s, c, &h, body).unwrap()
    }

    fn key_body(key: &[u8]) -> Vec<u8> {
        let mut body = (key.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(key);
        body
    }

    fn success_reply() -> Vec<u8> {
        let mut tlvs = TlvChain::new();
        tlvs.append(0x0001, "testuser").unwrap();
        tlvs.append(0x0005, "64.12.200.1").unwrap();
        tlvs.append(0x0006, [0u8; 16]).unwrap();
        tlvs.serialize().unwrap().to_vec()
    }

    #[test]
    fn test_md5_success_path() {
        let (mut d, mut s, c) = setup();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        d.callbacks()
            .register(auth::FAMILY, auth::SUBTYPE_AUTH_RESPONSE, move |_, _, ev| {
                sink.lock().unwrap().push(ev.clone());
                Ok(())
            });

        assert_eq!(request_login(&mut s, c, "testuser").unwrap(), LoginPath::Md5);
        assert_eq!(s.login.state(), LoginState::ScreennameSent);
        let sent = s.conn_mut(c).unwrap().take_pending();
        // version acknowledgement precedes the screen name request
        assert_eq!(sent[0].as_ref(), &[0x2a, 0x01, 0x01, 0x00, 0x00, 0x04, 0, 0, 0, 1]);
        assert_eq!(sent[1][1], 0x02);
        assert_eq!(codec::get16(&sent[1], 6).unwrap(), 0x0017);
        assert_eq!(codec::get16(&sent[1], 8).unwrap(), 0x0006);

        assert!(snac(&mut d, &mut s, c, auth::SUBTYPE_KEY, &key_body(b"abc123")));
        assert_eq!(s.login.state(), LoginState::AwaitingKey);

        send_login(&mut s, c, "pw", &ClientInfo::default()).unwrap();
        assert_eq!(s.login.state(), LoginState::LoginSent);
        let sent = s.conn_mut(c).unwrap().take_pending();
        assert_eq!(codec::get16(&sent[0], 8).unwrap(), auth::SUBTYPE_LOGIN);
        let tlvs = TlvChain::parse(&sent[0][16..]).unwrap();
        assert_eq!(
            crate::network::crypt::digest_hex(tlvs.get_raw(0x0025, 1).unwrap()),
            "da76df3f668051d2a18925d17a981f62"
        );

        assert!(snac(&mut d, &mut s, c, auth::SUBTYPE_AUTH_RESPONSE, &success_reply()));
        assert_eq!(s.login.state(), LoginState::Authenticated);
        let Some(LoginResult::Success(ok)) = s.login.result() else {
            panic!("expected success");
        };
        assert_eq!(ok.bos_ip, "64.12.200.1");
        assert_eq!(ok.cookie, Cookie::new([0u8; 16]));
        assert_eq!(results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_md5_error_path() {
        let (mut d, mut s, c) = setup();
        request_login(&mut s, c, "testuser").unwrap();
        snac(&mut d, &mut s, c, auth::SUBTYPE_KEY, &key_body(b"abc123"));
        send_login(&mut s, c, "wrong", &ClientInfo::default()).unwrap();

        let mut tlvs = TlvChain::new();
        tlvs.append(0x0001, "testuser").unwrap();
        tlvs.append_u16(0x0008, 0x0005).unwrap();
        let body = tlvs.serialize().unwrap();
        assert!(snac(&mut d, &mut s, c, auth::SUBTYPE_AUTH_RESPONSE, &body));

        assert_eq!(s.login.state(), LoginState::LoginError);
        assert!(!s.login.is_authenticated());
        assert!(matches!(
            s.login.result(),
            Some(LoginResult::Failure { code: 5, url: None, .. })
        ));
    }

    #[test]
    fn test_reply_with_neither_branch_is_error() {
        let (mut d, mut s, c) = setup();
        request_login(&mut s, c, "testuser").unwrap();
        snac(&mut d, &mut s, c, auth::SUBTYPE_KEY, &key_body(b"k"));
        send_login(&mut s, c, "pw", &ClientInfo::default()).unwrap();

        let mut tlvs = TlvChain::new();
        tlvs.append(0x0001, "testuser").unwrap();
        let h = SnacHeader::new(auth::FAMILY, auth::SUBTYPE_AUTH_RESPONSE, 0, 0);
        let err = d
            .dispatch(&mut s, c, &h, &tlvs.serialize().unwrap())
            .unwrap_err();
        assert!(matches!(err, OscarError::ProtocolError(_)));
        assert_eq!(s.login.state(), LoginState::LoginSent);
    }

    #[test]
    fn test_xor_path_never_sends_screen_name_request() {
        let (mut d, mut s, c) = setup();
        assert_eq!(request_login(&mut s, c, "12345678").unwrap(), LoginPath::Xor);
        assert!(!s.conn(c).unwrap().has_pending());

        send_login(&mut s, c, "test", &ClientInfo::default()).unwrap();
        assert_eq!(s.login.state(), LoginState::XorLoginSent);
        let sent = s.conn_mut(c).unwrap().take_pending();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][1], 0x01);
        assert_eq!(&sent[0][6..10], &[0, 0, 0, 1]);
        for frame in &sent {
            assert!(!(frame[1] == 0x02 && codec::get16(frame, 8).unwrap() == 0x0006));
        }

        // reply arrives as a bare TLV chain on channel 4
        let frame = crate::network::flap::Frame::new(FrameType::Signoff, 1, success_reply());
        assert!(d.dispatch_frame(&mut s, c, &frame).unwrap());
        assert!(s.login.is_authenticated());
    }

    #[test]
    fn test_key_out_of_order_rejected() {
        let (_, mut s, c) = setup();
        let err = s.login.on_key(c, Bytes::from_static(b"k")).unwrap_err();
        assert!(matches!(
            err,
            OscarError::InvalidTransition {
                from: "AwaitingFlapVersion",
                event: "key"
            }
        ));
        assert!(send_login(&mut s, c, "pw", &ClientInfo::default()).is_err());
    }

    #[test]
    fn test_stray_connection_rejected() {
        let (_, mut s, c) = setup();
        request_login(&mut s, c, "testuser").unwrap();
        let other = s.open_conn(ConnKind::Bos);
        assert!(s.login.on_key(other, Bytes::from_static(b"k")).is_err());
        assert_eq!(s.login.state(), LoginState::ScreennameSent);
    }

    #[test]
    fn test_closing_connection_aborts_login() {
        let (mut d, mut s, c) = setup();
        request_login(&mut s, c, "testuser").unwrap();
        snac(&mut d, &mut s, c, auth::SUBTYPE_KEY, &key_body(b"abc123"));
        s.close_conn(c).unwrap();
        assert_eq!(s.login.state(), LoginState::Disconnected);
        assert!(s.login.conn().is_none());
        assert!(s.login.screen_name().is_none());

        // a new attempt can start on a fresh connection
        let c2 = s.open_conn(ConnKind::Authorizer);
        assert_eq!(request_login(&mut s, c2, "testuser").unwrap(), LoginPath::Md5);
    }

    #[test]
    fn test_key_event_reaches_callback() {
        let (mut d, mut s, c) = setup();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        d.callbacks()
            .register(auth::FAMILY, auth::SUBTYPE_KEY, move |_, _, ev| {
                if let Event::AuthKey { key } = ev {
                    *sink.lock().unwrap() = Some(key.clone());
                }
                Ok(())
            });
        request_login(&mut s, c, "testuser").unwrap();
        snac(&mut d, &mut s, c, auth::SUBTYPE_KEY, &key_body(b"xyz"));
        assert_eq!(seen.lock().unwrap().as_deref(), Some(&b"xyz"[..]));
    }

    #[test]
    fn test_path_selection() {
        assert_eq!(LoginPath::for_screen_name("12345678"), LoginPath::Xor);
        assert_eq!(LoginPath::for_screen_name("testuser"), LoginPath::Md5);
        assert_eq!(LoginPath::for_screen_name(""), LoginPath::Md5);
    }
}
