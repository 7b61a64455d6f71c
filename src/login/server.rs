//! Authorizer side of the login exchange
//!
//! Enough of the server role to stand up a compatible test authorizer:
//! parse what a client sends and answer it.

use crate::codec::{ByteStream, ByteWriter, TlvChain};
use crate::error::{OscarError, Result};
use crate::network::crypt::{self, Cookie};
use crate::network::flap::{FrameType, FLAP_VERSION};
use crate::session::{ConnId, Session};
use crate::snac::{auth, general};

use super::packet::LoginResult;

/// Families announced in 0x01/0x03.
pub const SERVER_FAMILIES: [u16; 12] = [
    0x0001, 0x0002, 0x0003, 0x0004, 0x0006, 0x0008, 0x0009, 0x000a, 0x000b, 0x000c, 0x0013,
    0x0015,
];

/// How the authorization reply is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyForm {
    /// 0x17/0x03 on the data channel (MD5 clients)
    Snac,
    /// Bare TLV chain on channel 4 (XOR clients)
    Signoff,
}

/// Credentials as the authorizer received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub screen_name: String,
    pub credential: Credential,
    pub client_string: Option<String>,
    pub build: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Md5Digest([u8; 16]),
    XorPassword(Vec<u8>),
}

impl LoginRequest {
    fn from_tlvs(tlvs: &TlvChain) -> Result<Self> {
        let screen_name = tlvs
            .get_str(0x0001, 1)
            .ok_or_else(|| OscarError::protocol("login request without screen name"))?;
        let credential = if let Some(digest) = tlvs.get_raw(0x0025, 1) {
            let digest: [u8; 16] = digest[..].try_into().map_err(|_| {
                OscarError::protocol(format!("login digest is {} bytes", digest.len()))
            })?;
            Credential::Md5Digest(digest)
        } else if let Some(encoded) = tlvs.get_raw(0x0002, 1) {
            Credential::XorPassword(encoded.to_vec())
        } else {
            return Err(OscarError::protocol("login request without credentials"));
        };
        Ok(Self {
            screen_name,
            credential,
            client_string: tlvs.get_str(0x0003, 1),
            build: tlvs.get_u16(0x001a, 1),
        })
    }

    /// Whether the credential matches `password` under `key`.
    ///
    /// `key` is ignored for XOR logins.
    pub fn verify(&self, key: &[u8], password: &str) -> bool {
        match &self.credential {
            Credential::Md5Digest(digest) => {
                *digest == crypt::login_digest(key, password.as_bytes())
            }
            Credential::XorPassword(encoded) => crypt::xor_decode(encoded)
                .map(|plain| plain == password.as_bytes())
                .unwrap_or(false),
        }
    }
}

/// Parses the screen name from a 0x17/0x06 body.
pub fn parse_screen_name_request(body: &[u8]) -> Result<String> {
    TlvChain::parse(body)?
        .get_str(0x0001, 1)
        .ok_or_else(|| OscarError::protocol("0x17/0x06 without screen name"))
}

/// Parses a 0x17/0x02 body.
pub fn parse_md5_login(body: &[u8]) -> Result<LoginRequest> {
    LoginRequest::from_tlvs(&TlvChain::parse(body)?)
}

/// Parses a channel-1 XOR login payload.
pub fn parse_xor_login(payload: &[u8]) -> Result<LoginRequest> {
    let mut bs = ByteStream::new(payload);
    let version = bs.get32()?;
    if version != FLAP_VERSION {
        return Err(OscarError::protocol(format!(
            "unexpected FLAP version 0x{:08x}",
            version
        )));
    }
    LoginRequest::from_tlvs(&TlvChain::read(&mut bs)?)
}

/// A fresh random cookie for a successful login.
pub fn generate_cookie() -> Cookie {
    Cookie::generate()
}

/// A random decimal challenge key, as the AIM authorizer issues them.
pub fn generate_key() -> String {
    format!("{}", rand::random::<u32>())
}

/// 0x17/0x07: u16 key length then the key.
pub fn send_auth_key(session: &mut Session, conn: ConnId, key: &[u8]) -> Result<u32> {
    let len = u16::try_from(key.len()).map_err(|_| OscarError::PayloadTooLarge {
        len: key.len(),
        max: u16::MAX as usize,
    })?;
    let mut w = ByteWriter::with_capacity(2 + key.len());
    w.put16(len)?;
    w.putraw(key)?;
    session.send_snac_uncached(conn, auth::FAMILY, auth::SUBTYPE_KEY, w.as_slice())
}

/// Answers a login with `result`, framed per `form`.
pub fn send_auth_response(
    session: &mut Session,
    conn: ConnId,
    result: &LoginResult,
    form: ReplyForm,
) -> Result<()> {
    let mut tlvs = TlvChain::new();
    match result {
        LoginResult::Success(ok) => {
            tlvs.append(0x0001, &ok.screen_name)?;
            tlvs.append(0x0005, &ok.bos_ip)?;
            tlvs.append(0x0006, ok.cookie)?;
            if let Some(email) = &ok.email {
                tlvs.append(0x0011, email)?;
            }
            if let Some(status) = ok.reg_status {
                tlvs.append_u16(0x0013, status)?;
            }
            if let Some(url) = &ok.change_password_url {
                tlvs.append(0x0054, url)?;
            }
        }
        LoginResult::Failure {
            screen_name,
            code,
            url,
        } => {
            let sn = screen_name.as_deref().unwrap_or(&session.screen_name);
            tlvs.append(0x0001, sn)?;
            tlvs.append_u16(0x0008, *code)?;
            if let Some(url) = url {
                tlvs.append(0x0004, url)?;
            }
        }
    }
    let body = tlvs.serialize()?;
    match form {
        ReplyForm::Snac => {
            session.send_snac_uncached(conn, auth::FAMILY, auth::SUBTYPE_AUTH_RESPONSE, &body)?;
        }
        ReplyForm::Signoff => {
            session.conn_mut(conn)?.send(FrameType::Signoff, body)?;
        }
    }
    tracing::debug!("[login] [reply] conn={conn} success={} form={form:?}", result.is_success());
    Ok(())
}

/// 0x01/0x03 listing [`SERVER_FAMILIES`].
pub fn send_server_ready(session: &mut Session, conn: ConnId) -> Result<u32> {
    let mut w = ByteWriter::with_capacity(SERVER_FAMILIES.len() * 2);
    for family in SERVER_FAMILIES {
        w.put16(family)?;
    }
    session.send_snac_uncached(
        conn,
        general::FAMILY,
        general::SUBTYPE_HOST_ONLINE,
        w.as_slice(),
    )
}

/// 0x01/0x05 pointing the client at another service.
pub fn send_redirect(
    session: &mut Session,
    conn: ConnId,
    service: u16,
    ip: &str,
    cookie: &Cookie,
) -> Result<u32> {
    let mut tlvs = TlvChain::new();
    tlvs.append_u16(0x000d, service)?;
    tlvs.append(0x0005, ip)?;
    tlvs.append(0x0006, cookie)?;
    let body = tlvs.serialize()?;
    session.send_snac_uncached(conn, general::FAMILY, general::SUBTYPE_REDIRECT, &body)
}
