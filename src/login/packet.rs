//! Login packet bodies
//!
//! Builders for what the client sends to the authorizer and parsers for
//! what comes back. Nothing here touches session state.

use bytes::Bytes;

use crate::codec::{ByteStream, ByteWriter, TlvChain};
use crate::config::ClientInfo;
use crate::error::{OscarError, Result};
use crate::network::crypt::{self, Cookie};
use crate::network::flap::FLAP_VERSION;

/// TLV 0x0009 in the MD5 login request.
const MD5_LOGIN_MARKER: u16 = 0x0015;

/// The ICQ 2000b build the XOR login announces. The authorizer only accepts
/// XOR-encoded passwords from clients that look like this one.
pub const ICQ_CLIENT_STRING: &str = "ICQ Inc. - Product of ICQ (TM) 2000b.4.65.1.3281.85";
const ICQ_MAJOR2: u16 = 0x010a;
const ICQ_MAJOR: u16 = 0x0004;
const ICQ_MINOR: u16 = 0x0041;
const ICQ_MINOR2: u16 = 0x0001;
const ICQ_BUILD: u16 = 0x0cd1;
const ICQ_DISTRIBUTION: u32 = 0x0000_0055;
const ICQ_LANG: &str = "en";
const ICQ_COUNTRY: &str = "us";

/// Body of 0x17/0x06.
pub fn screen_name_request(screen_name: &str) -> Result<Bytes> {
    let mut tlvs = TlvChain::new();
    tlvs.append(0x0001, screen_name)?;
    tlvs.serialize()
}

/// Body of 0x17/0x02: screen name, MD5 digest, then the client version block
/// in the order the authorizer expects.
pub fn md5_login_request(
    screen_name: &str,
    password: &str,
    key: &[u8],
    info: &ClientInfo,
) -> Result<Bytes> {
    let digest = crypt::login_digest(key, password.as_bytes());

    let mut tlvs = TlvChain::new();
    tlvs.append(0x0001, screen_name)?;
    tlvs.append(0x0025, digest)?;
    tlvs.append(0x0003, &info.client_string)?;
    tlvs.append_u16(0x0016, info.major2)?;
    tlvs.append_u16(0x0017, info.major)?;
    tlvs.append_u16(0x0018, info.minor)?;
    tlvs.append_u16(0x0019, info.minor2)?;
    tlvs.append_u16(0x001a, info.build)?;
    if let Some(distribution) = info.distribution {
        tlvs.append_u32(0x0014, distribution)?;
    }
    tlvs.append(0x000e, &info.country)?;
    tlvs.append(0x000f, &info.lang)?;
    if let Some(flag) = info.unknown4a {
        tlvs.append_u8(0x004a, flag)?;
    }
    tlvs.append_u16(0x0009, MD5_LOGIN_MARKER)?;
    tlvs.serialize()
}

/// Payload of the channel-1 XOR login: the FLAP version word followed by a
/// TLV chain. The client version block is fixed.
pub fn xor_login_request(screen_name: &str, password: &str) -> Result<Bytes> {
    let encoded = crypt::xor_encode(password.as_bytes())?;

    let mut tlvs = TlvChain::new();
    tlvs.append(0x0001, screen_name)?;
    tlvs.append(0x0002, encoded)?;
    tlvs.append(0x0003, ICQ_CLIENT_STRING)?;
    tlvs.append_u16(0x0016, ICQ_MAJOR2)?;
    tlvs.append_u16(0x0017, ICQ_MAJOR)?;
    tlvs.append_u16(0x0018, ICQ_MINOR)?;
    tlvs.append_u16(0x0019, ICQ_MINOR2)?;
    tlvs.append_u16(0x001a, ICQ_BUILD)?;
    tlvs.append_u32(0x0014, ICQ_DISTRIBUTION)?;
    tlvs.append(0x000f, ICQ_LANG)?;
    tlvs.append(0x000e, ICQ_COUNTRY)?;

    let mut w = ByteWriter::with_capacity(4 + tlvs.length());
    w.put32(FLAP_VERSION)?;
    tlvs.write(&mut w)?;
    Ok(w.into_bytes())
}

/// Parses a 0x17/0x07 body: a u16 length and that many key bytes.
pub fn parse_key(bs: &mut ByteStream<'_>) -> Result<Bytes> {
    let len = bs.get16()? as usize;
    if len > bs.remaining() {
        return Err(OscarError::TruncatedData {
            need: len,
            have: bs.remaining(),
        });
    }
    Ok(Bytes::copy_from_slice(bs.getraw(len)?))
}

/// Build, download URL, notes and name of an advertised client release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub build: Option<u32>,
    pub url: Option<String>,
    pub info: Option<String>,
    pub name: Option<String>,
}

impl VersionInfo {
    /// Reads the four TLVs starting at `base`. `None` if none are present.
    fn from_tlvs(tlvs: &TlvChain, base: u16) -> Option<Self> {
        let v = Self {
            build: tlvs.get_u32(base, 1),
            url: tlvs.get_str(base + 1, 1),
            info: tlvs.get_str(base + 2, 1),
            name: tlvs.get_str(base + 3, 1),
        };
        (v != Self::default()).then_some(v)
    }
}

/// What a successful authorization hands to the BOS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSuccess {
    pub screen_name: String,
    /// `host` or `host:port`
    pub bos_ip: String,
    pub cookie: Cookie,
    pub email: Option<String>,
    pub reg_status: Option<u16>,
    pub change_password_url: Option<String>,
    pub latest_beta: Option<VersionInfo>,
    pub latest_release: Option<VersionInfo>,
}

impl AuthSuccess {
    /// Splits `bos_ip` into host and port.
    pub fn bos_address(&self, default_port: u16) -> (String, u16) {
        split_host_port(&self.bos_ip, default_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResult {
    Success(AuthSuccess),
    Failure {
        screen_name: Option<String>,
        code: u16,
        url: Option<String>,
    },
}

impl LoginResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginResult::Success(_))
    }

    /// The success record, or [`OscarError::AuthFailure`].
    pub fn into_result(self) -> Result<AuthSuccess> {
        match self {
            LoginResult::Success(s) => Ok(s),
            LoginResult::Failure { code, url, .. } => Err(OscarError::AuthFailure { code, url }),
        }
    }
}

/// Classifies an authorization reply.
///
/// TLV 0x0008 means failure regardless of what else is present. Otherwise
/// both 0x0005 and 0x0006 are required; a reply with neither branch is a
/// protocol error. `fallback_sn` is used when the server omits 0x0001.
pub fn parse_auth_response(tlvs: &TlvChain, fallback_sn: &str) -> Result<LoginResult> {
    let screen_name = tlvs.get_str(0x0001, 1);

    if let Some(code) = tlvs.get_u16(0x0008, 1) {
        return Ok(LoginResult::Failure {
            screen_name,
            code,
            url: tlvs.get_str(0x0004, 1),
        });
    }

    let (Some(bos_ip), Some(raw_cookie)) = (tlvs.get_str(0x0005, 1), tlvs.get_raw(0x0006, 1))
    else {
        return Err(OscarError::protocol(
            "auth response has neither error code nor BOS address and cookie",
        ));
    };
    let cookie = Cookie::try_from(&raw_cookie[..])?;

    Ok(LoginResult::Success(AuthSuccess {
        screen_name: screen_name.unwrap_or_else(|| fallback_sn.to_string()),
        bos_ip,
        cookie,
        email: tlvs.get_str(0x0011, 1),
        reg_status: tlvs.get_u16(0x0013, 1),
        change_password_url: tlvs.get_str(0x0054, 1),
        latest_beta: VersionInfo::from_tlvs(tlvs, 0x0040),
        latest_release: VersionInfo::from_tlvs(tlvs, 0x0044),
    }))
}

pub(crate) fn split_host_port(addr: &str, default_port: u16) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (addr.to_string(), default_port),
        },
        None => (addr.to_string(), default_port),
    }
}
