//! Login secrets: cookies, MD5 digests and the XOR password table

use md5::{Digest, Md5};

use crate::error::{OscarError, Result};

/// Trailer mixed into every MD5 login digest. Must match the server byte-for-byte.
pub const AIM_MD5_STRING: &[u8] = b"AOL Instant Messenger (SM)";

/// Auth cookies are always exactly this long.
pub const COOKIE_LEN: usize = 16;

/// v2.1 password table, also accepted by ICQ authorizers.
pub const XOR_TABLE: [u8; 16] = [
    0xf3, 0x26, 0x81, 0xc4, 0x39, 0x86, 0xdb, 0x92, 0x71, 0xa3, 0xb9, 0xe6, 0x53, 0x7a, 0x95, 0x7c,
];

/// Longest password the XOR table covers. The table is never cycled.
pub const XOR_MAX_PASSWORD: usize = XOR_TABLE.len();

/// A 16-byte authorization cookie.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cookie([u8; COOKIE_LEN]);

impl Cookie {
    pub fn new(bytes: [u8; COOKIE_LEN]) -> Self {
        Self(bytes)
    }

    /// A fresh random cookie, for authorizers handing out BOS tickets.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; COOKIE_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Cookie {
    type Error = OscarError;

    /// Rejects anything that is not exactly [`COOKIE_LEN`] bytes.
    fn try_from(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; COOKIE_LEN] = bytes
            .try_into()
            .map_err(|_| OscarError::InvalidCookieLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for Cookie {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Cookies are credentials; keep them out of logs.
impl std::fmt::Debug for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cookie(len={})", COOKIE_LEN)
    }
}

/// Computes `MD5(key ∥ password ∥ AIM_MD5_STRING)`, sent as TLV 0x0025.
pub fn login_digest(key: &[u8], password: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(password);
    hasher.update(AIM_MD5_STRING);
    hasher.finalize().into()
}

/// XORs `password` against [`XOR_TABLE`] byte-for-byte.
///
/// Passwords longer than the table are refused rather than cycled or
/// truncated; the legacy authorizer has no defined behaviour past byte 16.
pub fn xor_encode(password: &[u8]) -> Result<Vec<u8>> {
    if password.len() > XOR_MAX_PASSWORD {
        return Err(OscarError::PasswordTooLong {
            len: password.len(),
            max: XOR_MAX_PASSWORD,
        });
    }
    Ok(password
        .iter()
        .zip(XOR_TABLE.iter())
        .map(|(p, k)| p ^ k)
        .collect())
}

/// Inverse of [`xor_encode`] (the same operation).
pub fn xor_decode(encoded: &[u8]) -> Result<Vec<u8>> {
    xor_encode(encoded)
}

/// MD5 of a client memory block, returned in a 0x01/0x20 reply.
///
/// A zero-length request hashes the empty input.
pub fn memblock_hash(buf: &[u8]) -> [u8; 16] {
    Md5::digest(buf).into()
}

/// Lowercase hex rendering of a digest.
pub fn digest_hex(digest: &[u8]) -> String {
    hex::encode(digest)
}
