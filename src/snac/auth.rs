//! Family 0x0017: authorizer

use crate::codec::{ByteStream, TlvChain};
use crate::error::Result;
use crate::login::packet;

use super::callbacks::Event;
use super::{ModuleInfo, SnacContext, SnacHandler, SnacHeader};

pub const FAMILY: u16 = 0x0017;
pub const VERSION: u16 = 0x0001;

pub const SUBTYPE_LOGIN: u16 = 0x0002;
pub const SUBTYPE_AUTH_RESPONSE: u16 = 0x0003;
pub const SUBTYPE_LOGIN_REQUEST: u16 = 0x0006;
pub const SUBTYPE_KEY: u16 = 0x0007;

pub struct AuthModule;

impl SnacHandler for AuthModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            family: FAMILY,
            version: VERSION,
            tool_id: 0x0110,
            tool_version: 0x047b,
            name: "auth",
        }
    }

    fn handle(
        &mut self,
        ctx: &mut SnacContext<'_>,
        snac: &SnacHeader,
        bs: &mut ByteStream<'_>,
    ) -> Result<bool> {
        match snac.subtype {
            SUBTYPE_KEY => {
                let key = packet::parse_key(bs)?;
                ctx.session.login.on_key(ctx.conn, key.clone())?;
                ctx.emit(FAMILY, SUBTYPE_KEY, Event::AuthKey { key })?;
                Ok(true)
            }
            SUBTYPE_AUTH_RESPONSE => {
                let tlvs = TlvChain::read(bs)?;
                let result = ctx.session.login.on_auth_response(ctx.conn, &tlvs)?;
                ctx.emit(FAMILY, SUBTYPE_AUTH_RESPONSE, Event::LoginResult(result))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
