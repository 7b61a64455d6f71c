//! User callback registry
//!
//! The layer above the engine learns about protocol events here. Callbacks
//! are keyed by (family, subtype); a family-wide default is registered with
//! subtype [`special::DEFAULT`].

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::Result;
use crate::login::LoginResult;
use crate::migrate::MigrationPlan;
use crate::rates::RateChange;
use crate::session::{ConnId, Session};
use crate::snac::general::{Redirect, UserInfo};

/// Engine-originated events that do not map to a real SNAC.
pub mod special {
    pub const FAMILY: u16 = 0xffff;
    pub const CONNECTION_ERROR: u16 = 0x0003;
    pub const FLAP_VERSION: u16 = 0x0005;
    pub const CONN_INIT_DONE: u16 = 0x0006;
    pub const FLAP_ERROR: u16 = 0x0008;
    /// Per-family fallback subtype.
    pub const DEFAULT: u16 = 0xffff;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FlapVersion,
    ConnInitDone,
    ConnectionError { code: u16, message: Option<String> },
    FlapError { payload: Bytes },
    SnacError { family: u16, code: u16 },
    HostOnline { families: Vec<u16> },
    Redirect(Redirect),
    RateChange(RateChange),
    ServerPause,
    SelfInfo(UserInfo),
    EvilNotify { new_level: u16, from: Option<UserInfo> },
    Migrate(MigrationPlan),
    Motd { code: u16, message: Option<String> },
    MemRequest { offset: u32, len: u32, module: Option<String> },
    AuthKey { key: Bytes },
    LoginResult(LoginResult),
    Unknown { family: u16, subtype: u16, payload: Bytes },
}

pub type Callback = Box<dyn FnMut(&mut Session, ConnId, &Event) -> Result<()> + Send>;

#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<(u16, u16), Callback>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.handlers.len())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn register<F>(&mut self, family: u16, subtype: u16, callback: F)
    where
        F: FnMut(&mut Session, ConnId, &Event) -> Result<()> + Send + 'static,
    {
        self.handlers.insert((family, subtype), Box::new(callback));
    }

    /// Registers the fallback for every otherwise unhandled subtype of `family`.
    pub fn register_default<F>(&mut self, family: u16, callback: F)
    where
        F: FnMut(&mut Session, ConnId, &Event) -> Result<()> + Send + 'static,
    {
        self.register(family, special::DEFAULT, callback);
    }

    pub fn unregister(&mut self, family: u16, subtype: u16) -> bool {
        self.handlers.remove(&(family, subtype)).is_some()
    }

    pub fn contains(&self, family: u16, subtype: u16) -> bool {
        self.handlers.contains_key(&(family, subtype))
            || self.handlers.contains_key(&(family, special::DEFAULT))
    }

    /// Invokes the exact callback, or the family default. `Ok(false)` when
    /// neither is registered.
    pub fn call(
        &mut self,
        session: &mut Session,
        conn: ConnId,
        family: u16,
        subtype: u16,
        event: &Event,
    ) -> Result<bool> {
        let key = if self.handlers.contains_key(&(family, subtype)) {
            (family, subtype)
        } else {
            (family, special::DEFAULT)
        };
        match self.handlers.get_mut(&key) {
            Some(cb) => {
                cb(session, conn, event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
