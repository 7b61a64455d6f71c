//! SNAC dispatch
//!
//! Data-channel payloads start with a 10-byte header:
//!   family:u16 | subtype:u16 | flags:u16 | request_id:u32
//!
//! [`Dispatcher`] routes each SNAC to the module registered for its family;
//! the module switches on subtype and reports user-visible results through
//! the [`callbacks::CallbackRegistry`].

pub mod auth;
pub mod cache;
pub mod callbacks;
pub mod general;

use std::collections::BTreeMap;

use crate::codec::{self, ByteStream, ByteWriter, TlvChain};
use crate::error::Result;
use crate::network::flap::{Frame, FrameType, FLAP_VERSION};
use crate::session::{ConnId, Session};

use cache::CachedSnac;
use callbacks::{special, CallbackRegistry, Event};

pub const SNAC_HEADER_LEN: usize = 10;

/// Header flag bits.
pub mod snac_flags {
    /// More replies to the same request follow.
    pub const MORE_REPLIES: u16 = 0x0001;
    /// Payload is prefixed by a length-counted version block.
    pub const HAS_VERSION: u16 = 0x8000;
}

/// Subtype 0x0001 in every family is an error report.
pub const SUBTYPE_ERROR: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnacHeader {
    pub family: u16,
    pub subtype: u16,
    pub flags: u16,
    pub request_id: u32,
}

impl SnacHeader {
    pub fn new(family: u16, subtype: u16, flags: u16, request_id: u32) -> Self {
        Self {
            family,
            subtype,
            flags,
            request_id,
        }
    }

    pub fn read(bs: &mut ByteStream<'_>) -> Result<Self> {
        Ok(Self {
            family: bs.get16()?,
            subtype: bs.get16()?,
            flags: bs.get16()?,
            request_id: bs.get32()?,
        })
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<()> {
        w.put16(self.family)?;
        w.put16(self.subtype)?;
        w.put16(self.flags)?;
        w.put32(self.request_id)
    }

    pub fn encode(&self) -> [u8; SNAC_HEADER_LEN] {
        let mut out = [0u8; SNAC_HEADER_LEN];
        out[0..2].copy_from_slice(&self.family.to_be_bytes());
        out[2..4].copy_from_slice(&self.subtype.to_be_bytes());
        out[4..6].copy_from_slice(&self.flags.to_be_bytes());
        out[6..10].copy_from_slice(&self.request_id.to_be_bytes());
        out
    }

    pub fn more_replies(&self) -> bool {
        self.flags & snac_flags::MORE_REPLIES != 0
    }
}

/// Static description of a registered family module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub family: u16,
    pub version: u16,
    pub tool_id: u16,
    pub tool_version: u16,
    pub name: &'static str,
}

/// What a family handler sees while processing one SNAC.
pub struct SnacContext<'a> {
    pub session: &'a mut Session,
    pub conn: ConnId,
    pub modules: &'a [ModuleInfo],
    pub callbacks: &'a mut CallbackRegistry,
    /// The cached request this SNAC answers, if its id was known.
    pub origin: Option<CachedSnac>,
}

impl SnacContext<'_> {
    /// Hands `event` to the user callback for (family, subtype).
    pub fn emit(&mut self, family: u16, subtype: u16, event: Event) -> Result<bool> {
        self.callbacks
            .call(self.session, self.conn, family, subtype, &event)
    }

    pub fn module(&self, family: u16) -> Option<&ModuleInfo> {
        self.modules.iter().find(|m| m.family == family)
    }
}

/// A family module. Returns `Ok(true)` when the SNAC was consumed.
pub trait SnacHandler: Send {
    fn info(&self) -> ModuleInfo;

    fn handle(
        &mut self,
        ctx: &mut SnacContext<'_>,
        snac: &SnacHeader,
        bs: &mut ByteStream<'_>,
    ) -> Result<bool>;
}

pub struct Dispatcher {
    modules: BTreeMap<u16, Box<dyn SnacHandler>>,
    infos: Vec<ModuleInfo>,
    callbacks: CallbackRegistry,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher with no modules.
    pub fn empty() -> Self {
        Self {
            modules: BTreeMap::new(),
            infos: Vec::new(),
            callbacks: CallbackRegistry::default(),
        }
    }

    /// A dispatcher with the general (0x0001) and auth (0x0017) modules.
    pub fn new() -> Self {
        let mut d = Self::empty();
        d.register_module(general::GeneralModule);
        d.register_module(auth::AuthModule);
        d
    }

    /// Registers `handler` for its family, replacing any earlier module.
    pub fn register_module(&mut self, handler: impl SnacHandler + 'static) {
        let info = handler.info();
        tracing::debug!(
            "[snac] [register] family=0x{:04x} version={} name={}",
            info.family,
            info.version,
            info.name
        );
        self.infos.retain(|m| m.family != info.family);
        self.infos.push(info);
        self.modules.insert(info.family, Box::new(handler));
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.infos
    }

    pub fn callbacks(&mut self) -> &mut CallbackRegistry {
        &mut self.callbacks
    }

    /// Routes one received frame. Returns whether anything consumed it.
    pub fn dispatch_frame(&mut self, session: &mut Session, conn: ConnId, frame: &Frame) -> Result<bool> {
        match frame.frame_type {
            FrameType::Data => {
                let mut bs = ByteStream::new(&frame.payload);
                let header = SnacHeader::read(&mut bs)?;
                self.dispatch(session, conn, &header, bs.rest())
            }
            FrameType::Signon => {
                if frame.payload.len() == 4 && codec::get32(&frame.payload, 0)? == FLAP_VERSION {
                    tracing::debug!("[flap] [version] conn={conn}");
                    return self.callbacks.call(
                        session,
                        conn,
                        special::FAMILY,
                        special::FLAP_VERSION,
                        &Event::FlapVersion,
                    );
                }
                tracing::debug!(
                    "[flap] [signon] conn={conn} len={} not a bare version frame",
                    frame.payload.len()
                );
                Ok(false)
            }
            FrameType::Signoff => {
                let tlvs = TlvChain::parse(&frame.payload)?;
                if session.login.expects_signoff_reply(conn) {
                    let result = session.login.handle_signoff_frame(conn, &tlvs)?;
                    self.callbacks.call(
                        session,
                        conn,
                        auth::FAMILY,
                        auth::SUBTYPE_AUTH_RESPONSE,
                        &Event::LoginResult(result),
                    )?;
                    return Ok(true);
                }
                let code = tlvs.get_u16(0x0009, 1).unwrap_or(0);
                let message = tlvs.get_str(0x000b, 1);
                tracing::info!("[flap] [signoff] conn={conn} code=0x{code:04x}");
                self.callbacks.call(
                    session,
                    conn,
                    special::FAMILY,
                    special::CONNECTION_ERROR,
                    &Event::ConnectionError { code, message },
                )
            }
            FrameType::Error => {
                tracing::warn!("[flap] [error] conn={conn} len={}", frame.payload.len());
                self.callbacks.call(
                    session,
                    conn,
                    special::FAMILY,
                    special::FLAP_ERROR,
                    &Event::FlapError {
                        payload: frame.payload.clone(),
                    },
                )
            }
            FrameType::Keepalive => {
                tracing::trace!("[flap] [keepalive] conn={conn}");
                Ok(true)
            }
        }
    }

    /// Routes one SNAC body (everything after the 10-byte header).
    pub fn dispatch(
        &mut self,
        session: &mut Session,
        conn: ConnId,
        header: &SnacHeader,
        payload: &[u8],
    ) -> Result<bool> {
        let mut bs = ByteStream::new(payload);
        if header.flags & snac_flags::HAS_VERSION != 0 {
            let len = bs.get16()? as usize;
            bs.skip(len)?;
        }

        let origin = if header.more_replies() {
            session.snac_cache.get(header.request_id).cloned()
        } else {
            session.snac_cache.take(header.request_id)
        };

        if header.subtype == SUBTYPE_ERROR {
            let code = if bs.remaining() >= 2 { bs.get16()? } else { 0 };
            tracing::warn!(
                "[snac] [error] conn={conn} family=0x{:04x} code=0x{code:04x}",
                header.family
            );
            return self.callbacks.call(
                session,
                conn,
                header.family,
                SUBTYPE_ERROR,
                &Event::SnacError {
                    family: header.family,
                    code,
                },
            );
        }

        let family = if self.modules.contains_key(&header.family) {
            Some(header.family)
        } else {
            origin
                .as_ref()
                .map(|o| o.family)
                .filter(|f| self.modules.contains_key(f))
        };

        if let Some(handler) = family.and_then(|f| self.modules.get_mut(&f)) {
            let mut ctx = SnacContext {
                session: &mut *session,
                conn,
                modules: &self.infos,
                callbacks: &mut self.callbacks,
                origin,
            };
            if handler.handle(&mut ctx, header, &mut bs)? {
                return Ok(true);
            }
        }

        tracing::debug!(
            "[snac] [unhandled] conn={conn} family=0x{:04x} subtype=0x{:04x} len={}",
            header.family,
            header.subtype,
            payload.len()
        );
        let event = Event::Unknown {
            family: header.family,
            subtype: header.subtype,
            payload: bytes::Bytes::copy_from_slice(payload),
        };
        if self
            .callbacks
            .call(session, conn, header.family, header.subtype, &event)?
        {
            return Ok(true);
        }
        self.callbacks
            .call(session, conn, special::FAMILY, special::DEFAULT, &event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OscarError;
    use crate::session::ConnKind;
    use std::sync::{Arc, Mutex};

    struct Echo {
        seen: Arc<Mutex<Vec<u16>>>,
    }

    impl SnacHandler for Echo {
        fn info(&self) -> ModuleInfo {
            ModuleInfo {
                family: 0x0004,
                version: 1,
                tool_id: 0x0110,
                tool_version: 0x047b,
                name: "echo",
            }
        }

        fn handle(
            &mut self,
            _ctx: &mut SnacContext<'_>,
            snac: &SnacHeader,
            bs: &mut ByteStream<'_>,
        ) -> Result<bool> {
            if snac.subtype != 0x0007 {
                return Ok(false);
            }
            self.seen.lock().unwrap().push(bs.get16()?);
            Ok(true)
        }
    }

    fn setup() -> (Dispatcher, Session, ConnId, Arc<Mutex<Vec<u16>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::empty();
        d.register_module(Echo { seen: seen.clone() });
        let mut s = Session::new("tester");
        let c = s.open_conn(ConnKind::Bos);
        (d, s, c, seen)
    }

    #[test]
    fn test_header_round_trip() {
        let h = SnacHeader::new(0x0017, 0x0006, 0x8001, 0xdeadbeef);
        let bytes = h.encode();
        assert_eq!(bytes, [0x00, 0x17, 0x00, 0x06, 0x80, 0x01, 0xde, 0xad, 0xbe, 0xef]);
        let mut bs = ByteStream::new(&bytes);
        assert_eq!(SnacHeader::read(&mut bs).unwrap(), h);
        assert!(h.more_replies());
    }

    #[test]
    fn test_dispatch_routes_by_family_then_subtype() {
        let (mut d, mut s, c, seen) = setup();
        let h = SnacHeader::new(0x0004, 0x0007, 0, 1);
        assert!(d.dispatch(&mut s, c, &h, &[0x12, 0x34]).unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![0x1234]);
    }

    #[test]
    fn test_unknown_snac_is_dropped_not_fatal() {
        let (mut d, mut s, c, _) = setup();
        let h = SnacHeader::new(0x0099, 0x0002, 0, 1);
        assert!(!d.dispatch(&mut s, c, &h, &[1, 2, 3]).unwrap());
        let h = SnacHeader::new(0x0004, 0x00ff, 0, 2);
        assert!(!d.dispatch(&mut s, c, &h, &[]).unwrap());
    }

    #[test]
    fn test_version_block_is_skipped() {
        let (mut d, mut s, c, seen) = setup();
        let h = SnacHeader::new(0x0004, 0x0007, snac_flags::HAS_VERSION, 1);
        let body = [0x00, 0x02, 0xaa, 0xbb, 0x00, 0x2a];
        assert!(d.dispatch(&mut s, c, &h, &body).unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![0x002a]);
    }

    #[test]
    fn test_reply_by_request_id_only() {
        let (mut d, mut s, c, seen) = setup();
        let id = s.cache_snac(0x0004, 0x0006, 0, None).unwrap();
        // family omitted by the server; the cached request supplies it
        let h = SnacHeader::new(0x0000, 0x0007, 0, id);
        assert!(d.dispatch(&mut s, c, &h, &[0x00, 0x05]).unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![5]);
        assert!(s.snac_cache.get(id).is_none());
    }

    #[test]
    fn test_more_replies_keeps_cache_entry() {
        let (mut d, mut s, c, _) = setup();
        let id = s.cache_snac(0x0004, 0x0006, 0, None).unwrap();
        let h = SnacHeader::new(0x0004, 0x0007, snac_flags::MORE_REPLIES, id);
        d.dispatch(&mut s, c, &h, &[0, 1]).unwrap();
        assert!(s.snac_cache.get(id).is_some());
    }

    #[test]
    fn test_error_subtype_reports_code() {
        let (mut d, mut s, c, _) = setup();
        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = codes.clone();
        d.callbacks().register(0x0004, SUBTYPE_ERROR, move |_, _, ev| {
            if let Event::SnacError { family, code } = ev {
                sink.lock().unwrap().push((*family, *code));
            }
            Ok(())
        });
        let h = SnacHeader::new(0x0004, SUBTYPE_ERROR, 0, 9);
        assert!(d.dispatch(&mut s, c, &h, &[0x00, 0x04]).unwrap());
        assert_eq!(*codes.lock().unwrap(), vec![(0x0004, 0x0004)]);
    }

    #[test]
    fn test_truncated_header_rejects_one_frame() {
        let (mut d, mut s, c, _) = setup();
        let frame = Frame::new(FrameType::Data, 1, vec![0x00, 0x04, 0x00]);
        let err = d.dispatch_frame(&mut s, c, &frame).unwrap_err();
        assert!(matches!(err, OscarError::TruncatedData { .. }));
        assert!(!err.is_fatal_to_connection());
    }

    #[test]
    fn test_keepalive_and_version_frames() {
        let (mut d, mut s, c, _) = setup();
        let ka = Frame::new(FrameType::Keepalive, 1, bytes::Bytes::new());
        assert!(d.dispatch_frame(&mut s, c, &ka).unwrap());
        let ver = Frame::new(FrameType::Signon, 2, vec![0, 0, 0, 1]);
        // no FLAP-version callback registered
        assert!(!d.dispatch_frame(&mut s, c, &ver).unwrap());
    }

    #[test]
    fn test_signoff_reports_connection_error() {
        let (mut d, mut s, c, _) = setup();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        d.callbacks()
            .register(special::FAMILY, special::CONNECTION_ERROR, move |_, _, ev| {
                if let Event::ConnectionError { code, message } = ev {
                    *sink.lock().unwrap() = Some((*code, message.clone()));
                }
                Ok(())
            });
        let mut tlvs = TlvChain::new();
        tlvs.append_u16(0x0009, 0x0001).unwrap();
        tlvs.append(0x000b, b"other login").unwrap();
        let frame = Frame::new(FrameType::Signoff, 3, tlvs.serialize().unwrap());
        assert!(d.dispatch_frame(&mut s, c, &frame).unwrap());
        assert_eq!(
            *seen.lock().unwrap(),
            Some((1, Some("other login".to_string())))
        );
    }

    #[test]
    fn test_default_modules_registered() {
        let d = Dispatcher::new();
        let families: Vec<u16> = d.modules().iter().map(|m| m.family).collect();
        assert_eq!(families, vec![0x0001, 0x0017]);
    }
}
