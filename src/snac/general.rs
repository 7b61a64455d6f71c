//! Family 0x0001: generic service controls
//!
//! Connection bring-up runs entirely through this family:
//! host-online (0x03) -> set versions (0x17) -> host versions (0x18) ->
//! rate request (0x06) -> rate response (0x07) -> rate ack (0x08) ->
//! `ConnInitDone`, after which the client sends client-ready (0x02).

use crate::codec::{ByteStream, ByteWriter, TlvChain};
use crate::error::Result;
use crate::migrate::{self, MigrationPlan};
use crate::network::crypt::{self, Cookie};
use crate::rates::{self, RateChange, RateTable};
use crate::session::{ConnId, PendingChatJoin, Session};

use super::callbacks::{special, Event};
use super::{ModuleInfo, SnacContext, SnacHandler, SnacHeader};

pub const FAMILY: u16 = 0x0001;
pub const VERSION: u16 = 0x0003;
pub const TOOL_ID: u16 = 0x0110;
pub const TOOL_VERSION: u16 = 0x047b;

pub const SUBTYPE_CLIENT_READY: u16 = 0x0002;
pub const SUBTYPE_HOST_ONLINE: u16 = 0x0003;
pub const SUBTYPE_REDIRECT: u16 = 0x0005;
pub const SUBTYPE_RATE_REQUEST: u16 = 0x0006;
pub const SUBTYPE_RATE_RESPONSE: u16 = 0x0007;
pub const SUBTYPE_RATE_ACK: u16 = 0x0008;
pub const SUBTYPE_RATE_CHANGE: u16 = 0x000a;
pub const SUBTYPE_SERVER_PAUSE: u16 = 0x000b;
pub const SUBTYPE_PAUSE_ACK: u16 = 0x000c;
pub const SUBTYPE_SELF_INFO: u16 = 0x000f;
pub const SUBTYPE_EVIL_NOTIFY: u16 = 0x0010;
pub const SUBTYPE_MIGRATE: u16 = 0x0012;
pub const SUBTYPE_MOTD: u16 = 0x0013;
pub const SUBTYPE_SET_VERSIONS: u16 = 0x0017;
pub const SUBTYPE_HOST_VERSIONS: u16 = 0x0018;
pub const SUBTYPE_MEM_REQUEST: u16 = 0x001f;
pub const SUBTYPE_MEM_REPLY: u16 = 0x0020;

/// Redirect service id for chat rooms.
pub const SERVICE_CHAT: u16 = 0x000e;

/// Well-known hash for the 0x03ffffff/0x03ffffff probe (AIM 3.5.1670).
const MEMBLOCK_PROBE_HASH: [u8; 16] = [
    0x44, 0xa9, 0x5d, 0x26, 0xd2, 0x49, 0x04, 0x23, 0x93, 0xb8, 0x82, 0x1f, 0x51, 0xc5, 0x4b, 0x01,
];

/// A user as described in self-info and warning notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub screen_name: String,
    pub warning_level: u16,
    pub tlvs: TlvChain,
}

impl UserInfo {
    pub fn parse(bs: &mut ByteStream<'_>) -> Result<Self> {
        let sn_len = bs.get8()? as usize;
        let screen_name = bs.getstr(sn_len)?;
        let warning_level = bs.get16()?;
        let count = bs.get16()? as usize;
        let tlvs = TlvChain::read_num(bs, count)?;
        Ok(Self {
            screen_name,
            warning_level,
            tlvs,
        })
    }

    pub fn idle_minutes(&self) -> Option<u16> {
        self.tlvs.get_u16(0x0004, 1)
    }

    pub fn online_since(&self) -> Option<u32> {
        self.tlvs.get_u32(0x0003, 1)
    }
}

/// Service redirect (0x01/0x05).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub service: u16,
    pub host: String,
    pub cookie: Cookie,
    pub chat_join: Option<PendingChatJoin>,
}

/// What to hash for a 0x01/0x20 reply.
#[derive(Debug, Clone, Copy)]
pub enum MemBlock<'a> {
    /// The caller already hashed the block.
    Hash(&'a [u8; 16]),
    /// Raw bytes to be hashed.
    Data(&'a [u8]),
    /// Nothing available; only well-known requests can be answered.
    Unavailable,
}

pub struct GeneralModule;

impl SnacHandler for GeneralModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            family: FAMILY,
            version: VERSION,
            tool_id: TOOL_ID,
            tool_version: TOOL_VERSION,
            name: "general",
        }
    }

    fn handle(
        &mut self,
        ctx: &mut SnacContext<'_>,
        snac: &SnacHeader,
        bs: &mut ByteStream<'_>,
    ) -> Result<bool> {
        match snac.subtype {
            SUBTYPE_HOST_ONLINE => host_online(ctx, bs),
            SUBTYPE_REDIRECT => redirect(ctx, bs),
            SUBTYPE_RATE_RESPONSE => rate_response(ctx, bs),
            SUBTYPE_RATE_CHANGE => rate_change(ctx, bs),
            SUBTYPE_SERVER_PAUSE => server_pause(ctx),
            SUBTYPE_SELF_INFO => {
                let info = UserInfo::parse(bs)?;
                ctx.emit(FAMILY, SUBTYPE_SELF_INFO, Event::SelfInfo(info))?;
                Ok(true)
            }
            SUBTYPE_EVIL_NOTIFY => evil_notify(ctx, bs),
            SUBTYPE_MIGRATE => migrate_notice(ctx, bs),
            SUBTYPE_MOTD => motd(ctx, bs),
            SUBTYPE_HOST_VERSIONS => {
                // the versions list is informational only
                let rest = bs.remaining();
                bs.skip(rest)?;
                let pairs = rest / 4;
                tracing::debug!("[general] [host_versions] conn={} pairs={pairs}", ctx.conn);
                rates::request_rates(ctx.session, ctx.conn)?;
                Ok(true)
            }
            SUBTYPE_MEM_REQUEST => mem_request(ctx, bs),
            _ => Ok(false),
        }
    }
}

fn host_online(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let mut families = Vec::with_capacity(bs.remaining() / 2);
    while bs.remaining() >= 2 {
        families.push(bs.get16()?);
    }
    {
        let conn = ctx.session.conn_mut(ctx.conn)?;
        for f in &families {
            conn.add_family(*f);
        }
    }
    tracing::debug!("[general] [host_online] conn={} families={families:04x?}", ctx.conn);
    ctx.emit(FAMILY, SUBTYPE_HOST_ONLINE, Event::HostOnline { families })?;
    // rate parameters depend on the versions we announce, so this goes first
    set_versions(ctx.session, ctx.conn, ctx.modules)?;
    Ok(true)
}

fn redirect(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let tlvs = TlvChain::read(bs)?;
    let (Some(service), Some(host), Some(raw_cookie)) = (
        tlvs.get_u16(0x000d, 1),
        tlvs.get_str(0x0005, 1),
        tlvs.get_raw(0x0006, 1),
    ) else {
        tracing::warn!("[general] [redirect] conn={} missing service/host/cookie", ctx.conn);
        return Ok(false);
    };
    let cookie = Cookie::try_from(&raw_cookie[..])?;
    let chat_join = if service == SERVICE_CHAT {
        ctx.session.pending_chat_join.take()
    } else {
        None
    };
    tracing::info!("[general] [redirect] conn={} service=0x{service:04x} host={host}", ctx.conn);
    ctx.emit(
        FAMILY,
        SUBTYPE_REDIRECT,
        Event::Redirect(Redirect {
            service,
            host,
            cookie,
            chat_join,
        }),
    )?;
    Ok(true)
}

fn rate_response(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let table = RateTable::parse(bs, VERSION >= 3)?;
    tracing::debug!("[general] [rates] conn={} classes={}", ctx.conn, table.len());
    *ctx.session.conn_mut(ctx.conn)?.rates_mut() = table;
    rates::acknowledge(ctx.session, ctx.conn)?;
    ctx.emit(special::FAMILY, special::CONN_INIT_DONE, Event::ConnInitDone)?;
    Ok(true)
}

fn rate_change(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let change = RateChange::parse(bs)?;
    ctx.session
        .conn_mut(ctx.conn)?
        .rates_mut()
        .apply_change(&change);
    tracing::info!(
        "[general] [rate_change] conn={} class={} code={:?} avg={}",
        ctx.conn,
        change.class_id,
        change.code,
        change.current_avg
    );
    ctx.emit(FAMILY, SUBTYPE_RATE_CHANGE, Event::RateChange(change))?;
    Ok(true)
}

fn server_pause(ctx: &mut SnacContext<'_>) -> Result<bool> {
    tracing::info!("[general] [pause] conn={}", ctx.conn);
    migrate::send_pause_ack(ctx.session, ctx.conn)?;
    ctx.emit(FAMILY, SUBTYPE_SERVER_PAUSE, Event::ServerPause)?;
    Ok(true)
}

fn evil_notify(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let new_level = bs.get16()?;
    // anonymous warnings carry no sender block
    let from = if bs.is_empty() {
        None
    } else {
        Some(UserInfo::parse(bs)?)
    };
    ctx.emit(
        FAMILY,
        SUBTYPE_EVIL_NOTIFY,
        Event::EvilNotify { new_level, from },
    )?;
    Ok(true)
}

fn migrate_notice(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let families = ctx.session.conn(ctx.conn)?.families().to_vec();
    let plan = MigrationPlan::parse(bs, families)?;
    tracing::info!("[general] [migrate] conn={} host={}", ctx.conn, plan.host);
    ctx.emit(FAMILY, SUBTYPE_MIGRATE, Event::Migrate(plan))?;
    Ok(true)
}

fn motd(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let code = bs.get16()?;
    let tlvs = TlvChain::read(bs)?;
    let message = tlvs.get_str(0x000b, 1);
    ctx.emit(FAMILY, SUBTYPE_MOTD, Event::Motd { code, message })?;
    Ok(true)
}

fn mem_request(ctx: &mut SnacContext<'_>, bs: &mut ByteStream<'_>) -> Result<bool> {
    let offset = bs.get32()?;
    let len = bs.get32()?;
    let tlvs = TlvChain::read(bs)?;
    let module = tlvs.get_str(0x0001, 1);
    tracing::debug!(
        "[general] [mem_request] conn={} offset=0x{offset:08x} len={len} module={}",
        ctx.conn,
        module.as_deref().unwrap_or("aim.exe")
    );
    let handled = ctx.emit(
        FAMILY,
        SUBTYPE_MEM_REQUEST,
        Event::MemRequest {
            offset,
            len,
            module,
        },
    )?;
    if !handled {
        send_memblock(ctx.session, ctx.conn, offset, len, MemBlock::Unavailable)?;
    }
    Ok(true)
}

/// 0x01/0x17: each server-listed family we have a module for, with its version.
pub fn set_versions(session: &mut Session, conn: ConnId, modules: &[ModuleInfo]) -> Result<u32> {
    let families = session.conn(conn)?.families().to_vec();
    let mut w = ByteWriter::new();
    for family in families {
        match modules.iter().find(|m| m.family == family) {
            Some(m) => {
                w.put16(m.family)?;
                w.put16(m.version)?;
            }
            None => tracing::debug!(
                "[general] [set_versions] server supports family 0x{family:04x}, no module"
            ),
        }
    }
    session.send_snac(conn, FAMILY, SUBTYPE_SET_VERSIONS, w.as_slice())
}

/// 0x01/0x02: family, version, tool id and tool version per negotiated family.
pub fn client_ready(session: &mut Session, conn: ConnId, modules: &[ModuleInfo]) -> Result<u32> {
    let families = session.conn(conn)?.families().to_vec();
    let mut w = ByteWriter::new();
    for m in modules.iter().filter(|m| families.contains(&m.family)) {
        w.put16(m.family)?;
        w.put16(m.version)?;
        w.put16(m.tool_id)?;
        w.put16(m.tool_version)?;
    }
    tracing::debug!("[general] [client_ready] conn={conn}");
    session.send_snac_uncached(conn, FAMILY, SUBTYPE_CLIENT_READY, w.as_slice())
}

/// 0x01/0x20: answers a memory request with a 16-byte MD5.
///
/// Returns `Ok(None)` when the request cannot be answered and nothing was sent.
pub fn send_memblock(
    session: &mut Session,
    conn: ConnId,
    offset: u32,
    len: u32,
    block: MemBlock<'_>,
) -> Result<Option<u32>> {
    let digest = match block {
        MemBlock::Hash(hash) => *hash,
        MemBlock::Data(data) if !data.is_empty() => crypt::memblock_hash(data),
        _ if len == 0 => crypt::memblock_hash(&[]),
        _ if offset == 0x03ff_ffff && len == 0x03ff_ffff => MEMBLOCK_PROBE_HASH,
        _ => {
            tracing::warn!(
                "[general] [memblock] unknown hash request offset=0x{offset:08x} len={len}"
            );
            return Ok(None);
        }
    };
    let mut w = ByteWriter::with_capacity(2 + 16);
    w.put16(0x0010)?;
    w.putraw(&digest)?;
    session
        .send_snac_uncached(conn, FAMILY, SUBTYPE_MEM_REPLY, w.as_slice())
        .map(Some)
}

/// Remembers a chat room so the next chat redirect can be matched to it.
pub fn set_pending_chat_join(session: &mut Session, room: impl Into<String>, exchange: u16) {
    session.pending_chat_join = Some(PendingChatJoin {
        room: room.into(),
        exchange,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::network::flap::FrameType;
    use crate::rates::tests::captured_rate_response;
    use crate::session::ConnKind;
    use crate::snac::Dispatcher;
    use std::sync::{Arc, Mutex};

    fn setup() -> (Dispatcher, Session, ConnId) {
        let mut s = Session::new("tester");
        let c = s.open_conn_with_sequence(ConnKind::Bos, 1);
        (Dispatcher::new(), s, c)
    }

    fn record(d: &mut Dispatcher, family: u16, subtype: u16) -> Arc<Mutex<Vec<Event>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        d.callbacks().register(family, subtype, move |_, _, ev| {
            sink.lock().unwrap().push(ev.clone());
            Ok(())
        });
        events
    }

    /// (family, subtype, body) of every SNAC queued on `conn`.
    fn sent_snacs(s: &mut Session, c: ConnId) -> Vec<(u16, u16, Vec<u8>)> {
        s.conn_mut(c)
            .unwrap()
            .take_pending()
            .into_iter()
            .filter(|f| f[1] == FrameType::Data as u8)
            .map(|f| {
                (
                    codec::get16(&f, 6).unwrap(),
                    codec::get16(&f, 8).unwrap(),
                    f[16..].to_vec(),
                )
            })
            .collect()
    }

    fn dispatch(d: &mut Dispatcher, s: &mut Session, c: ConnId, subtype: u16, body: &[u8]) -> bool {
        let h = SnacHeader::new(FAMILY, subtype, 0, 0x8000_0000);
        d.dispatch(s, c, &h, body).unwrap()
    }

    #[test]
    fn test_connection_bring_up_sequence() {
        let (mut d, mut s, c) = setup();
        let done = record(&mut d, special::FAMILY, special::CONN_INIT_DONE);

        // host online lists general and an unsupported family
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_HOST_ONLINE, &[0, 1, 0, 0x13]));
        assert_eq!(s.conn(c).unwrap().families(), &[0x0001, 0x0013]);
        let sent = sent_snacs(&mut s, c);
        assert_eq!(sent, vec![(FAMILY, SUBTYPE_SET_VERSIONS, vec![0, 1, 0, 3])]);

        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_HOST_VERSIONS, &[0, 1, 0, 3]));
        let sent = sent_snacs(&mut s, c);
        assert_eq!(sent, vec![(FAMILY, SUBTYPE_RATE_REQUEST, vec![])]);

        let rates = captured_rate_response(true);
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_RATE_RESPONSE, &rates));
        let sent = sent_snacs(&mut s, c);
        assert_eq!(sent, vec![(FAMILY, SUBTYPE_RATE_ACK, vec![0, 1, 0, 2])]);
        assert_eq!(s.conn(c).unwrap().rates().len(), 2);
        assert_eq!(*done.lock().unwrap(), vec![Event::ConnInitDone]);

        client_ready(&mut s, c, d.modules()).unwrap();
        let sent = sent_snacs(&mut s, c);
        assert_eq!(
            sent,
            vec![(
                FAMILY,
                SUBTYPE_CLIENT_READY,
                vec![0, 1, 0, 3, 0x01, 0x10, 0x04, 0x7b]
            )]
        );
    }

    #[test]
    fn test_unanswered_snacs_leave_cache_empty() {
        let (d, mut s, c) = setup();
        s.conn_mut(c).unwrap().add_family(FAMILY);
        for _ in 0..10_000 {
            client_ready(&mut s, c, d.modules()).unwrap();
            s.conn_mut(c).unwrap().take_pending();
        }
        send_memblock(&mut s, c, 0, 0, MemBlock::Unavailable).unwrap();
        assert!(s.snac_cache.is_empty());

        // answered requests are still tracked for routing
        let id = crate::rates::request_rates(&mut s, c).unwrap();
        assert_eq!(s.snac_cache.resolve_request(id), Some((FAMILY, SUBTYPE_RATE_REQUEST)));
        assert_eq!(s.snac_cache.len(), 1);
    }

    #[test]
    fn test_redirect_consumes_pending_chat_join() {
        let (mut d, mut s, c) = setup();
        let events = record(&mut d, FAMILY, SUBTYPE_REDIRECT);
        set_pending_chat_join(&mut s, "lobby", 4);

        let mut tlvs = TlvChain::new();
        tlvs.append_u16(0x000d, SERVICE_CHAT).unwrap();
        tlvs.append(0x0005, b"10.0.0.9:5190").unwrap();
        tlvs.append(0x0006, [3u8; 16]).unwrap();
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_REDIRECT, &tlvs.serialize().unwrap()));

        let events = events.lock().unwrap();
        let Event::Redirect(r) = &events[0] else {
            panic!("expected redirect, got {:?}", events[0]);
        };
        assert_eq!(r.host, "10.0.0.9:5190");
        assert_eq!(r.cookie, Cookie::new([3u8; 16]));
        assert_eq!(r.chat_join.as_ref().unwrap().room, "lobby");
        assert!(s.pending_chat_join.is_none());
    }

    #[test]
    fn test_redirect_with_short_cookie_rejected() {
        let (mut d, mut s, c) = setup();
        let mut tlvs = TlvChain::new();
        tlvs.append_u16(0x000d, 0x0002).unwrap();
        tlvs.append(0x0005, b"10.0.0.9").unwrap();
        tlvs.append(0x0006, [3u8; 8]).unwrap();
        let h = SnacHeader::new(FAMILY, SUBTYPE_REDIRECT, 0, 1);
        let err = d.dispatch(&mut s, c, &h, &tlvs.serialize().unwrap()).unwrap_err();
        assert!(matches!(err, crate::error::OscarError::InvalidCookieLength(8)));
    }

    #[test]
    fn test_server_pause_acks_families() {
        let (mut d, mut s, c) = setup();
        s.conn_mut(c).unwrap().add_family(0x0001);
        s.conn_mut(c).unwrap().add_family(0x0004);
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_SERVER_PAUSE, &[]));
        let sent = sent_snacs(&mut s, c);
        assert_eq!(sent, vec![(FAMILY, SUBTYPE_PAUSE_ACK, vec![0, 1, 0, 4])]);
    }

    #[test]
    fn test_self_info_and_evil_notify() {
        let (mut d, mut s, c) = setup();
        let selfinfo = record(&mut d, FAMILY, SUBTYPE_SELF_INFO);
        let evil = record(&mut d, FAMILY, SUBTYPE_EVIL_NOTIFY);

        let mut body = vec![6];
        body.extend_from_slice(b"tester");
        body.extend_from_slice(&[0x00, 0x0a, 0x00, 0x01]);
        body.extend_from_slice(&[0x00, 0x04, 0x00, 0x02, 0x00, 0x05]);
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_SELF_INFO, &body));
        let seen = selfinfo.lock().unwrap();
        let Event::SelfInfo(info) = &seen[0] else {
            panic!("expected self info");
        };
        assert_eq!(info.screen_name, "tester");
        assert_eq!(info.warning_level, 10);
        assert_eq!(info.idle_minutes(), Some(5));

        // anonymous warning: level only
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_EVIL_NOTIFY, &[0x00, 0x1e]));
        assert_eq!(
            evil.lock().unwrap()[0],
            Event::EvilNotify {
                new_level: 30,
                from: None
            }
        );
    }

    #[test]
    fn test_motd_and_rate_change() {
        let (mut d, mut s, c) = setup();
        let motd_events = record(&mut d, FAMILY, SUBTYPE_MOTD);
        let mut body = vec![0x00, 0x04];
        let mut tlvs = TlvChain::new();
        tlvs.append(0x000b, b"hello").unwrap();
        body.extend_from_slice(&tlvs.serialize().unwrap());
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_MOTD, &body));
        assert_eq!(
            motd_events.lock().unwrap()[0],
            Event::Motd {
                code: 4,
                message: Some("hello".into())
            }
        );

        let rates = captured_rate_response(true);
        *s.conn_mut(c).unwrap().rates_mut() =
            RateTable::parse(&mut ByteStream::new(&rates), true).unwrap();
        let mut w = ByteWriter::new();
        w.put16(2).unwrap();
        w.put16(1).unwrap();
        for v in [80u32, 2500, 2000, 1500, 800, 1999, 6000] {
            w.put32(v).unwrap();
        }
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_RATE_CHANGE, w.as_slice()));
        assert_eq!(s.conn(c).unwrap().rates().class(1).unwrap().current_avg, 1999);
    }

    #[test]
    fn test_mem_request_default_reply() {
        let (mut d, mut s, c) = setup();
        let mut body = vec![0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut tlvs = TlvChain::new();
        tlvs.append(0x0001, b"aim.exe").unwrap();
        body.extend_from_slice(&tlvs.serialize().unwrap());
        assert!(dispatch(&mut d, &mut s, c, SUBTYPE_MEM_REQUEST, &body));

        let sent = sent_snacs(&mut s, c);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, SUBTYPE_MEM_REPLY);
        assert_eq!(&sent[0].2[..2], &[0x00, 0x10]);
        assert_eq!(
            crypt::digest_hex(&sent[0].2[2..]),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_memblock_variants() {
        let (_, mut s, c) = setup();
        assert!(send_memblock(&mut s, c, 0, 5, MemBlock::Data(b"hello")).unwrap().is_some());
        assert!(send_memblock(&mut s, c, 0x03ff_ffff, 0x03ff_ffff, MemBlock::Unavailable)
            .unwrap()
            .is_some());
        assert!(send_memblock(&mut s, c, 0x1234, 16, MemBlock::Unavailable)
            .unwrap()
            .is_none());
        let sent = sent_snacs(&mut s, c);
        assert_eq!(crypt::digest_hex(&sent[0].2[2..]), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(&sent[1].2[2..], &MEMBLOCK_PROBE_HASH);
    }
}
