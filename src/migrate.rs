//! Server pause and connection migration
//!
//! A migration is announced as 0x01/0x0b (pause), answered with 0x01/0x0c,
//! and completed by 0x01/0x12 carrying the new host and a cookie. The
//! caller connects to the new host; the first frame on it is the raw cookie,
//! after which traffic resumes without logging in again.

use crate::codec::{ByteStream, ByteWriter, TlvChain};
use crate::error::{OscarError, Result};
use crate::login::packet::split_host_port;
use crate::network::crypt::Cookie;
use crate::session::{ConnId, Session};

/// Where a connection's families are moving to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub host: String,
    /// Port carried in the host TLV, if any.
    pub port: Option<u16>,
    pub cookie: Cookie,
    /// Families that move: everything the old connection carried.
    pub families: Vec<u16>,
    /// Explicit group list from a bifurcated migration. Informational only.
    pub groups: Vec<u16>,
}

impl MigrationPlan {
    /// Parses a 0x01/0x12 body. `families` are the old connection's families.
    pub fn parse(bs: &mut ByteStream<'_>, families: Vec<u16>) -> Result<Self> {
        let group_count = bs.get16()? as usize;
        let mut groups = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            groups.push(bs.get16()?);
        }
        if !groups.is_empty() {
            tracing::warn!("[migrate] [bifurcated] groups={groups:04x?} migrating all families");
        }

        let tlvs = TlvChain::read(bs)?;
        let addr = tlvs
            .get_str(0x0005, 1)
            .ok_or_else(|| OscarError::protocol("migrate without new host"))?;
        let raw_cookie = tlvs
            .get_raw(0x0006, 1)
            .ok_or_else(|| OscarError::protocol("migrate without cookie"))?;
        let cookie = Cookie::try_from(&raw_cookie[..])?;

        let (host, port) = match addr.rsplit_once(':') {
            Some((_, p)) if p.parse::<u16>().is_ok() => {
                let (host, port) = split_host_port(&addr, 0);
                (host, Some(port))
            }
            _ => (addr, None),
        };

        Ok(Self {
            host,
            port,
            cookie,
            families,
            groups,
        })
    }

    /// Host and port to connect to; `default_port` is the old connection's.
    pub fn address(&self, default_port: u16) -> (String, u16) {
        (self.host.clone(), self.port.unwrap_or(default_port))
    }
}

/// 0x01/0x0c: every family the connection holds.
pub fn send_pause_ack(session: &mut Session, conn: ConnId) -> Result<u32> {
    let families = session.conn(conn)?.families().to_vec();
    let mut w = ByteWriter::with_capacity(families.len() * 2);
    for family in &families {
        w.put16(*family)?;
    }
    session.send_snac_uncached(conn, 0x0001, 0x000c, w.as_slice())
}

/// Replaces `old` with a new connection of the same kind.
///
/// The old connection is closed. The new one carries the plan's families
/// and has the raw cookie queued as its first frame; the caller flushes it
/// to [`MigrationPlan::address`].
pub fn apply(session: &mut Session, old: ConnId, plan: &MigrationPlan) -> Result<ConnId> {
    let kind = session.conn(old)?.kind();
    let max_payload = session.conn(old)?.max_payload();
    session.close_conn(old)?;

    let new = session.open_conn(kind);
    let conn = session.conn_mut(new)?;
    conn.set_max_payload(max_payload);
    for family in &plan.families {
        conn.add_family(*family);
    }
    conn.send_raw_cookie(&plan.cookie)?;
    tracing::info!(
        "[migrate] [apply] old={old} new={new} host={} families={}",
        plan.host,
        plan.families.len()
    );
    Ok(new)
}
