//! Rate classes
//!
//! The server sends its rate table once per connection (0x01/0x07). Each
//! class carries moving-average thresholds; every (family, subtype) pair
//! belongs to at most one class. The server enforces the limits. The
//! [`RateTable::check`] projection lets a client hold back before it does.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::codec::{ByteStream, ByteWriter};
use crate::error::Result;
use crate::session::{ConnId, Session};

/// Bytes of class parameters after the id, for general-module version < 3.
const CLASS_PARAMS_LEN: usize = 7 * 4;
/// Trailing bytes the server adds for general-module version >= 3.
pub const EXTENDED_PARAMS_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateClass {
    pub id: u16,
    pub window_size: u32,
    pub clear_level: u32,
    pub alert_level: u32,
    pub limit_level: u32,
    pub disconnect_level: u32,
    pub current_avg: u32,
    pub max_avg: u32,
    /// The version >= 3 tail: last-send time and a state byte.
    pub extended: Option<[u8; EXTENDED_PARAMS_LEN]>,
    last_send: Option<Instant>,
}

impl RateClass {
    fn read(bs: &mut ByteStream<'_>, extended: bool) -> Result<Self> {
        let id = bs.get16()?;
        // one bounds check for the whole fixed block
        let mut params = bs.split(CLASS_PARAMS_LEN)?;
        let mut class = Self {
            id,
            window_size: params.get32()?,
            clear_level: params.get32()?,
            alert_level: params.get32()?,
            limit_level: params.get32()?,
            disconnect_level: params.get32()?,
            current_avg: params.get32()?,
            max_avg: params.get32()?,
            extended: None,
            last_send: None,
        };
        if extended {
            let mut tail = [0u8; EXTENDED_PARAMS_LEN];
            tail.copy_from_slice(bs.getraw(EXTENDED_PARAMS_LEN)?);
            class.extended = Some(tail);
        }
        Ok(class)
    }

    /// The moving average after a send `elapsed_ms` after the previous one.
    fn projected(&self, elapsed_ms: u64) -> u32 {
        let window = u64::from(self.window_size.max(1));
        let avg = ((window - 1) * u64::from(self.current_avg) + elapsed_ms) / window;
        avg.min(u64::from(self.max_avg)) as u32
    }

    fn status_for(&self, avg: u32) -> RateStatus {
        if avg <= self.disconnect_level {
            RateStatus::Disconnect
        } else if avg <= self.limit_level {
            RateStatus::Limited
        } else if avg <= self.alert_level {
            RateStatus::Alert
        } else {
            RateStatus::Clear
        }
    }
}

/// Which class a SNAC is accounted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassId {
    Class(u16),
    Unclassified,
}

/// Where a send would leave its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RateStatus {
    Clear,
    Alert,
    Limited,
    Disconnect,
}

/// 0x01/0x0a notice kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateChangeCode {
    Changed,
    Warning,
    Limit,
    Clear,
    Other(u16),
}

impl From<u16> for RateChangeCode {
    fn from(code: u16) -> Self {
        match code {
            1 => RateChangeCode::Changed,
            2 => RateChangeCode::Warning,
            3 => RateChangeCode::Limit,
            4 => RateChangeCode::Clear,
            other => RateChangeCode::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateChange {
    pub code: RateChangeCode,
    pub class_id: u16,
    pub window_size: u32,
    pub clear_level: u32,
    pub alert_level: u32,
    pub limit_level: u32,
    pub disconnect_level: u32,
    pub current_avg: u32,
    pub max_avg: u32,
}

impl RateChange {
    pub fn parse(bs: &mut ByteStream<'_>) -> Result<Self> {
        Ok(Self {
            code: RateChangeCode::from(bs.get16()?),
            class_id: bs.get16()?,
            window_size: bs.get32()?,
            clear_level: bs.get32()?,
            alert_level: bs.get32()?,
            limit_level: bs.get32()?,
            disconnect_level: bs.get32()?,
            current_avg: bs.get32()?,
            max_avg: bs.get32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTable {
    classes: BTreeMap<u16, RateClass>,
    members: HashMap<(u16, u16), u16>,
}

impl RateTable {
    /// Parses a 0x01/0x07 body: `count`, the class parameters, then each
    /// class's member pairs.
    ///
    /// `extended` is set when the general module advertised version >= 3.
    pub fn parse(bs: &mut ByteStream<'_>, extended: bool) -> Result<Self> {
        let mut table = Self::default();
        let count = bs.get16()?;
        for _ in 0..count {
            let class = RateClass::read(bs, extended)?;
            let id = class.id;
            if table.classes.contains_key(&id) {
                tracing::warn!("[rates] [duplicate] class={id} listed twice, keeping first");
                continue;
            }
            table.classes.insert(id, class);
        }
        for _ in 0..count {
            let class_id = bs.get16()?;
            let pairs = bs.get16()?;
            let known = table.classes.contains_key(&class_id);
            for _ in 0..pairs {
                let pair = (bs.get16()?, bs.get16()?);
                if !known {
                    continue;
                }
                if let Some(prev) = table.members.get(&pair) {
                    tracing::warn!(
                        "[rates] [duplicate] pair={:04x}/{:04x} class={class_id} owner={prev}",
                        pair.0,
                        pair.1
                    );
                    continue;
                }
                table.members.insert(pair, class_id);
            }
            if !known {
                tracing::debug!("[rates] [members] unknown class={class_id} pairs={pairs}");
            }
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class(&self, id: u16) -> Option<&RateClass> {
        self.classes.get(&id)
    }

    pub fn class_ids(&self) -> Vec<u16> {
        self.classes.keys().copied().collect()
    }

    /// Member pairs of one class, sorted.
    pub fn members_of(&self, id: u16) -> Vec<(u16, u16)> {
        let mut pairs: Vec<_> = self
            .members
            .iter()
            .filter(|(_, c)| **c == id)
            .map(|(p, _)| *p)
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn class_for(&self, family: u16, subtype: u16) -> ClassId {
        match self.members.get(&(family, subtype)) {
            Some(id) => ClassId::Class(*id),
            None => ClassId::Unclassified,
        }
    }

    /// Body of the 0x01/0x08 acknowledgement: every class id.
    pub fn ack_body(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(self.classes.len() * 2);
        for id in self.classes.keys() {
            w.put16(*id)?;
        }
        Ok(w.as_slice().to_vec())
    }

    /// Updates the live averages from a rate-change notice.
    pub fn apply_change(&mut self, change: &RateChange) -> bool {
        let Some(class) = self.classes.get_mut(&change.class_id) else {
            tracing::debug!("[rates] [change] unknown class={}", change.class_id);
            return false;
        };
        class.window_size = change.window_size;
        class.clear_level = change.clear_level;
        class.alert_level = change.alert_level;
        class.limit_level = change.limit_level;
        class.disconnect_level = change.disconnect_level;
        class.current_avg = change.current_avg;
        class.max_avg = change.max_avg;
        true
    }

    /// Projects what sending (family, subtype) at `now` would do.
    ///
    /// Unclassified SNACs and first sends are always `Clear`.
    pub fn check(&self, family: u16, subtype: u16, now: Instant) -> RateStatus {
        let ClassId::Class(id) = self.class_for(family, subtype) else {
            return RateStatus::Clear;
        };
        let Some(class) = self.classes.get(&id) else {
            return RateStatus::Clear;
        };
        match class.last_send {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last).as_millis() as u64;
                class.status_for(class.projected(elapsed))
            }
            None => RateStatus::Clear,
        }
    }

    /// Folds a send at `now` into its class average.
    pub fn record_send(&mut self, family: u16, subtype: u16, now: Instant) {
        let ClassId::Class(id) = self.class_for(family, subtype) else {
            return;
        };
        if let Some(class) = self.classes.get_mut(&id) {
            if let Some(last) = class.last_send {
                let elapsed = now.saturating_duration_since(last).as_millis() as u64;
                class.current_avg = class.projected(elapsed);
            }
            class.last_send = Some(now);
        }
    }
}

/// Sends 0x01/0x06, asking for the rate table.
pub fn request_rates(session: &mut Session, conn: ConnId) -> Result<u32> {
    session.send_snac(conn, 0x0001, 0x0006, &[])
}

/// Sends 0x01/0x08 accepting every class on `conn`. Must precede any
/// rate-limited SNAC or the server never finishes connection setup.
pub fn acknowledge(session: &mut Session, conn: ConnId) -> Result<u32> {
    let body = session.conn(conn)?.rates().ack_body()?;
    tracing::debug!("[rates] [ack] conn={conn} classes={}", body.len() / 2);
    session.send_snac_uncached(conn, 0x0001, 0x0008, &body)
}
