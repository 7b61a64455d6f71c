//! Sessions and connections
//!
//! A [`Session`] is owned by the caller and borrowed into every engine call.
//! It holds zero or more [`Connection`]s (authorizer, BOS, chat), each with
//! its own FLAP sequence counter, send queue, receive buffer, negotiated
//! families and rate table.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{ByteWriter, TlvChain, MAX_PAYLOAD};
use crate::error::{OscarError, Result};
use crate::login::Login;
use crate::network::crypt::Cookie;
use crate::network::flap::{self, Frame, FrameType, FLAP_VERSION};
use crate::rates::RateTable;
use crate::snac::cache::SnacCache;
use crate::snac::SnacHeader;

/// Handle for one connection inside a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a connection is for. Service ids match the redirect TLV 0x000d.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnKind {
    Authorizer,
    Bos,
    ChatNav,
    Chat,
    Other(u16),
}

impl ConnKind {
    pub fn from_service_id(id: u16) -> Self {
        match id {
            0x0002 => ConnKind::Bos,
            0x0007 | 0x0017 => ConnKind::Authorizer,
            0x000d => ConnKind::ChatNav,
            0x000e => ConnKind::Chat,
            other => ConnKind::Other(other),
        }
    }

    pub fn service_id(&self) -> u16 {
        match self {
            ConnKind::Authorizer => 0x0017,
            ConnKind::Bos => 0x0002,
            ConnKind::ChatNav => 0x000d,
            ConnKind::Chat => 0x000e,
            ConnKind::Other(id) => *id,
        }
    }
}

/// One FLAP stream.
#[derive(Debug)]
pub struct Connection {
    id: ConnId,
    kind: ConnKind,
    tx_seq: u16,
    last_rx_seq: Option<u16>,
    families: Vec<u16>,
    send_queue: VecDeque<Bytes>,
    rx_buf: BytesMut,
    max_payload: usize,
    rates: RateTable,
    closed: bool,
}

impl Connection {
    /// A new connection whose first outgoing frame carries sequence 1.
    pub fn new(id: ConnId, kind: ConnKind) -> Self {
        Self::with_sequence(id, kind, 1)
    }

    pub fn with_sequence(id: ConnId, kind: ConnKind, first_seq: u16) -> Self {
        Self {
            id,
            kind,
            tx_seq: first_seq,
            last_rx_seq: None,
            families: Vec::new(),
            send_queue: VecDeque::new(),
            rx_buf: BytesMut::new(),
            max_payload: MAX_PAYLOAD,
            rates: RateTable::default(),
            closed: false,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn kind(&self) -> ConnKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Caps outgoing payloads below the 16-bit FLAP limit.
    pub fn set_max_payload(&mut self, max: usize) {
        self.max_payload = max.min(MAX_PAYLOAD);
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// The sequence number the next [`Connection::send`] will use.
    pub fn next_sequence(&self) -> u16 {
        self.tx_seq
    }

    // -- families --

    pub fn families(&self) -> &[u16] {
        &self.families
    }

    pub fn add_family(&mut self, family: u16) {
        if !self.families.contains(&family) {
            self.families.push(family);
        }
    }

    pub fn has_family(&self, family: u16) -> bool {
        self.families.contains(&family)
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn rates_mut(&mut self) -> &mut RateTable {
        &mut self.rates
    }

    // -- transmit --

    /// Assigns the next sequence number, frames `payload` and queues it.
    pub fn send(&mut self, frame_type: FrameType, payload: impl Into<Bytes>) -> Result<u16> {
        if self.closed {
            return Err(OscarError::ConnectionClosed(self.id));
        }
        let payload = payload.into();
        if payload.len() > self.max_payload {
            return Err(OscarError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }
        let seq = self.tx_seq;
        let wire = flap::encode(&Frame::new(frame_type, seq, payload))?;
        self.tx_seq = self.tx_seq.wrapping_add(1);
        let id = self.id;
        tracing::trace!(
            "[flap] [send] conn={id} type={frame_type:?} seq=0x{seq:04x} len={}",
            wire.len() - flap::FLAP_HEADER_LEN
        );
        self.send_queue.push_back(wire);
        Ok(seq)
    }

    /// Queues a SNAC on the data channel.
    pub fn send_snac(&mut self, header: &SnacHeader, body: &[u8]) -> Result<u16> {
        let mut w = ByteWriter::with_capacity(self.max_payload);
        header.write(&mut w)?;
        w.putraw(body)?;
        self.send(FrameType::Data, w.into_bytes())
    }

    /// Channel 1 with the bare version word: the connection acknowledgement.
    pub fn send_flap_version(&mut self) -> Result<u16> {
        self.send(FrameType::Signon, FLAP_VERSION.to_be_bytes().to_vec())
    }

    /// BOS sign-on: version word followed by TLV 0x0006 carrying the cookie.
    pub fn send_cookie(&mut self, cookie: &Cookie) -> Result<u16> {
        let mut tlvs = TlvChain::new();
        tlvs.append(0x0006, cookie)?;
        let mut w = ByteWriter::with_capacity(4 + tlvs.length());
        w.put32(FLAP_VERSION)?;
        tlvs.write(&mut w)?;
        self.send(FrameType::Signon, w.into_bytes())
    }

    /// Migration sign-on: the raw 16 cookie bytes, not TLV-wrapped.
    pub fn send_raw_cookie(&mut self, cookie: &Cookie) -> Result<u16> {
        self.send(FrameType::Signon, cookie.as_bytes().to_vec())
    }

    pub fn send_keepalive(&mut self) -> Result<u16> {
        self.send(FrameType::Keepalive, Bytes::new())
    }

    pub fn send_signoff(&mut self) -> Result<u16> {
        self.send(FrameType::Signoff, Bytes::new())
    }

    pub fn has_pending(&self) -> bool {
        !self.send_queue.is_empty()
    }

    /// Drains encoded frames in FIFO order.
    pub fn take_pending(&mut self) -> Vec<Bytes> {
        self.send_queue.drain(..).collect()
    }

    // -- receive --

    /// Appends raw socket bytes to the receive buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx_buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.rx_buf.len()
    }

    /// Extracts at most one complete frame from the receive buffer.
    ///
    /// `Ok(None)` means more bytes are needed. A bad marker or channel is a
    /// [`OscarError::ProtocolError`] and leaves the buffer untouched; the
    /// connection must be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Err(OscarError::ConnectionClosed(self.id));
        }
        let (frame, used) = match flap::decode(&self.rx_buf) {
            Ok(decoded) => decoded,
            Err(OscarError::TruncatedData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.rx_buf.advance(used);
        self.accept(frame).map(Some)
    }

    /// Sequence check for a frame read directly off a stream.
    pub fn accept(&mut self, frame: Frame) -> Result<Frame> {
        let (id, seq) = (self.id, frame.sequence);
        if self.last_rx_seq == Some(seq) {
            tracing::warn!("[flap] [duplicate] conn={id} seq=0x{seq:04x}");
            return Err(OscarError::DuplicateSequence(seq));
        }
        self.last_rx_seq = Some(seq);
        tracing::trace!(
            "[flap] [recv] conn={id} type={:?} seq=0x{seq:04x} len={}",
            frame.frame_type,
            frame.payload.len()
        );
        Ok(frame)
    }

    fn close(&mut self) {
        self.closed = true;
        self.send_queue.clear();
        self.rx_buf.clear();
    }
}

/// A chat room the client asked to join; consumed by the next chat redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChatJoin {
    pub room: String,
    pub exchange: u16,
}

/// Per-user engine state.
#[derive(Debug)]
pub struct Session {
    pub screen_name: String,
    pub login: Login,
    pub pending_chat_join: Option<PendingChatJoin>,
    pub snac_cache: SnacCache,
    next_request_id: u32,
    next_conn_id: u32,
    conns: BTreeMap<ConnId, Connection>,
}

impl Session {
    pub fn new(screen_name: impl Into<String>) -> Self {
        Self {
            screen_name: screen_name.into(),
            login: Login::default(),
            pending_chat_join: None,
            snac_cache: SnacCache::default(),
            next_request_id: 1,
            next_conn_id: 1,
            conns: BTreeMap::new(),
        }
    }

    /// Allocates the next SNAC request id. Ids are never reused.
    pub fn next_request_id(&mut self) -> Result<u32> {
        // 0 is never handed out; reaching it means the counter wrapped
        let id = self.next_request_id;
        if id == 0 {
            return Err(OscarError::RequestIdExhausted);
        }
        self.next_request_id = id.wrapping_add(1);
        Ok(id)
    }

    /// Allocates a request id and remembers which SNAC it belongs to.
    ///
    /// Stale entries are purged on the way in, see
    /// [`SNAC_CACHE_MAX_AGE`](crate::snac::cache::SNAC_CACHE_MAX_AGE).
    pub fn cache_snac(
        &mut self,
        family: u16,
        subtype: u16,
        flags: u16,
        data: Option<Bytes>,
    ) -> Result<u32> {
        let id = self.next_request_id()?;
        self.snac_cache.cache_request(family, subtype, flags, id, data);
        Ok(id)
    }

    /// Builds a header with a fresh cached request id and queues the SNAC.
    pub fn send_snac(&mut self, conn: ConnId, family: u16, subtype: u16, body: &[u8]) -> Result<u32> {
        let request_id = self.cache_snac(family, subtype, 0, None)?;
        let header = SnacHeader::new(family, subtype, 0, request_id);
        self.conn_mut(conn)?.send_snac(&header, body)?;
        Ok(request_id)
    }

    /// Like [`Session::send_snac`] for SNACs the server never answers
    /// (acks, client-ready, replies). The request id is not cached.
    pub fn send_snac_uncached(
        &mut self,
        conn: ConnId,
        family: u16,
        subtype: u16,
        body: &[u8],
    ) -> Result<u32> {
        let request_id = self.next_request_id()?;
        let header = SnacHeader::new(family, subtype, 0, request_id);
        self.conn_mut(conn)?.send_snac(&header, body)?;
        Ok(request_id)
    }

    // -- connections --

    pub fn open_conn(&mut self, kind: ConnKind) -> ConnId {
        let id = self.alloc_conn_id();
        self.conns.insert(id, Connection::new(id, kind));
        tracing::debug!("[session] [open] conn={id} kind={kind:?}");
        id
    }

    /// Like [`Session::open_conn`] with a fixed first sequence number.
    pub fn open_conn_with_sequence(&mut self, kind: ConnKind, first_seq: u16) -> ConnId {
        let id = self.alloc_conn_id();
        self.conns
            .insert(id, Connection::with_sequence(id, kind, first_seq));
        id
    }

    fn alloc_conn_id(&mut self) -> ConnId {
        let id = ConnId(self.next_conn_id);
        self.next_conn_id = self.next_conn_id.wrapping_add(1);
        id
    }

    pub fn conn(&self, id: ConnId) -> Result<&Connection> {
        self.conns.get(&id).ok_or(OscarError::UnknownConnection(id))
    }

    pub fn conn_mut(&mut self, id: ConnId) -> Result<&mut Connection> {
        self.conns
            .get_mut(&id)
            .ok_or(OscarError::UnknownConnection(id))
    }

    /// First open connection of `kind`.
    pub fn find_conn(&self, kind: ConnKind) -> Option<ConnId> {
        self.conns
            .values()
            .find(|c| c.kind == kind && !c.closed)
            .map(|c| c.id)
    }

    pub fn conn_ids(&self) -> Vec<ConnId> {
        self.conns.keys().copied().collect()
    }

    /// Closes and forgets one connection. Other connections are unaffected.
    ///
    /// A login in progress on this connection is aborted back to
    /// `Disconnected`.
    pub fn close_conn(&mut self, id: ConnId) -> Result<()> {
        let mut conn = self
            .conns
            .remove(&id)
            .ok_or(OscarError::UnknownConnection(id))?;
        conn.close();
        if self.login.conn() == Some(id) {
            self.login.reset();
        }
        tracing::debug!("[session] [close] conn={id} kind={:?}", conn.kind);
        Ok(())
    }
}
