//! Oscar - AIM/ICQ OSCAR protocol engine
//!
//! FLAP framing, TLV codec, SNAC dispatch, the authorizer login handshake,
//! rate-class bookkeeping and connection migration. The engine never opens
//! sockets: callers feed received bytes in and drain encoded frames out.

// ============================================
// Wire layer
// ============================================

/// Big-endian byte codec and TLV chains
pub mod codec;
/// FLAP framing, password hashing, async stream helpers
pub mod network;

// ============================================
// Session layer
// ============================================

/// Engine error taxonomy
pub mod error;
/// Sessions and per-connection state
pub mod session;
/// SNAC dispatcher, family modules and user callbacks
pub mod snac;
/// Authorizer login state machine
pub mod login;
/// Rate classes and self-throttling
pub mod rates;
/// Server pause and migration
pub mod migrate;

// ============================================
// Client settings
// ============================================

/// Login client configuration (YAML)
pub mod config;

pub use error::{OscarError, Result};
pub use session::{ConnId, ConnKind, Connection, Session};
pub use snac::Dispatcher;
