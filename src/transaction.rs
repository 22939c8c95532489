use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// Source of the `ClientID`/`ClientTransactionID` pair attached to every
/// outgoing request.
///
/// The client id is fixed for the lifetime of the source; transaction ids
/// increase monotonically. Servers use both purely for log correlation, so
/// the only requirement is that the id sequence is never reused within one
/// source.
///
/// Clients created without an explicit source share the per-process one from
/// [`TransactionSource::process_wide`]. Tests construct their own via
/// [`TransactionSource::starting_at`] to get deterministic ids.
#[derive(Debug)]
pub struct TransactionSource {
    client_id: u32,
    next_transaction_id: AtomicU32,
}

impl TransactionSource {
    /// Create a source with the given client id, starting transaction ids at 1.
    pub fn new(client_id: u32) -> Self {
        Self::starting_at(client_id, 1)
    }

    /// Create a source with full control over both ids.
    pub const fn starting_at(client_id: u32, first_transaction_id: u32) -> Self {
        Self {
            client_id,
            next_transaction_id: AtomicU32::new(first_transaction_id),
        }
    }

    /// The fixed client id of this source.
    pub const fn client_id(&self) -> u32 {
        self.client_id
    }

    /// The shared per-process source, created on first use with a random
    /// client id.
    pub fn process_wide() -> Arc<Self> {
        static PROCESS_WIDE: OnceLock<Arc<TransactionSource>> = OnceLock::new();
        Arc::clone(PROCESS_WIDE.get_or_init(|| Arc::new(Self::default())))
    }

    pub(crate) fn next(&self) -> RequestTransaction {
        RequestTransaction {
            client_transaction_id: self.next_transaction_id.fetch_add(1, Ordering::Relaxed),
            client_id: self.client_id,
        }
    }
}

impl Default for TransactionSource {
    fn default() -> Self {
        Self::new(rand::random())
    }
}

/// Ids serialized into one outgoing request.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct RequestTransaction {
    #[serde(rename = "ClientTransactionID")]
    pub(crate) client_transaction_id: u32,
    #[serde(rename = "ClientID")]
    pub(crate) client_id: u32,
}

/// Ids echoed back in a response envelope. Both are optional on the wire.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct ResponseTransaction {
    #[serde(rename = "ClientTransactionID", default)]
    pub(crate) client_transaction_id: Option<u32>,
    #[serde(rename = "ServerTransactionID", default)]
    pub(crate) server_transaction_id: Option<u32>,
}
