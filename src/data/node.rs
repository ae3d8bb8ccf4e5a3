//! Cluster node records

use serde::{Deserialize, Serialize};

/// A cluster member, either a meta node or a data node
///
/// Data nodes carry two addresses: `addr` is the HTTP endpoint used by
/// clients, `tcp_addr` the inter-node endpoint used for shard traffic.
/// Meta nodes only use `addr`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node id, never reused
    pub id: u64,
    /// HTTP (data node) or RPC (meta node) address
    pub addr: String,
    /// Inter-node TCP address
    #[serde(default)]
    pub tcp_addr: String,
}

impl NodeInfo {
    /// Create a node record.
    pub fn new(id: u64, addr: impl Into<String>, tcp_addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
            tcp_addr: tcp_addr.into(),
        }
    }
}
