//! Token ring and partition key encoding
//!
//! Every node owns `vnodes` tokens on a 64-bit ring. A partition's token is
//! the xxh3 hash of its encoded key; the owner is the node holding the first
//! ring token at or after it, wrapping around at the end.

use docstore_core::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::session::NodeId;

/// Sorted ring of `(token, owner)` pairs
#[derive(Debug, Clone)]
pub struct TokenRing {
    tokens: Vec<(u64, NodeId)>,
}

impl TokenRing {
    /// Build a ring for `nodes` nodes with `vnodes` tokens each
    ///
    /// Both counts are clamped to at least one.
    pub fn new(nodes: usize, vnodes: usize) -> Self {
        let nodes = nodes.max(1);
        let vnodes = vnodes.max(1);
        let mut tokens: Vec<(u64, NodeId)> = (0..nodes)
            .flat_map(|n| {
                (0..vnodes).map(move |v| (xxh3_64(format!("node-{}/vnode-{}", n, v).as_bytes()), NodeId(n)))
            })
            .collect();
        tokens.sort_unstable();
        Self { tokens }
    }

    /// Owner of a token
    pub fn owner(&self, token: u64) -> NodeId {
        let i = self.tokens.partition_point(|(t, _)| *t < token);
        match self.tokens.get(i) {
            Some((_, node)) => *node,
            None => self.tokens[0].1,
        }
    }

    /// Number of tokens on the ring
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True for an empty ring (never, after `new`)
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Token of an encoded partition key
pub fn token(encoded_key: &[u8]) -> u64 {
    xxh3_64(encoded_key)
}

/// Canonical byte encoding of partition key values
///
/// Each component is written as a kind tag, a big-endian length and the
/// payload, so distinct keys never share an encoding.
pub fn encode_key(values: &[&Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 16);
    for value in values {
        let (tag, payload): (u8, Vec<u8>) = match value {
            Value::Null => (0, Vec::new()),
            Value::Boolean(b) => (1, vec![u8::from(*b)]),
            Value::BigInt(n) => (2, n.to_be_bytes().to_vec()),
            Value::Double(n) => (3, n.to_bits().to_be_bytes().to_vec()),
            Value::Text(s) => (4, s.as_bytes().to_vec()),
            Value::Uuid(u) => (5, u.as_bytes().to_vec()),
            Value::Timestamp(t) => (6, t.timestamp_millis().to_be_bytes().to_vec()),
            Value::Blob(b) => (7, b.clone()),
        };
        out.push(tag);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
    out
}
