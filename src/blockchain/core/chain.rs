use crate::blockchain::core::codec::{self, CanonicalTemplate, SignableFields};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Caller-supplied event description; the ledger never interprets it.
pub type Payload = Map<String, Value>;

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn genesis_payload() -> Payload {
    let mut payload = Payload::new();
    payload.insert("incident_id".to_string(), json!("0"));
    payload.insert("data".to_string(), json!("Genesis Block"));
    payload
}

/// A block before it has been mined and signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSkeleton {
    pub index: u64,
    pub timestamp: String,
    pub incident_id: String,
    pub data: Value,
    pub previous_hash: String,
    pub nonce: u64,
}

impl BlockSkeleton {
    /// Skeleton stamped with the current local time and nonce 0.
    pub fn new(index: u64, previous_hash: impl Into<String>, payload: Payload) -> Self {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::with_timestamp(index, previous_hash, payload, timestamp)
    }

    pub fn with_timestamp(
        index: u64,
        previous_hash: impl Into<String>,
        payload: Payload,
        timestamp: impl Into<String>,
    ) -> Self {
        BlockSkeleton {
            index,
            timestamp: timestamp.into(),
            incident_id: index.to_string(),
            data: Value::Object(payload),
            previous_hash: previous_hash.into(),
            nonce: 0,
        }
    }

    pub fn signable(&self) -> SignableFields<'_> {
        SignableFields {
            index: self.index,
            timestamp: &self.timestamp,
            incident_id: &self.incident_id,
            data: &self.data,
            previous_hash: &self.previous_hash,
        }
    }

    pub fn template(&self) -> CanonicalTemplate {
        CanonicalTemplate::new(&self.signable())
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        codec::canonical_bytes(&self.signable(), self.nonce)
    }

    pub fn hash(&self) -> String {
        codec::hash_hex(&self.signable(), self.nonce)
    }

    /// Attaches the mined nonce, its hash and the signature over that hash.
    pub fn seal(self, nonce: u64, hash: String, signature: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            incident_id: self.incident_id,
            data: self.data,
            previous_hash: self.previous_hash,
            nonce,
            hash,
            signature,
        }
    }
}

/// One immutable ledger entry. Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub incident_id: String,
    pub data: Value,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
    pub signature: String,
}

impl Block {
    pub fn signable(&self) -> SignableFields<'_> {
        SignableFields {
            index: self.index,
            timestamp: &self.timestamp,
            incident_id: &self.incident_id,
            data: &self.data,
            previous_hash: &self.previous_hash,
        }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        codec::canonical_bytes(&self.signable(), self.nonce)
    }

    /// Recomputes the hash from content; compare with `self.hash` to detect tampering.
    pub fn compute_hash(&self) -> String {
        codec::hash_hex(&self.signable(), self.nonce)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn skeleton(&self) -> BlockSkeleton {
        BlockSkeleton {
            index: self.index,
            timestamp: self.timestamp.clone(),
            incident_id: self.incident_id.clone(),
            data: self.data.clone(),
            previous_hash: self.previous_hash.clone(),
            nonce: self.nonce,
        }
    }
}
