//! Article identifiers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the random tag, in hex characters.
const TAG_HEX_LEN: usize = 10;

/// Globally-unique identifier assigned to an article at ingestion time.
///
/// Format: `<epochSeconds.tag@instanceName>` where `tag` is 10 hex
/// characters derived from 8 random bytes. Roughly 40 bits of entropy per
/// second bucket, which is collision resistance enough for naming articles,
/// not a cryptographic guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(String);

impl ArticleId {
    /// Generate a fresh identifier under the given instance name.
    pub fn generate(instance_name: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut entropy = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut entropy);
        let digest = Sha256::digest(entropy);
        let tag = hex::encode(&digest[..TAG_HEX_LEN / 2]);

        Self(format!("<{}.{}@{}>", now, tag, instance_name))
    }

    /// Validate an identifier received off the wire.
    ///
    /// Accepts exactly the shape this daemon generates; anything else is
    /// rejected rather than propagated to peers.
    pub fn parse(s: &str) -> Option<Self> {
        let inner = s.strip_prefix('<')?.strip_suffix('>')?;
        let (stamp, instance) = inner.split_once('@')?;
        if instance.is_empty() {
            return None;
        }
        let (secs, tag) = stamp.split_once('.')?;
        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if tag.len() != TAG_HEX_LEN || !tag.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(s.to_string()))
    }

    /// The identifier as a string, including angle brackets.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
