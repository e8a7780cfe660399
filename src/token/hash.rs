use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};

/// Bytes of the digest kept in a delivery credential body (32 base64 chars)
const DELIVERY_BODY_BYTES: usize = 24;

const PREFIX_TAGS: [&str; 4] = ["edge", "cdn", "pop", "hls"];

/// Process secret used only as a hash salt
#[derive(Clone)]
pub struct Salt(Vec<u8>);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_secret(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Salt(..)")
    }
}

fn digest(parts: &[&[u8]], at: DateTime<Utc>, salt: &Salt) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        // separator so ("ab", "c") and ("a", "bc") hash differently
        hasher.update([0u8]);
    }
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1000));
    hasher.update(nanos.to_be_bytes());
    hasher.update(&salt.0);
    hasher.finalize().into()
}

/// Session credential: lower-hex SHA-256 over identity, origin, time and salt
pub fn session_credential(identity: &str, origin: &str, at: DateTime<Utc>, salt: &Salt) -> String {
    hex::encode(digest(&[identity.as_bytes(), origin.as_bytes()], at, salt))
}

/// Delivery credential: `<tag>:<body>`, the tag is cosmetic
pub fn delivery_credential(
    session_credential: &str,
    node_id: &str,
    content_id: &str,
    at: DateTime<Utc>,
    salt: &Salt,
) -> String {
    let digest = digest(
        &[
            session_credential.as_bytes(),
            node_id.as_bytes(),
            content_id.as_bytes(),
        ],
        at,
        salt,
    );
    let body = URL_SAFE_NO_PAD.encode(&digest[..DELIVERY_BODY_BYTES]);
    format!("{}:{body}", prefix_tag())
}

fn prefix_tag() -> String {
    let mut rng = rand::thread_rng();
    let tag = PREFIX_TAGS.choose(&mut rng).copied().unwrap_or("edge");
    format!("{tag}{:04x}", rng.next_u32() as u16)
}
