use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Fixed content key catalog as hex `(key id, key)` pairs. The first entry is
/// the default key advertised in manifests.
pub const KEY_CATALOG: [(&str, &str); 2] = [
    (
        "9eb4050de44b4802932e27d75083e266",
        "166634c675823c235a4a9446fad52e4d",
    ),
    (
        "6f651ae1dbe44434bcb4690d1564c41c",
        "88da852ae4fa2e1e36aeb2d5c94997b1",
    ),
];

const KEY_TYPE: &str = "oct";
const LICENSE_TYPE: &str = "temporary";

/// One JSON Web Key entry of a ClearKey license
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LicenseKey {
    pub kty: String,
    pub kid: String,
    pub k: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LicenseResponse {
    pub keys: Vec<LicenseKey>,
    #[serde(rename = "type")]
    pub license_type: String,
}

/// ClearKey license request as sent by EME
#[derive(Debug, Deserialize)]
struct LicenseRequest {
    kids: Vec<String>,
}

/// Catalog as license entries, ids and keys re-encoded to unpadded base64url
pub fn catalog_keys() -> Vec<LicenseKey> {
    KEY_CATALOG
        .iter()
        .filter_map(|(kid, key)| {
            let kid = hex::decode(kid).ok()?;
            let key = hex::decode(key).ok()?;
            Some(LicenseKey {
                kty: KEY_TYPE.to_string(),
                kid: URL_SAFE_NO_PAD.encode(kid),
                k: URL_SAFE_NO_PAD.encode(key),
            })
        })
        .collect()
}

/// Build the license for a request body.
///
/// A body listing `kids` gets only the matching catalog entries. Any other body,
/// including an empty one, gets the whole catalog.
pub fn respond(body: &[u8]) -> LicenseResponse {
    let keys = catalog_keys();
    let keys = match serde_json::from_slice::<LicenseRequest>(body) {
        Ok(request) => keys
            .into_iter()
            .filter(|key| {
                request
                    .kids
                    .iter()
                    .any(|kid| kid.trim_end_matches('=') == key.kid)
            })
            .collect(),
        Err(_) => keys,
    };

    LicenseResponse {
        keys,
        license_type: LICENSE_TYPE.to_string(),
    }
}

/// Default key id formatted as a UUID for `cenc:default_KID`
pub fn default_key_id_uuid() -> String {
    let hex = KEY_CATALOG[0].0;
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
