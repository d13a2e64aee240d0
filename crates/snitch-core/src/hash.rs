use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, returning lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint a repo-relative path (not its contents).
/// fingerprint = blake3(path) → first 32 hex chars.
pub fn file_fingerprint(file_path: &str) -> String {
    let hash = blake3::hash(file_path.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Opaque project key shared by everyone who knows the origin URL and the secret.
pub fn project_key(origin_url: &str, secret: &str) -> String {
    sha256_hex(format!("{origin_url}{secret}").as_bytes())
}
