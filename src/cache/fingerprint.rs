use crate::errors::Error;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Stable fingerprint of call arguments
///
/// Arguments are rendered through `serde_json::Value`, whose maps are
/// key-sorted, so the fingerprint depends only on argument values and never
/// on field insertion order or anything process-specific.
pub fn fingerprint<A: Serialize + ?Sized>(args: &A) -> Result<String, Error> {
    let canonical = serde_json::to_string(&serde_json::to_value(args)?)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
