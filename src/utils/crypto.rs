use crate::error::{ChainError, Result};
use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch with sub-second precision.
pub fn current_timestamp() -> Result<f64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ChainError::Io(format!("System time error: {e}")))?;
    Ok(duration.as_secs_f64())
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// Lowercase hex SHA-256, the form every hash in the ledger is stored in.
pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(data))
}
