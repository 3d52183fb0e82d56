//! Identifier helpers

use super::error::IdError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, IdError> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Trim an actor id handed over by the session layer, refusing blank ones.
pub fn require_actor(actor: &str) -> Result<&str, super::error::ValidationError> {
    let trimmed = actor.trim();
    if trimmed.is_empty() {
        return Err(super::error::ValidationError::MissingActor);
    }
    Ok(trimmed)
}
