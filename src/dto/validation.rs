//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::bracket::PhaseKey;

/// Validates that a phase key is `"{base}|{slot}"` with a second-precision UTC base.
///
/// # Examples
///
/// ```ignore
/// validate_phase_key("2024-05-01T12:00:00Z|r32_7") // Ok
/// validate_phase_key("2024-05-01T12:00:00Z")       // Err - no slot
/// validate_phase_key("2024-05-01T12:00:00Z|qf9")   // Err - unknown slot
/// ```
pub fn validate_phase_key(key: &str) -> Result<(), ValidationError> {
    key.parse::<PhaseKey>().map(|_| ()).map_err(|err| {
        let mut validation = ValidationError::new("phase_key_format");
        validation.message = Some(err.to_string().into());
        validation
    })
}
