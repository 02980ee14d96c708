//! Domain-level constants.
//!
//! These constants define how the backing store encodes values in raw fields.

// =============================================================================
// Field Encoding
// =============================================================================

/// Separator between item ids in a multi-reference field
pub const MULTI_REFERENCE_SEPARATOR: char = '|';

/// Raw value of a checked checkbox field
pub const CHECKBOX_TRUE: &str = "1";

/// Raw value of an unchecked checkbox field
pub const CHECKBOX_FALSE: &str = "";

/// Store-native date/time format (UTC, compact ISO 8601)
pub const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

// =============================================================================
// Paths
// =============================================================================

/// Separator between segments of an item path
pub const PATH_SEPARATOR: char = '/';

/// Check whether a raw value is an absolute item path
pub fn is_item_path(raw: &str) -> bool {
    raw.starts_with(PATH_SEPARATOR)
}
