//! Console output icons.

use console::{style, StyledObject};

/// Green checkmark.
pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

/// Yellow warning mark.
pub fn warn() -> StyledObject<&'static str> {
    style("!").yellow()
}

/// Dim arrow for secondary info.
pub fn dim_arrow() -> StyledObject<&'static str> {
    style("→").dim()
}
