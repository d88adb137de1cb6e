//! Helpers for handling secrets: log-safe rendering and constant-time comparison.

use subtle::ConstantTimeEq;

/// Characters of a token left visible at each end when it is logged
const VISIBLE_EDGE: usize = 4;

/// Render a token for logs.
///
/// Long tokens keep a few characters at each end (`abcd...7890`); short ones are fully
/// starred so nothing useful leaks.
pub fn mask_token(token: &str) -> String {
    let token = token.trim();
    let count = token.chars().count();

    if count <= VISIBLE_EDGE * 2 {
        return "*".repeat(count);
    }

    let head: String = token.chars().take(VISIBLE_EDGE).collect();
    let tail: String = token.chars().skip(count - VISIBLE_EDGE).collect();
    format!("{head}...{tail}")
}

/// Byte-string equality whose running time does not depend on where the inputs differ
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}
