/*!
 * Serde Helpers
 * Skip-serializing predicates for compact JSON representations
 */

/// Skip serializing false booleans
#[inline]
pub fn is_false(value: &bool) -> bool {
    !*value
}

/// Skip serializing zero counts
#[inline]
pub fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}
