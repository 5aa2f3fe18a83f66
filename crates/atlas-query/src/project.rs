use atlas_types::Document;
use tracing::trace;

use crate::predicate::Predicate;

/// Project the top-level equalities of a predicate onto a blank document.
///
/// Starts from `D::default()` and assigns every `field == constant` conjunct.
/// Terms nested under `Or`/`Not` and comparisons other than equality are
/// ignored, so the result is only a partial document: callers use it to read
/// key fields the predicate pins.
pub fn project<D: Document>(predicate: &Predicate) -> D {
    let mut document = D::default();
    for (field, value) in predicate.equalities() {
        if let Err(e) = document.set(field, value.clone()) {
            trace!(field, error = %e, "skipping unassignable equality during projection");
        }
    }
    document
}
