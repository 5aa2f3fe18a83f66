use atlas_types::KeyHash;
use parking_lot::{Mutex, MutexGuard};

/// A fixed set of mutexes selected by key hash.
///
/// Holding the stripe for a key serializes every mutation of that key (map
/// replace plus index maintenance). Unrelated keys contend only when they
/// share a stripe.
pub struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    /// Create `stripes` locks. Zero is treated as one.
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the stripe guarding `key`.
    pub fn lock(&self, key: &KeyHash) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)].lock()
    }

    /// Stripe index for `key`.
    pub fn stripe_of(&self, key: &KeyHash) -> usize {
        (key.prefix_u64() % self.stripes.len() as u64) as usize
    }

    /// Number of stripes.
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::Value;

    #[test]
    fn same_key_maps_to_same_stripe() {
        let locks = KeyLocks::new(8);
        let key = KeyHash::compute([("id", Value::Int(3))]);
        assert_eq!(locks.stripe_of(&key), locks.stripe_of(&key));
        assert!(locks.stripe_of(&key) < 8);
    }

    #[test]
    fn zero_stripes_still_lock() {
        let locks = KeyLocks::new(0);
        assert_eq!(locks.stripes(), 1);
        let key = KeyHash::compute([("id", Value::Int(1))]);
        let guard = locks.lock(&key);
        assert!(locks.stripes[0].try_lock().is_none());
        drop(guard);
        assert!(locks.stripes[0].try_lock().is_some());
    }
}
