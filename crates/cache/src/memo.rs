//! In-process lookup memoisation.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An explicitly owned, shareable memo table for repeated lookups within one
/// run, such as resolving a commit author's e-mail to a user.
///
/// Negative results are remembered too: once a lookup has returned `None`
/// the remote service is not asked again for that key until the entry is
/// [invalidated](Self::invalidate) or the memo is [cleared](Self::clear).
///
/// Cloning is cheap and clones share the same table. Two tasks racing on
/// the same missing key may both run the lookup; the last result wins.
///
/// # Examples
///
/// ```
/// use harvest_cache::Memo;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let users: Memo<String, u64> = Memo::new();
/// let id = users.get_or_insert_with("dev@example.com".to_string(), |_| async { Some(42) }).await;
/// assert_eq!(id, Some(42));
/// // Memoised; the second lookup isn't run.
/// let id = users.get_or_insert_with("dev@example.com".to_string(), |_| async { None }).await;
/// assert_eq!(id, Some(42));
/// # }
/// ```
pub struct Memo<K, V> {
    entries: Arc<RwLock<HashMap<K, Option<V>>>>,
}
impl<K, V> Clone for Memo<K, V> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries) }
    }
}
impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoised result for `key`: `None` if never looked up,
    /// `Some(None)` if looked up and not found.
    pub async fn get(&self, key: &K) -> Option<Option<V>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Return the memoised result for `key`, running `lookup` and remembering
    /// its result (found or not) on first use.
    ///
    /// The lock is not held while `lookup` runs.
    pub async fn get_or_insert_with<F, Fut>(&self, key: K, lookup: F) -> Option<V>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Option<V>>,
    {
        if let Some(found) = self.entries.read().await.get(&key) {
            return found.clone();
        }
        let value = lookup(&key).await;
        self.entries.write().await.insert(key, value.clone());
        value
    }

    /// Forget one key. Returns `true` if it was memoised.
    pub async fn invalidate(&self, key: &K) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of memoised keys, including negative results.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_memoises_hits() {
        let memo: Memo<&str, u64> = Memo::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = memo
                .get_or_insert_with("a@example.com", |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(1)
                })
                .await;
            assert_eq!(value, Some(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memoises_misses() {
        let memo: Memo<&str, u64> = Memo::new();
        assert_eq!(memo.get_or_insert_with("ghost@example.com", |_| async { None }).await, None);
        assert_eq!(memo.get(&"ghost@example.com").await, Some(None));
        assert_eq!(memo.get_or_insert_with("ghost@example.com", |_| async { Some(9) }).await, None);
        assert_eq!(memo.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_receives_key() {
        let memo: Memo<String, usize> = Memo::new();
        let value = memo.get_or_insert_with("abcd".to_string(), |key| std::future::ready(Some(key.len()))).await;
        assert_eq!(value, Some(4));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let memo: Memo<u32, u32> = Memo::new();
        memo.get_or_insert_with(1, |_| async { Some(10) }).await;
        memo.get_or_insert_with(2, |_| async { None }).await;
        assert!(memo.invalidate(&1).await);
        assert!(!memo.invalidate(&1).await);
        assert_eq!(memo.get_or_insert_with(1, |_| async { Some(11) }).await, Some(11));
        memo.clear().await;
        assert!(memo.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let memo: Memo<u32, u32> = Memo::new();
        let other = memo.clone();
        memo.get_or_insert_with(1, |_| async { Some(10) }).await;
        assert_eq!(other.get(&1).await, Some(Some(10)));
    }
}
