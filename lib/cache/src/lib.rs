use std::{collections::HashMap, hash::Hash};

use tokio::sync::RwLock;

/// Async keyed cache over cheap-to-clone values. Reads take the
/// shared lock, writes the exclusive one.
#[derive(Debug)]
pub struct CloneCache<K: Eq + Hash, T: Clone>(
  RwLock<HashMap<K, T>>,
);

impl<K: Eq + Hash, T: Clone> Default for CloneCache<K, T> {
  fn default() -> Self {
    Self(RwLock::new(HashMap::new()))
  }
}

impl<K: Eq + Hash + Clone, T: Clone> CloneCache<K, T> {
  pub async fn get(&self, key: &K) -> Option<T> {
    self.0.read().await.get(key).cloned()
  }

  pub async fn insert(
    &self,
    key: impl Into<K>,
    val: T,
  ) -> Option<T> {
    self.0.write().await.insert(key.into(), val)
  }

  pub async fn remove(&self, key: &K) -> Option<T> {
    self.0.write().await.remove(key)
  }

  pub async fn entries(&self) -> Vec<(K, T)> {
    let cache = self.0.read().await;
    cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }

  pub async fn retain(
    &self,
    keep: impl FnMut(&K, &mut T) -> bool,
  ) {
    self.0.write().await.retain(keep);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn insert_get_remove() {
    let cache = CloneCache::<String, u32>::default();
    assert_eq!(cache.get(&"a".to_string()).await, None);
    cache.insert("a".to_string(), 1).await;
    assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    assert_eq!(cache.remove(&"a".to_string()).await, Some(1));
    assert_eq!(cache.get(&"a".to_string()).await, None);
  }

  #[tokio::test]
  async fn retain_prunes() {
    let cache = CloneCache::<u8, u8>::default();
    cache.insert(1u8, 1).await;
    cache.insert(2u8, 2).await;
    cache.retain(|_, v| *v > 1).await;
    assert_eq!(cache.get(&1).await, None);
    assert_eq!(cache.get(&2).await, Some(2));
  }
}
