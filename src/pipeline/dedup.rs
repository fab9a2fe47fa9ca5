use std::collections::HashSet;
use std::hash::Hash;

/// Keep the first item seen for each key, preserving input order.
///
/// Output is fully determined by input order, so identical input always
/// yields identical output.
pub fn dedup_by_key<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen: HashSet<K> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}
