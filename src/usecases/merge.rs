use crate::domain::models::{ChargeRecord, GiftRecord};
use std::collections::HashSet;
use std::hash::Hash;

/// Appends the `incoming` records whose key is not yet in `existing`.
/// Existing order is kept and new records go to the end. Returns the number added.
pub fn merge<T, K, F>(existing: &mut Vec<T>, incoming: impl IntoIterator<Item = T>, key_fn: F) -> usize
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = existing.iter().map(&key_fn).collect();
    let before = existing.len();
    for record in incoming {
        if seen.insert(key_fn(&record)) {
            existing.push(record);
        }
    }
    existing.len() - before
}

pub fn merge_charges(existing: &mut Vec<ChargeRecord>, incoming: Vec<ChargeRecord>) -> usize {
    let added = merge(existing, incoming, ChargeRecord::dedup_key);
    sort_newest_first(existing, |r| &r.date);
    added
}

pub fn merge_gifts(existing: &mut Vec<GiftRecord>, incoming: Vec<GiftRecord>) -> usize {
    let added = merge(existing, incoming, GiftRecord::dedup_key);
    sort_newest_first(existing, |r| &r.date);
    added
}

// Dates are zero-padded, so string order is chronological
fn sort_newest_first<T>(records: &mut [T], date: impl Fn(&T) -> &String) {
    records.sort_by(|a, b| date(b).cmp(date(a)));
}
