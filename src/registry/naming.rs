//! Shortest pairwise-unique display aliases for preview keys.
//!
//! `package.module.function:variant -> variant`
//! `package.module.function -> function`
//!
//! A collision falls back to the next-longer candidate:
//! `package.module.function -> module.function`
//! `package.other.function  -> other.function`

use std::collections::BTreeSet;
use std::collections::HashMap;

use super::manager::PreviewRegistry;

/// Map keys to their shortest pairwise-unique aliases.
///
/// Deterministic for a fixed input order; recompute on every query, the
/// result is only valid for the exact key set it was derived from.
/// Termination is guaranteed because the longest candidate is the full
/// key, which is unique among registered previews.
pub fn shorten_preview_names<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let candidates: Vec<Vec<String>> = keys
        .iter()
        .map(|key| alias_candidates(key.as_ref()))
        .collect();
    let mut cursor = vec![0usize; candidates.len()];
    let mut aliases: Vec<String> = candidates.iter().map(|c| c[0].clone()).collect();

    loop {
        let colliding = colliding_indices(&aliases);
        if colliding.is_empty() {
            break;
        }
        let mut advanced = false;
        for i in colliding {
            if cursor[i] + 1 < candidates[i].len() {
                cursor[i] += 1;
                aliases[i] = candidates[i][cursor[i]].clone();
                advanced = true;
            }
        }
        // Identical full keys cannot be split apart any further
        if !advanced {
            break;
        }
    }

    aliases
}

/// Candidate aliases from shortest to the full key: the suffix alone (if
/// present), then progressively longer dot-separated tails.
fn alias_candidates(key: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    if let (_, Some(suffix)) = PreviewRegistry::split_name(key) {
        candidates.push(suffix.to_string());
    }

    let mut tail = String::new();
    for token in key.split('.').rev() {
        if tail.is_empty() {
            tail = token.to_string();
        } else {
            tail = format!("{token}.{tail}");
        }
        candidates.push(tail.clone());
    }

    candidates
}

/// Indices of every element that shares its value with another.
fn colliding_indices(aliases: &[String]) -> BTreeSet<usize> {
    let mut first_entries: HashMap<&str, usize> = HashMap::new();
    let mut colliding = BTreeSet::new();
    for (i, alias) in aliases.iter().enumerate() {
        match first_entries.get(alias.as_str()) {
            Some(&first) => {
                colliding.insert(first);
                colliding.insert(i);
            }
            None => {
                first_entries.insert(alias, i);
            }
        }
    }
    colliding
}
