//! Header → destination column resolution.
//!
//! A [`Mapping`] is keyed either by the raw header text or by its canonical
//! key. Headers with no entry fall back to their canonical key.

use crate::canonical::canonicalize;
use std::collections::BTreeMap;

/// Raw-or-canonical header → destination column name.
pub type Mapping = BTreeMap<String, String>;

/// Slugs that always exist and cannot be deleted.
pub const PROTECTED_SLUGS: [&str; 2] = ["lp", "simbiu"];

pub fn is_protected(slug: &str) -> bool {
    PROTECTED_SLUGS.contains(&slug)
}

/// Resolve a raw header to its destination column.
///
/// Lookup order: exact raw header, then canonical key, then the canonical key
/// itself. An empty result means the column has no destination.
pub fn resolve_destination(raw_header: &str, mapping: &Mapping) -> String {
    if let Some(dest) = mapping.get(raw_header) {
        return dest.clone();
    }
    let key = canonicalize(raw_header);
    match mapping.get(&key) {
        Some(dest) => dest.clone(),
        None => key,
    }
}

/// Destination index for each header position; `None` for unmapped headers.
pub fn resolve_headers(headers: &[String], mapping: &Mapping) -> Vec<Option<String>> {
    headers
        .iter()
        .map(|h| {
            let dest = resolve_destination(h, mapping);
            (!dest.is_empty()).then_some(dest)
        })
        .collect()
}

/// Build a mapping from submitted (header, destination) pairs.
///
/// Values are trimmed and blank values dropped, so an unedited field keeps
/// the default resolution.
pub fn from_form<I, K, V>(entries: I) -> Mapping
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|(k, v)| {
            let v = v.as_ref().trim();
            (!v.is_empty()).then(|| (k.into(), v.to_string()))
        })
        .collect()
}

/// Parse `RAW=DEST` pairs as given on the command line.
pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Mapping, String> {
    let mut entries = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let pair = pair.as_ref();
        let (raw, dest) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected RAW=DEST, got '{pair}'"))?;
        entries.push((raw.trim().to_string(), dest.to_string()));
    }
    Ok(from_form(entries))
}

/// Pre-filled value for a header in the configuration form.
pub fn prefill(raw_header: &str, mapping: &Mapping) -> String {
    resolve_destination(raw_header, mapping)
}
