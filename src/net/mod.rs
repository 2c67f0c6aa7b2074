//! Hooks applied by an archive-search layer to result records before they
//! reach the caller.
//!
//! The search client itself lives outside this crate; it looks up the hook for
//! the instrument it queried with [`post_search_hook`] and runs every batch of
//! records through it.

use std::collections::BTreeMap;

use crate::data::model::HeaderValue;
use crate::sources::callisto::CALLISTO;

/// One search result: field name to value, e.g. `Start Time`, `Observatory`.
pub type SearchRecord = BTreeMap<String, HeaderValue>;

/// Pure transformation of a batch of search results.
pub type PostSearchHook = fn(Vec<SearchRecord>) -> Vec<SearchRecord>;

pub const OBSERVATORY_FIELD: &str = "Observatory";

/// Instrument names the e-CALLISTO archive answers to.
const CALLISTO_ALIASES: [&str; 3] = ["eCALLISTO", "e-CALLISTO", "CALLISTO"];

/// Hook registered for an instrument, if any.
pub fn post_search_hook(instrument: &str) -> Option<PostSearchHook> {
    let instrument = instrument.trim();
    CALLISTO_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(instrument))
        .then_some(enrich_callisto_records as PostSearchHook)
}

/// Set a missing or blank `Observatory` to `e-CALLISTO`. Every other field,
/// and every non-blank observatory, passes through untouched.
pub fn enrich_callisto_records(records: Vec<SearchRecord>) -> Vec<SearchRecord> {
    records
        .into_iter()
        .map(|mut record| {
            let missing = record
                .get(OBSERVATORY_FIELD)
                .map_or(true, HeaderValue::is_blank);
            if missing {
                record.insert(OBSERVATORY_FIELD.to_string(), HeaderValue::from(CALLISTO));
            }
            record
        })
        .collect()
}
