//! Flag rule: every requested capability flag must be whitelisted by the
//! entity's resolved schema.

use crate::validation::error::FlagError;
use crate::value::RawAttrs;
use std::collections::BTreeSet;

/// Returns one `Unrecognized` error per distinct requested flag outside `allowed`.
pub fn validate_flags(allowed: &BTreeSet<String>, requested: &[String]) -> Vec<FlagError> {
    let requested: BTreeSet<&String> = requested.iter().collect();
    requested
        .into_iter()
        .filter(|flag| !allowed.contains(*flag))
        .map(|flag| FlagError::Unrecognized {
            flag: flag.clone(),
            allowed: allowed.iter().cloned().collect(),
        })
        .collect()
}

/// Reads the string entries of the raw `flags` attribute. Non-string entries
/// are skipped here; the field rule reports them as a type mismatch.
pub fn requested_flags(raw: &RawAttrs) -> Vec<String> {
    raw.get("flags")
        .and_then(|v| v.as_list())
        .map(|items| items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{attrs, AttrValue};
    use rstest::rstest;

    fn allowed(names: &[&str]) -> BTreeSet<String> { names.iter().map(|s| s.to_string()).collect() }

    #[rstest]
    #[case(&["freeze", "bias"], &["freeze"], 0)]
    #[case(&["freeze", "bias"], &["affine"], 1)]
    #[case(&["affine"], &["bias", "freeze", "affine"], 2)]
    #[case(&[], &["freeze", "freeze"], 1)]
    #[case(&[], &[], 0)]
    fn test_unlisted_flags_are_rejected(#[case] whitelist: &[&str], #[case] requested: &[&str], #[case] expected: usize) {
        let requested: Vec<String> = requested.iter().map(|s| s.to_string()).collect();
        assert_eq!(validate_flags(&allowed(whitelist), &requested).len(), expected);
    }

    #[test]
    fn test_error_lists_the_whitelist() {
        let errors = validate_flags(&allowed(&["affine"]), &["bias".to_string()]);
        assert_eq!(
            errors,
            vec![FlagError::Unrecognized { flag: "bias".into(), allowed: vec!["affine".into()] }]
        );
    }

    #[test]
    fn test_requested_flags_skips_non_strings() {
        let raw = attrs([("flags", AttrValue::List(vec![AttrValue::from("freeze"), AttrValue::Int(3)]))]);
        assert_eq!(requested_flags(&raw), vec!["freeze".to_string()]);
        assert!(requested_flags(&RawAttrs::new()).is_empty());
    }
}
