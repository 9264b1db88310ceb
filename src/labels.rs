//! Label-based opt-in flags.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Parses a label value as a boolean flag.
///
/// Only `true` (in any letter case) is truthy; everything else is `false`.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// Returns whether the flag label `key` is enabled on the given metadata.
///
/// A missing label, or metadata without labels, counts as disabled.
#[must_use]
pub fn is_enabled(metadata: &ObjectMeta, key: &str) -> bool {
    metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .is_some_and(|value| parse_flag(value))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn meta(labels: Option<Vec<(&str, &str)>>) -> ObjectMeta {
        ObjectMeta {
            labels: labels.map(|labels| {
                labels
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn parse_flag_is_case_insensitive() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("True"));
    }

    #[test]
    fn parse_flag_rejects_other_truthy_strings() {
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag("on"));
        assert!(!parse_flag(" true"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("false"));
    }

    #[test]
    fn enabled_label() {
        let metadata = meta(Some(vec![("cloud.spring.io/enabled", "TRUE")]));
        assert!(is_enabled(&metadata, "cloud.spring.io/enabled"));
    }

    #[test]
    fn disabled_label() {
        let metadata = meta(Some(vec![("cloud.spring.io/enabled", "false")]));
        assert!(!is_enabled(&metadata, "cloud.spring.io/enabled"));
    }

    #[test]
    fn missing_label_defaults_to_false() {
        let metadata = meta(Some(vec![("app", "orders")]));
        assert!(!is_enabled(&metadata, "cloud.spring.io/enabled"));
    }

    #[test]
    fn missing_labels_default_to_false() {
        assert!(!is_enabled(&meta(None), "cloud.spring.io/enabled"));
    }

    #[test]
    fn flags_are_independent() {
        let metadata = meta(Some(vec![
            ("cloud.spring.io/enabled", "true"),
            ("cloud.spring.io/register", "false"),
        ]));

        assert!(is_enabled(&metadata, "cloud.spring.io/enabled"));
        assert!(!is_enabled(&metadata, "cloud.spring.io/register"));
    }
}
