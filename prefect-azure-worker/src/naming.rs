// Container group naming

use uuid::Uuid;

/// Maximum container group name length.
pub const MAX_GROUP_NAME_LEN: usize = 63;

const SUFFIX_LEN: usize = 8;
const FALLBACK_BASE: &str = "flow-run";

/// Derive a container group name from a flow run name.
///
/// Lowercase `[a-z0-9-]`, no leading, trailing or repeated hyphens, and a
/// unique suffix, within [`MAX_GROUP_NAME_LEN`] characters.
pub fn container_group_name(flow_run_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    group_name_with_suffix(flow_run_name, &suffix[..SUFFIX_LEN])
}

pub(crate) fn group_name_with_suffix(flow_run_name: &str, suffix: &str) -> String {
    let mut base = String::with_capacity(flow_run_name.len());
    for c in flow_run_name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (base.is_empty() || base.ends_with('-')) {
            continue;
        }
        base.push(c);
    }

    base.truncate(MAX_GROUP_NAME_LEN - suffix.len() - 1);
    let base = base.trim_end_matches('-');
    let base = if base.is_empty() { FALLBACK_BASE } else { base };

    format!("{}-{}", base, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_GROUP_NAME_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !name.starts_with('-')
            && !name.ends_with('-')
            && !name.contains("--")
    }

    #[test]
    fn test_sanitizes_flow_run_name() {
        assert_eq!(
            group_name_with_suffix("Crimson_Otter  (retry #2)", "abcd1234"),
            "crimson-otter-retry-2-abcd1234"
        );
        assert_eq!(group_name_with_suffix("!!!", "abcd1234"), "flow-run-abcd1234");
        assert_eq!(group_name_with_suffix("", "abcd1234"), "flow-run-abcd1234");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let name = group_name_with_suffix(&"a-".repeat(100), "abcd1234");
        assert!(is_valid(&name), "{name}");
        assert!(name.ends_with("-abcd1234"));
    }

    #[test]
    fn test_generated_names_are_unique_and_valid() {
        let a = container_group_name("Über Flow");
        let b = container_group_name("Über Flow");
        assert_ne!(a, b);
        assert!(is_valid(&a), "{a}");
        assert!(a.starts_with("ber-flow-"));
    }
}
