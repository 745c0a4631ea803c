//! Bot-ownership marker block around canonical workflow content.
//!
//! The wrapped form is the only form ever compared against or written to a
//! repository, so wrapping must be a pure function of its inputs.

/// First line of every managed workflow file.
pub const BEGIN_MARKER: &str = "# DO NOT EDIT: BEGIN";

/// Last line of every managed workflow file.
pub const END_MARKER: &str = "# DO NOT EDIT: END";

/// Wrap canonical `content` for `policy_name` in the marker block.
///
/// Content that does not end with a newline gets one, so the end marker
/// always sits on its own line.
pub fn wrap_content(content: &str, policy_name: &str) -> String {
    let mut out = String::with_capacity(content.len() + 256);
    out.push_str(BEGIN_MARKER);
    out.push('\n');
    out.push_str("# This snippet has been inserted automatically by policy-bot, do not edit!\n");
    out.push_str(&format!(
        "# If changes are needed, update the policy {policy_name} in the policy catalog.\n"
    ));
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(END_MARKER);
    out.push('\n');
    out
}

/// Whether `content` carries the marker block.
pub fn is_managed(content: &str) -> bool {
    content.starts_with(BEGIN_MARKER) && content.trim_end().ends_with(END_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW: &str = "name: build\non: push\n";

    #[test]
    fn test_wrap_is_deterministic() {
        assert_eq!(
            wrap_content(WORKFLOW, "dockerfile"),
            wrap_content(WORKFLOW, "dockerfile")
        );
    }

    #[test]
    fn test_wrap_orders_markers_name_and_content() {
        let wrapped = wrap_content(WORKFLOW, "dockerfile");
        let begin = wrapped.find(BEGIN_MARKER).expect("begin marker");
        let name = wrapped.find("dockerfile").expect("policy name");
        let body = wrapped.find(WORKFLOW).expect("content");
        let end = wrapped.rfind(END_MARKER).expect("end marker");
        assert!(begin < name && name < body && body < end);
    }

    #[test]
    fn test_wrap_differs_by_policy_name() {
        assert_ne!(wrap_content(WORKFLOW, "a"), wrap_content(WORKFLOW, "b"));
    }

    #[test]
    fn test_missing_trailing_newline_is_added() {
        let wrapped = wrap_content("name: build", "go");
        assert!(wrapped.ends_with("name: build\n# DO NOT EDIT: END\n"));
    }

    #[test]
    fn test_is_managed() {
        assert!(is_managed(&wrap_content(WORKFLOW, "go")));
        assert!(!is_managed(WORKFLOW));
    }
}
