/// Placeholder replaced by the caller's name.
pub const NAME_PLACEHOLDER: &str = "$name";
/// Placeholder replaced by everything after the trigger.
pub const MESSAGE_PLACEHOLDER: &str = "$message";

/// Expand an argument template for one invocation.
///
/// Only whole tokens are substituted; `x$name` stays as written. The result
/// always has one entry per template entry.
pub fn build_args(template: &[String], caller: &str, rest: &[&str]) -> Vec<String> {
    template
        .iter()
        .map(|token| match token.as_str() {
            NAME_PLACEHOLDER => caller.to_string(),
            MESSAGE_PLACEHOLDER => rest.join(" "),
            other => other.to_string(),
        })
        .collect()
}
