use crate::config::CommandSpec;

/// Whether `caller` may run `command`. Names compare case-insensitively.
pub fn authorized(command: &CommandSpec, caller: &str) -> bool {
    if command.permissions.is_empty() {
        return true;
    }

    let caller = caller.to_lowercase();
    command
        .permissions
        .iter()
        .any(|allowed| allowed.to_lowercase() == caller)
}
