use crate::config::CommandSpec;

/// A message matched against the command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub command: &'a CommandSpec,
    /// Every token after the trigger, in order.
    pub args: Vec<&'a str>,
}

/// Find the first command whose trigger matches the first word of `text`.
///
/// Tokens are split on single spaces, so repeated spaces produce empty
/// tokens that are kept in `args`. Configuration order decides ties.
pub fn resolve<'a>(commands: &'a [CommandSpec], text: &'a str) -> Option<Resolved<'a>> {
    if text.is_empty() {
        return None;
    }

    let mut tokens = text.split(' ');
    let first = tokens.next()?;
    let command = commands.iter().find(|c| c.matches(first))?;

    Some(Resolved {
        command,
        args: tokens.collect(),
    })
}
