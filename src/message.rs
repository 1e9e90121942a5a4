/// A chat line addressed to a channel the bot has joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Login name of the sender.
    pub caller: String,
    /// Channel the message arrived in, without the `#` prefix.
    pub channel: String,
    pub text: String,
}
