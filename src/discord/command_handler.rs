#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscordCommand {
    SetGroup { urlname: String },
    GetEvents,
    NextEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    SetGroup,
    GetEvents,
    NextEvent,
}

/// Checked in order, first match wins. Matching is on the raw message
/// prefix, so `!nexteventfoo` is still `!nextevent`.
const COMMAND_PREFIXES: [(&str, CommandKind); 3] = [
    ("!setgroup", CommandKind::SetGroup),
    ("!getevents", CommandKind::GetEvents),
    ("!nextevent", CommandKind::NextEvent),
];

#[derive(Debug, Default, Clone)]
pub struct DiscordCommandHandler;

impl DiscordCommandHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str) -> Option<DiscordCommand> {
        COMMAND_PREFIXES.iter().find_map(|(prefix, kind)| {
            let rest = content.strip_prefix(prefix)?;
            Some(match kind {
                CommandKind::SetGroup => DiscordCommand::SetGroup {
                    urlname: rest.trim().to_string(),
                },
                CommandKind::GetEvents => DiscordCommand::GetEvents,
                CommandKind::NextEvent => DiscordCommand::NextEvent,
            })
        })
    }

    pub fn available_commands(&self) -> Vec<&'static str> {
        COMMAND_PREFIXES.iter().map(|(prefix, _)| *prefix).collect()
    }
}
