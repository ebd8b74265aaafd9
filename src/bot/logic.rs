use crate::meetup::Event;

const MAX_PREVIEW_CHARS: usize = 120;

/// Settings are partitioned per guild. Direct messages have no guild, so the
/// channel stands in for it.
pub(crate) fn room_key<'a>(guild_id: Option<&'a str>, channel_id: &'a str) -> &'a str {
    match guild_id {
        Some(guild_id) if !guild_id.is_empty() => guild_id,
        _ => channel_id,
    }
}

pub(crate) fn is_own_message(bot_user_id: Option<&str>, author_id: &str) -> bool {
    bot_user_id.is_some_and(|id| id == author_id)
}

/// A cached snapshot may stand in for a failed live lookup only while the
/// event is still ahead of us and still eligible for announcement.
pub(crate) fn snapshot_is_usable(event: &Event, now_ms: i64) -> bool {
    event.is_announceable() && event.time > now_ms
}

pub(crate) fn preview_text(value: &str) -> String {
    let mut chars = value.chars();
    let preview: String = chars.by_ref().take(MAX_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}…")
    } else {
        preview
    }
}
