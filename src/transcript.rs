//! Markdown transcripts of roleplay message logs.

use crate::{
    model::{Participant, Roleplay, RoleplayMessage},
    platform::Attachment,
};

/// Render a roleplay's log as Markdown.
///
/// Participants are listed as mentions since their display names are not stored.
pub fn render(
    roleplay: &Roleplay,
    participants: &[Participant],
    messages: &[RoleplayMessage],
) -> String {
    let mut out = format!("# {}\n\n", roleplay.name);
    if !roleplay.summary.is_empty() {
        out.push_str(&format!("{}\n\n", roleplay.summary));
    }

    out.push_str("## Participants\n\n");
    for participant in participants
        .iter()
        .filter(|p| p.is_joined() || p.user_id == roleplay.owner_id)
    {
        out.push_str(&format!("- <@{}>\n", participant.user_id));
    }
    out.push('\n');

    out.push_str("## Log\n\n");
    for message in messages {
        out.push_str(&format!(
            "**{}**: {}\n\n",
            message.author_nickname, message.contents
        ));
    }
    out
}

/// The transcript as an uploadable Markdown file.
pub fn attachment(
    roleplay: &Roleplay,
    participants: &[Participant],
    messages: &[RoleplayMessage],
) -> Attachment {
    Attachment {
        filename: format!("{}.md", crate::channels::channel_name(&roleplay.name)),
        data: render(roleplay, participants, messages).into_bytes(),
    }
}
