//! Conversions from store rows to API views. All functions here run inside
//! `spawn_blocking` closures and may issue further store reads.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hearth_db::Database;
use hearth_db::models::{AlertRow, ChatRow, MemberRow, MessageRow, PollRow, UserRow};
use hearth_types::api::{
    AlertView, ConversationView, MessagePreview, MessageView, PinnedNoteView, PollOptionView,
    PollView, UserSummary,
};
use hearth_types::ids::{ChatRef, FamilyId};
use hearth_types::models::{GeoPoint, SessionUser, vote_percentage};

/// Display name of every family's shared chat.
pub const GROUP_CHAT_NAME: &str = "Family Group";

pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id in store: {}", raw))
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    hearth_db::parse_timestamp(raw).with_context(|| format!("corrupt timestamp in store: {}", raw))
}

pub fn member_summary(row: &MemberRow) -> Result<UserSummary> {
    Ok(UserSummary {
        id: parse_uuid(&row.id)?,
        name: row.name.clone(),
        avatar: row.avatar_url.clone(),
    })
}

pub fn user_summary(row: &UserRow) -> Result<UserSummary> {
    Ok(UserSummary {
        id: parse_uuid(&row.id)?,
        name: row.name.clone(),
        avatar: row.avatar_url.clone(),
    })
}

pub fn session_user(row: UserRow) -> Result<SessionUser> {
    Ok(SessionUser {
        id: parse_uuid(&row.id)?,
        role: row.role.parse().map_err(anyhow::Error::msg)?,
        parent_id: row.parent_id.as_deref().map(parse_uuid).transpose()?,
        family_id: row.family_id.map(FamilyId::new),
        name: row.name,
    })
}

/// Whether `user` may read or write the chat: they are a member, or it is
/// their family's group chat.
pub fn chat_visible(db: &Database, chat: &ChatRow, user: &SessionUser) -> Result<bool> {
    if chat.is_group {
        if let (Some(chat_family), Some(user_family)) = (&chat.family_id, &user.family_id) {
            if chat_family == user_family.as_str() {
                return Ok(true);
            }
        }
    }
    db.is_chat_member(&chat.id, &user.id.to_string())
}

/// Build the view of a persisted chat as seen by `viewer`.
pub fn conversation_view(db: &Database, chat: ChatRow, viewer: Uuid) -> Result<ConversationView> {
    let members = db.get_chat_members(&chat.id)?;
    let users = members.iter().map(member_summary).collect::<Result<Vec<_>>>()?;

    let chat_name = if chat.is_group {
        chat.chat_name.clone().unwrap_or_else(|| GROUP_CHAT_NAME.to_string())
    } else {
        users
            .iter()
            .find(|u| u.id != viewer)
            .map(|u| u.name.clone())
            .or_else(|| chat.chat_name.clone())
            .unwrap_or_default()
    };

    let latest_message = match &chat.latest_message_id {
        Some(message_id) => match db.get_message(message_id)? {
            Some(row) => Some(MessagePreview {
                id: parse_uuid(&row.id)?,
                content: row.content.clone(),
                sender: member_summary(&row.sender)?,
                created_at: parse_ts(&row.created_at)?,
            }),
            None => None,
        },
        None => None,
    };

    let pinned_notes = pinned_notes(db, &chat.id)?;

    Ok(ConversationView {
        id: ChatRef::Persisted(parse_uuid(&chat.id)?),
        chat_name,
        is_group_chat: chat.is_group,
        is_virtual: false,
        users,
        latest_message,
        pinned_notes,
        created_at: parse_ts(&chat.created_at)?,
        updated_at: parse_ts(&chat.updated_at)?,
    })
}

/// Pinned notes of a chat, oldest first.
pub fn pinned_notes(db: &Database, chat_id: &str) -> Result<Vec<PinnedNoteView>> {
    db.get_pinned_notes(chat_id)?
        .iter()
        .map(|note| {
            Ok(PinnedNoteView {
                text: note.text.clone(),
                pinned_by: member_summary(&note.pinned_by)?,
                pinned_at: parse_ts(&note.pinned_at)?,
            })
        })
        .collect()
}

/// Read-time stand-in for a one-on-one chat that does not exist yet. Sorts
/// by the counterpart's account creation time.
pub fn virtual_conversation(viewer: UserSummary, counterpart: &UserRow) -> Result<ConversationView> {
    let counterpart_summary = user_summary(counterpart)?;
    let joined = parse_ts(&counterpart.created_at)?;

    Ok(ConversationView {
        id: ChatRef::Virtual(counterpart_summary.id),
        chat_name: counterpart.name.clone(),
        is_group_chat: false,
        is_virtual: true,
        users: vec![viewer, counterpart_summary],
        latest_message: None,
        pinned_notes: vec![],
        created_at: joined,
        updated_at: joined,
    })
}

/// Attach reaction counters and read receipts to message rows.
pub fn message_views(db: &Database, rows: Vec<MessageRow>) -> Result<Vec<MessageView>> {
    let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let mut reactions: HashMap<String, BTreeMap<String, i64>> = HashMap::new();
    for r in db.get_reactions_for_messages(&message_ids)? {
        reactions.entry(r.message_id).or_default().insert(r.symbol, r.count);
    }

    let mut readers: HashMap<String, Vec<Uuid>> = HashMap::new();
    for r in db.get_reads_for_messages(&message_ids)? {
        readers.entry(r.message_id).or_default().push(parse_uuid(&r.user_id)?);
    }

    rows.into_iter()
        .map(|row| {
            Ok(MessageView {
                id: parse_uuid(&row.id)?,
                chat_id: parse_uuid(&row.chat_id)?,
                sender: member_summary(&row.sender)?,
                content: row.content,
                reply_to: row.reply_to.as_deref().map(parse_uuid).transpose()?,
                reactions: reactions.remove(&row.id).unwrap_or_default(),
                read_by: readers.remove(&row.id).unwrap_or_default(),
                created_at: parse_ts(&row.created_at)?,
                chat: None,
            })
        })
        .collect()
}

/// Build full poll views (options, voters, derived percentages).
pub fn poll_views(db: &Database, rows: Vec<PollRow>) -> Result<Vec<PollView>> {
    let poll_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let mut voters: HashMap<String, Vec<UserSummary>> = HashMap::new();
    for vote in db.get_poll_votes(&poll_ids)? {
        voters
            .entry(vote.option_id)
            .or_default()
            .push(member_summary(&vote.voter)?);
    }

    let mut options: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for option in db.get_poll_options(&poll_ids)? {
        options.entry(option.poll_id).or_default().push((option.id, option.text));
    }

    rows.into_iter()
        .map(|row| {
            let raw_options = options.remove(&row.id).unwrap_or_default();
            let with_votes: Vec<(String, String, Vec<UserSummary>)> = raw_options
                .into_iter()
                .map(|(id, text)| {
                    let votes = voters.remove(&id).unwrap_or_default();
                    (id, text, votes)
                })
                .collect();
            let total_votes: usize = with_votes.iter().map(|(_, _, v)| v.len()).sum();

            let options = with_votes
                .into_iter()
                .map(|(id, text, votes)| {
                    Ok(PollOptionView {
                        id: parse_uuid(&id)?,
                        text,
                        percentage: vote_percentage(votes.len(), total_votes),
                        votes,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(PollView {
                id: parse_uuid(&row.id)?,
                question: row.question,
                options,
                family_id: FamilyId::new(row.family_id),
                created_by: member_summary(&row.created_by)?,
                is_active: row.is_active,
                total_votes,
                created_at: parse_ts(&row.created_at)?,
            })
        })
        .collect()
}

pub fn alert_view(row: AlertRow) -> Result<AlertView> {
    Ok(AlertView {
        id: parse_uuid(&row.id)?,
        triggered_by: member_summary(&row.triggered_by)?,
        family_id: FamilyId::new(row.family_id),
        location: GeoPoint {
            lat: row.lat,
            lng: row.lng,
        },
        status: row.status.parse().map_err(anyhow::Error::msg)?,
        resolved_at: row.resolved_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&row.created_at)?,
    })
}
