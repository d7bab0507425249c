/// SQLite row types. Kept separate from the hearth-types API models so the
/// store layer has no wire concerns.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub parent_id: Option<String>,
    pub family_id: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<String>,
    pub created_at: String,
}

/// Insert payload for `create_user`.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub parent_id: Option<&'a str>,
    pub family_id: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub created_at: &'a str,
}

pub struct ChatRow {
    pub id: String,
    pub chat_name: Option<String>,
    pub is_group: bool,
    pub family_id: Option<String>,
    pub group_admin: Option<String>,
    pub latest_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Chat member or any other place a user is shown by name.
pub struct MemberRow {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

pub struct PinnedNoteRow {
    pub id: String,
    pub chat_id: String,
    pub text: String,
    pub pinned_by: MemberRow,
    pub pinned_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender: MemberRow,
    pub content: String,
    pub reply_to: Option<String>,
    pub family_id: String,
    pub created_at: String,
}

pub struct ReactionRow {
    pub message_id: String,
    pub symbol: String,
    pub count: i64,
}

pub struct ReadRow {
    pub message_id: String,
    pub user_id: String,
}

pub struct PollRow {
    pub id: String,
    pub question: String,
    pub family_id: String,
    pub created_by: MemberRow,
    pub is_active: bool,
    pub created_at: String,
}

pub struct PollOptionRow {
    pub id: String,
    pub poll_id: String,
    pub text: String,
}

pub struct PollVoteRow {
    pub option_id: String,
    pub voter: MemberRow,
}

pub struct AlertRow {
    pub id: String,
    pub triggered_by: MemberRow,
    pub family_id: String,
    pub lat: f64,
    pub lng: f64,
    pub status: String,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

/// Outcome of `cast_vote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    UnknownOption,
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub chat_id: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub reply_to: Option<&'a str>,
    pub family_id: &'a str,
    pub created_at: &'a str,
}

pub struct NewPoll<'a> {
    pub id: &'a str,
    pub question: &'a str,
    pub family_id: &'a str,
    pub created_by: &'a str,
    pub created_at: &'a str,
}

pub struct NewAlert<'a> {
    pub id: &'a str,
    pub triggered_by: &'a str,
    pub family_id: &'a str,
    pub lat: f64,
    pub lng: f64,
    pub created_at: &'a str,
}
