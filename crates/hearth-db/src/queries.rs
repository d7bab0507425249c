use crate::models::{
    AlertRow, ChatRow, MemberRow, MessageRow, NewAlert, NewMessage, NewPoll, NewUser,
    PinnedNoteRow, PollOptionRow, PollRow, PollVoteRow, ReactionRow, ReadRow, UserRow,
    VoteOutcome,
};
use crate::{Database, pair_key};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, name, email, password, role, parent_id, family_id, phone, avatar_url, is_online, last_seen, created_at";

const CHAT_COLUMNS: &str =
    "id, chat_name, is_group, family_id, group_admin, latest_message_id, created_at, updated_at";

const MESSAGE_SELECT: &str =
    "SELECT m.id, m.chat_id, m.sender_id, u.name, u.avatar_url, m.content, m.reply_to, m.family_id, m.created_at
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

const POLL_SELECT: &str =
    "SELECT p.id, p.question, p.family_id, p.created_by, u.name, u.avatar_url, p.is_active, p.created_at
     FROM polls p
     JOIN users u ON u.id = p.created_by";

const ALERT_SELECT: &str =
    "SELECT a.id, a.triggered_by, u.name, u.avatar_url, a.family_id, a.lat, a.lng, a.status, a.resolved_at, a.created_at
     FROM alerts a
     JOIN users u ON u.id = a.triggered_by";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, role, parent_id, family_id, phone, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role,
                    user.parent_id,
                    user.family_id,
                    user.phone,
                    user.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// The first admin registered for a family; owner of the family code.
    pub fn get_family_admin(&self, family_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE family_id = ?1 AND role = 'admin' ORDER BY created_at LIMIT 1",
                USER_COLUMNS
            );
            conn.query_row(&sql, [family_id], user_from_row).optional()
        })
    }

    /// Every member of a family, oldest account first.
    pub fn get_family_members(&self, family_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| query_family_members(conn, family_id))
    }

    pub fn get_family_children(&self, family_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE family_id = ?1 AND role = 'child' ORDER BY created_at",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([family_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_user_online(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET is_online = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn set_user_offline(&self, id: &str, last_seen: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_online = 0, last_seen = ?2 WHERE id = ?1",
                (id, last_seen),
            )?;
            Ok(())
        })
    }

    // -- Chats --

    /// Find the family group chat, or create it with the given members.
    ///
    /// Lookup order: a group chat recorded for `family_id`, then a group chat
    /// whose membership is exactly `member_ids` (adopted for the family if it
    /// has no family recorded yet). An existing chat gains any of `member_ids`
    /// it does not already hold. Returns `(chat, created)`.
    pub fn get_or_create_group_chat(
        &self,
        new_id: &str,
        family_id: &str,
        chat_name: &str,
        admin_id: &str,
        member_ids: &[String],
        now: &str,
    ) -> Result<(ChatRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(chat) = query_group_chat_by_family(&tx, family_id)? {
                append_members(&tx, &chat.id, member_ids)?;
                tx.commit()?;
                return Ok((chat, false));
            }

            if let Some(chat_id) = query_group_chat_by_members(&tx, member_ids)? {
                tx.execute(
                    "UPDATE chats SET family_id = ?1 WHERE id = ?2 AND family_id IS NULL",
                    (family_id, &chat_id),
                )?;
                append_members(&tx, &chat_id, member_ids)?;
                let chat = query_chat(&tx, &chat_id)?
                    .ok_or_else(|| anyhow!("Chat vanished during lookup: {}", chat_id))?;
                tx.commit()?;
                return Ok((chat, false));
            }

            tx.execute(
                "INSERT INTO chats (id, chat_name, is_group, family_id, pair_key, group_admin, latest_message_id, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, NULL, ?4, NULL, ?5, ?5)",
                (new_id, chat_name, family_id, admin_id, now),
            )?;
            insert_members(&tx, new_id, member_ids)?;

            let chat = query_chat(&tx, new_id)?
                .ok_or_else(|| anyhow!("Chat not found after insert: {}", new_id))?;
            tx.commit()?;
            Ok((chat, true))
        })
    }

    pub fn find_direct_chat(&self, a: &str, b: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_direct_chat(conn, &pair_key(a, b)))
    }

    /// Find the one-on-one chat between `a` and `b`, creating it if absent.
    /// The unique pair key makes concurrent first sends converge on one row.
    /// Returns `(chat, created)`.
    pub fn get_or_create_direct_chat(
        &self,
        new_id: &str,
        a: &str,
        b: &str,
        now: &str,
    ) -> Result<(ChatRow, bool)> {
        let key = pair_key(a, b);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO chats (id, chat_name, is_group, family_id, pair_key, group_admin, latest_message_id, created_at, updated_at)
                 VALUES (?1, NULL, 0, NULL, ?2, NULL, NULL, ?3, ?3)",
                (new_id, &key, now),
            )?;
            if inserted == 1 {
                insert_members(&tx, new_id, &[a.to_string(), b.to_string()])?;
            }

            let chat = query_direct_chat(&tx, &key)?
                .ok_or_else(|| anyhow!("Direct chat not found for pair {}", key))?;
            tx.commit()?;
            Ok((chat, inserted == 1))
        })
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_chat(conn, id))
    }

    /// Members of a chat in the order they were added.
    pub fn get_chat_members(&self, chat_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.avatar_url
                 FROM chat_members cm
                 JOIN users u ON u.id = cm.user_id
                 WHERE cm.chat_id = ?1
                 ORDER BY cm.position",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| member_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_chat_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                    (chat_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Point the chat at its newest message and bump its activity time.
    pub fn set_latest_message(&self, chat_id: &str, message_id: &str, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET latest_message_id = ?2, updated_at = ?3 WHERE id = ?1",
                (chat_id, message_id, at),
            )?;
            Ok(())
        })
    }

    // -- Pinned notes --

    pub fn add_pinned_note(
        &self,
        id: &str,
        chat_id: &str,
        text: &str,
        pinned_by: &str,
        pinned_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pinned_notes (id, chat_id, text, pinned_by, pinned_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, chat_id, text, pinned_by, pinned_at),
            )?;
            Ok(())
        })
    }

    pub fn get_pinned_notes(&self, chat_id: &str) -> Result<Vec<PinnedNoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.chat_id, p.text, u.id, u.name, u.avatar_url, p.pinned_at
                 FROM pinned_notes p
                 JOIN users u ON u.id = p.pinned_by
                 WHERE p.chat_id = ?1
                 ORDER BY p.pinned_at, p.rowid",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(PinnedNoteRow {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        text: row.get(2)?,
                        pinned_by: member_from_row(row, 3)?,
                        pinned_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, reply_to, family_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.chat_id,
                    msg.sender_id,
                    msg.content,
                    msg.reply_to,
                    msg.family_id,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
            conn.query_row(&sql, [id], message_from_row).optional()
        })
    }

    /// Full history of a chat, oldest first.
    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.chat_id = ?1 ORDER BY m.created_at, m.rowid",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch reaction counters for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, symbol, count FROM message_reactions WHERE message_id IN ({}) ORDER BY symbol",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        symbol: row.get(1)?,
                        count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch read receipts for a set of message IDs.
    pub fn get_reads_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReadRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id FROM message_reads WHERE message_id IN ({})",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids), |row| {
                    Ok(ReadRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Increment the counter for `symbol` on a message and return all of
    /// the message's counters.
    pub fn add_reaction(&self, message_id: &str, symbol: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_reactions (message_id, symbol, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(message_id, symbol) DO UPDATE SET count = count + 1",
                (message_id, symbol),
            )?;
            let mut stmt = conn.prepare(
                "SELECT message_id, symbol, count FROM message_reactions WHERE message_id = ?1 ORDER BY symbol",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        symbol: row.get(1)?,
                        count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Add `user_id` to the readers of every message in the chat they have
    /// not read yet. Returns how many messages were marked.
    pub fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let marked = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id)
                 SELECT id, ?2 FROM messages WHERE chat_id = ?1",
                (chat_id, user_id),
            )?;
            Ok(marked)
        })
    }

    // -- Polls --

    pub fn create_poll(&self, poll: &NewPoll<'_>, options: &[(String, String)]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO polls (id, question, family_id, created_by, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                (poll.id, poll.question, poll.family_id, poll.created_by, poll.created_at),
            )?;
            for (position, (option_id, text)) in options.iter().enumerate() {
                tx.execute(
                    "INSERT INTO poll_options (id, poll_id, position, text) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![option_id, poll.id, position as i64, text],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_poll(&self, id: &str) -> Result<Option<PollRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.id = ?1", POLL_SELECT);
            conn.query_row(&sql, [id], poll_from_row).optional()
        })
    }

    /// Active polls of a family, newest first.
    pub fn get_active_family_polls(&self, family_id: &str) -> Result<Vec<PollRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE p.family_id = ?1 AND p.is_active = 1 ORDER BY p.created_at DESC, p.rowid DESC",
                POLL_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([family_id], poll_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Options of the given polls, in their original order.
    pub fn get_poll_options(&self, poll_ids: &[String]) -> Result<Vec<PollOptionRow>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, poll_id, text FROM poll_options WHERE poll_id IN ({}) ORDER BY poll_id, position",
                placeholders(poll_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(poll_ids), |row| {
                    Ok(PollOptionRow {
                        id: row.get(0)?,
                        poll_id: row.get(1)?,
                        text: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_poll_votes(&self, poll_ids: &[String]) -> Result<Vec<PollVoteRow>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT v.option_id, u.id, u.name, u.avatar_url
                 FROM poll_votes v
                 JOIN users u ON u.id = v.user_id
                 WHERE v.poll_id IN ({})
                 ORDER BY v.voted_at, v.rowid",
                placeholders(poll_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(poll_ids), |row| {
                    Ok(PollVoteRow {
                        option_id: row.get(0)?,
                        voter: member_from_row(row, 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move `user_id`'s vote on `poll_id` to `option_id`: the voter is
    /// removed from every option of the poll, then added to the chosen one.
    /// Nothing changes when the option does not belong to the poll.
    pub fn cast_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        user_id: &str,
        voted_at: &str,
    ) -> Result<VoteOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let belongs: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM poll_options WHERE id = ?1 AND poll_id = ?2",
                    (option_id, poll_id),
                    |row| row.get(0),
                )
                .optional()?;
            if belongs.is_none() {
                return Ok(VoteOutcome::UnknownOption);
            }

            tx.execute(
                "DELETE FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
                (poll_id, user_id),
            )?;
            tx.execute(
                "INSERT INTO poll_votes (poll_id, option_id, user_id, voted_at) VALUES (?1, ?2, ?3, ?4)",
                (poll_id, option_id, user_id, voted_at),
            )?;
            tx.commit()?;
            Ok(VoteOutcome::Recorded)
        })
    }

    // -- Alerts --

    /// Insert a new active alert. Returns false, without writing, when the
    /// user already has an active one.
    pub fn insert_alert(&self, alert: &NewAlert<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let active: Option<String> = tx
                .query_row(
                    "SELECT id FROM alerts WHERE triggered_by = ?1 AND status = 'active'",
                    [alert.triggered_by],
                    |row| row.get(0),
                )
                .optional()?;
            if active.is_some() {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO alerts (id, triggered_by, family_id, lat, lng, status, resolved_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', NULL, ?6)",
                rusqlite::params![
                    alert.id,
                    alert.triggered_by,
                    alert.family_id,
                    alert.lat,
                    alert.lng,
                    alert.created_at,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<AlertRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE a.id = ?1", ALERT_SELECT);
            conn.query_row(&sql, [id], alert_from_row).optional()
        })
    }

    /// Resolve the user's own active alert, if any, and return it.
    pub fn resolve_active_alert(&self, user_id: &str, resolved_at: &str) -> Result<Option<AlertRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(alert) = query_active_alert(&tx, user_id)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE alerts SET status = 'resolved', resolved_at = ?2 WHERE id = ?1",
                (&alert.id, resolved_at),
            )?;
            tx.commit()?;

            Ok(Some(AlertRow {
                status: "resolved".to_string(),
                resolved_at: Some(resolved_at.to_string()),
                ..alert
            }))
        })
    }

    /// All alerts of a family, newest first.
    pub fn get_family_alerts(&self, family_id: &str) -> Result<Vec<AlertRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE a.family_id = ?1 ORDER BY a.created_at DESC, a.rowid DESC",
                ALERT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([family_id], alert_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        parent_id: row.get(5)?,
        family_id: row.get(6)?,
        phone: row.get(7)?,
        avatar_url: row.get(8)?,
        is_online: row.get(9)?,
        last_seen: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn member_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        avatar_url: row.get(offset + 2)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        chat_name: row.get(1)?,
        is_group: row.get(2)?,
        family_id: row.get(3)?,
        group_admin: row.get(4)?,
        latest_message_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender: member_from_row(row, 2)?,
        content: row.get(5)?,
        reply_to: row.get(6)?,
        family_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn poll_from_row(row: &Row<'_>) -> rusqlite::Result<PollRow> {
    Ok(PollRow {
        id: row.get(0)?,
        question: row.get(1)?,
        family_id: row.get(2)?,
        created_by: member_from_row(row, 3)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRow> {
    Ok(AlertRow {
        id: row.get(0)?,
        triggered_by: member_from_row(row, 1)?,
        family_id: row.get(4)?,
        lat: row.get(5)?,
        lng: row.get(6)?,
        status: row.get(7)?,
        resolved_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    conn.query_row(&sql, [value], user_from_row).optional()
}

fn query_family_members(conn: &Connection, family_id: &str) -> Result<Vec<UserRow>> {
    let sql = format!(
        "SELECT {} FROM users WHERE family_id = ?1 ORDER BY created_at, rowid",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([family_id], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_chat(conn: &Connection, id: &str) -> Result<Option<ChatRow>> {
    let sql = format!("SELECT {} FROM chats WHERE id = ?1", CHAT_COLUMNS);
    conn.query_row(&sql, [id], chat_from_row).optional()
}

fn query_direct_chat(conn: &Connection, key: &str) -> Result<Option<ChatRow>> {
    let sql = format!(
        "SELECT {} FROM chats WHERE pair_key = ?1 AND is_group = 0",
        CHAT_COLUMNS
    );
    conn.query_row(&sql, [key], chat_from_row).optional()
}

fn query_group_chat_by_family(conn: &Connection, family_id: &str) -> Result<Option<ChatRow>> {
    let sql = format!(
        "SELECT {} FROM chats WHERE is_group = 1 AND family_id = ?1",
        CHAT_COLUMNS
    );
    conn.query_row(&sql, [family_id], chat_from_row).optional()
}

/// Id of a group chat whose member set equals `member_ids` exactly.
fn query_group_chat_by_members(conn: &Connection, member_ids: &[String]) -> Result<Option<String>> {
    if member_ids.is_empty() {
        return Ok(None);
    }

    let mut wanted: Vec<&str> = member_ids.iter().map(String::as_str).collect();
    wanted.sort_unstable();
    wanted.dedup();

    let mut candidates = conn.prepare(
        "SELECT c.id FROM chats c
         WHERE c.is_group = 1
           AND (SELECT COUNT(*) FROM chat_members cm WHERE cm.chat_id = c.id) = ?1
         ORDER BY c.created_at",
    )?;
    let chat_ids = candidates
        .query_map([wanted.len() as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut members_stmt = conn.prepare("SELECT user_id FROM chat_members WHERE chat_id = ?1")?;
    for chat_id in chat_ids {
        let mut members = members_stmt
            .query_map([&chat_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        members.sort_unstable();
        if members.iter().map(String::as_str).eq(wanted.iter().copied()) {
            return Ok(Some(chat_id));
        }
    }

    Ok(None)
}

fn insert_members(conn: &Connection, chat_id: &str, member_ids: &[String]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO chat_members (chat_id, user_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, user_id) in member_ids.iter().enumerate() {
        stmt.execute(rusqlite::params![chat_id, user_id, position as i64])?;
    }
    Ok(())
}

/// Adds members missing from an existing chat after its current last position.
fn append_members(conn: &Connection, chat_id: &str, member_ids: &[String]) -> Result<()> {
    let mut next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM chat_members WHERE chat_id = ?1",
        [chat_id],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO chat_members (chat_id, user_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for user_id in member_ids {
        if stmt.execute(rusqlite::params![chat_id, user_id, next])? > 0 {
            next += 1;
        }
    }
    Ok(())
}

fn query_active_alert(conn: &Connection, user_id: &str) -> Result<Option<AlertRow>> {
    let sql = format!(
        "{} WHERE a.triggered_by = ?1 AND a.status = 'active'",
        ALERT_SELECT
    );
    conn.query_row(&sql, [user_id], alert_from_row).optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
