use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('admin', 'child')),
            parent_id   TEXT REFERENCES users(id),
            family_id   TEXT,
            phone       TEXT,
            avatar_url  TEXT,
            is_online   INTEGER NOT NULL DEFAULT 0,
            last_seen   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_family
            ON users(family_id);

        CREATE TABLE IF NOT EXISTS chats (
            id                  TEXT PRIMARY KEY,
            chat_name           TEXT,
            is_group            INTEGER NOT NULL,
            family_id           TEXT,
            pair_key            TEXT,
            group_admin         TEXT REFERENCES users(id),
            latest_message_id   TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        -- One group chat per family, one direct chat per participant pair
        CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_family_group
            ON chats(family_id) WHERE is_group = 1 AND family_id IS NOT NULL;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_pair
            ON chats(pair_key) WHERE pair_key IS NOT NULL;

        CREATE TABLE IF NOT EXISTS chat_members (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            position    INTEGER NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_members_user
            ON chat_members(user_id);

        CREATE TABLE IF NOT EXISTS pinned_notes (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            text        TEXT NOT NULL,
            pinned_by   TEXT NOT NULL REFERENCES users(id),
            pinned_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            reply_to    TEXT REFERENCES messages(id),
            family_id   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS message_reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            symbol      TEXT NOT NULL,
            count       INTEGER NOT NULL,
            PRIMARY KEY (message_id, symbol)
        );

        CREATE TABLE IF NOT EXISTS polls (
            id          TEXT PRIMARY KEY,
            question    TEXT NOT NULL,
            family_id   TEXT NOT NULL,
            created_by  TEXT NOT NULL REFERENCES users(id),
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_polls_family
            ON polls(family_id, created_at);

        CREATE TABLE IF NOT EXISTS poll_options (
            id          TEXT PRIMARY KEY,
            poll_id     TEXT NOT NULL REFERENCES polls(id),
            position    INTEGER NOT NULL,
            text        TEXT NOT NULL
        );

        -- A voter holds at most one option per poll
        CREATE TABLE IF NOT EXISTS poll_votes (
            poll_id     TEXT NOT NULL REFERENCES polls(id),
            option_id   TEXT NOT NULL REFERENCES poll_options(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            voted_at    TEXT NOT NULL,
            PRIMARY KEY (poll_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id              TEXT PRIMARY KEY,
            triggered_by    TEXT NOT NULL REFERENCES users(id),
            family_id       TEXT NOT NULL,
            lat             REAL NOT NULL,
            lng             REAL NOT NULL,
            status          TEXT NOT NULL CHECK (status IN ('active', 'resolved')),
            resolved_at     TEXT,
            created_at      TEXT NOT NULL
        );

        -- At most one active alert per user
        CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_one_active
            ON alerts(triggered_by) WHERE status = 'active';

        CREATE INDEX IF NOT EXISTS idx_alerts_family
            ON alerts(family_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
