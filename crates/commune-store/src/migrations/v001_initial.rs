//! v001 -- Initial schema creation.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users & sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    fullname      TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- Argon2id PHC string
    profile_pic   TEXT NOT NULL,
    created_at    TEXT NOT NULL                -- RFC-3339, fixed width
);

CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY NOT NULL,      -- hex-encoded random bytes
    user_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_groups (
    id          TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    image       TEXT,
    admin_id    TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (admin_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id  TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL,

    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
-- member_a < member_b, so one row per unordered pair.
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,
    member_a   TEXT NOT NULL,
    member_b   TEXT NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (member_a, member_b),
    CHECK (member_a < member_b)
);

CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,
    sender_id   TEXT NOT NULL,
    receiver_id TEXT,                          -- direct messages
    group_id    TEXT,                          -- group messages
    body        TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    CHECK ((receiver_id IS NULL) <> (group_id IS NULL)),
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_group ON messages(group_id, created_at);

-- seq gives the conversation its append order.
CREATE TABLE IF NOT EXISTS conversation_messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    message_id      TEXT NOT NULL UNIQUE,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (message_id) REFERENCES messages(id)
);

CREATE INDEX IF NOT EXISTS idx_conversation_messages_conv
    ON conversation_messages(conversation_id, seq);

-- ----------------------------------------------------------------
-- Events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id             TEXT PRIMARY KEY NOT NULL,
    group_id       TEXT NOT NULL,
    title          TEXT NOT NULL,
    description    TEXT NOT NULL,
    date           TEXT NOT NULL,
    location       TEXT,
    attendee_limit INTEGER NOT NULL DEFAULT 0, -- 0 = unlimited
    created_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL,

    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_events_group ON events(group_id);

CREATE TABLE IF NOT EXISTS event_attendees (
    seq      INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL,
    user_id  TEXT NOT NULL,

    UNIQUE (event_id, user_id),
    FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS event_requests (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id   TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    reason     TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,

    UNIQUE (event_id, user_id),
    FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Statuses (expire 24h after created_at)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS statuses (
    id          TEXT PRIMARY KEY NOT NULL,
    user_id     TEXT NOT NULL,
    group_id    TEXT NOT NULL,
    media_url   TEXT NOT NULL,
    media_type  TEXT NOT NULL DEFAULT 'image',
    caption     TEXT NOT NULL DEFAULT '',
    music_track TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,

    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_statuses_group_ts ON statuses(group_id, created_at DESC);

CREATE TABLE IF NOT EXISTS status_viewers (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,
    status_id TEXT NOT NULL,
    user_id   TEXT NOT NULL,

    UNIQUE (status_id, user_id),
    FOREIGN KEY (status_id) REFERENCES statuses(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
