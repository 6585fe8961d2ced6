//! Database schema and migrations.
//!
//! Migrations are applied in order when the database is opened. The
//! `schema_version` table tracks which ones have run. Timestamps are stored
//! as INTEGER unix milliseconds (UTC).

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users
    r#"
CREATE TABLE users (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    email          TEXT NOT NULL,
    password_hash  TEXT NOT NULL,            -- Argon2id PHC string
    role           TEXT NOT NULL DEFAULT 'user'
                   CHECK (role IN ('user', 'moderator', 'admin')),
    created_at     INTEGER NOT NULL,
    updated_at     INTEGER NOT NULL
);

CREATE UNIQUE INDEX idx_users_email ON users(email COLLATE NOCASE);
"#,
    // v2: messages
    r#"
CREATE TABLE messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused
    sender_id    INTEGER NOT NULL REFERENCES users(id),
    receiver_id  INTEGER NOT NULL REFERENCES users(id),
    subject      TEXT NOT NULL,
    body         TEXT NOT NULL,
    is_read      INTEGER NOT NULL DEFAULT 0,
    label        TEXT NOT NULL DEFAULT 'inbox'
                 CHECK (label IN ('inbox', 'spam', 'trash')),
    read_limit   INTEGER NOT NULL DEFAULT 0 CHECK (read_limit >= 0),
    read_count   INTEGER NOT NULL DEFAULT 0
                 CHECK (read_count >= 0 AND (read_limit = 0 OR read_count <= read_limit)),
    expires_at   INTEGER,
    created_at   INTEGER NOT NULL,
    CHECK ((read_limit > 0) = (expires_at IS NOT NULL))
);

CREATE INDEX idx_messages_receiver_label ON messages(receiver_id, label, created_at);
CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
CREATE INDEX idx_messages_expires_at ON messages(expires_at) WHERE expires_at IS NOT NULL;
"#,
    // v3: tombstones for destroyed messages (no body is kept)
    r#"
CREATE TABLE message_tombstones (
    message_id    INTEGER PRIMARY KEY,
    sender_id     INTEGER NOT NULL REFERENCES users(id),
    receiver_id   INTEGER NOT NULL REFERENCES users(id),
    subject       TEXT NOT NULL,
    reason        TEXT NOT NULL CHECK (reason IN ('read_limit', 'expired')),
    created_at    INTEGER NOT NULL,
    destroyed_at  INTEGER NOT NULL
);

CREATE INDEX idx_tombstones_sender ON message_tombstones(sender_id, created_at);
"#,
    // v4: notification outbox
    r#"
CREATE TABLE notification_outbox (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id       INTEGER NOT NULL,   -- the message may be gone before delivery
    topic            TEXT NOT NULL,
    payload          TEXT NOT NULL,      -- JSON
    attempts         INTEGER NOT NULL DEFAULT 0,
    next_attempt_at  INTEGER NOT NULL,
    delivered_at     INTEGER,
    failed_at        INTEGER,
    last_error       TEXT,
    created_at       INTEGER NOT NULL
);

CREATE INDEX idx_outbox_pending ON notification_outbox(next_attempt_at)
    WHERE delivered_at IS NULL AND failed_at IS NULL;
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert_eq!(MIGRATIONS.len(), 4);
    }

    #[test]
    fn test_users_migration_constrains_role() {
        let users = MIGRATIONS[0];
        assert!(users.contains("CREATE TABLE users"));
        assert!(users.contains("CHECK (role IN ('user', 'moderator', 'admin'))"));
        assert!(users.contains("COLLATE NOCASE"));
    }

    #[test]
    fn test_messages_migration_constrains_lifecycle() {
        let messages = MIGRATIONS[1];
        assert!(messages.contains("AUTOINCREMENT"));
        assert!(messages.contains("read_limit >= 0"));
        assert!(messages.contains("(read_limit > 0) = (expires_at IS NOT NULL)"));
    }

    #[test]
    fn test_migrations_are_valid_sql() {
        for migration in MIGRATIONS {
            assert!(!migration.trim().is_empty());
            assert!(migration.contains("CREATE"));
        }
    }
}
