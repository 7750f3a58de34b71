//! SQL schema for the Docket SQLite store.
//!
//! Executed once at connection startup. Every table referencing a subject
//! carries `user_id REFERENCES users ON DELETE CASCADE` plus its own
//! `tenant_id`, and must be listed in the dependent registry.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id                TEXT PRIMARY KEY,
    tenant_id              TEXT NOT NULL,
    email                  TEXT NOT NULL,
    name                   TEXT NOT NULL,
    phone                  TEXT,
    role                   TEXT NOT NULL,   -- 'admin' | 'lawyer' | 'staff' | 'client'
    avatar_url             TEXT,
    reset_token            TEXT,
    reset_token_expires_at TEXT,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    UNIQUE (tenant_id, email)
);

-- Zero or one linked client record per user.
CREATE TABLE IF NOT EXISTS clients (
    client_id       TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id       TEXT NOT NULL,
    name            TEXT NOT NULL,
    email           TEXT,
    phone           TEXT,
    address         TEXT,
    national_id     TEXT,
    passport_number TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS case_files (
    case_file_id TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id    TEXT NOT NULL,
    title        TEXT NOT NULL,
    reference    TEXT,
    status       TEXT NOT NULL,
    opened_at    TEXT NOT NULL
);

-- Case-file links only null out, so a user's cascade never removes rows
-- owned by somebody else.
CREATE TABLE IF NOT EXISTS documents (
    document_id  TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id    TEXT NOT NULL,
    case_file_id TEXT REFERENCES case_files(case_file_id) ON DELETE SET NULL,
    file_name    TEXT NOT NULL,
    mime_type    TEXT NOT NULL,
    size_bytes   INTEGER NOT NULL,
    uploaded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id   TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id    TEXT NOT NULL,
    case_file_id TEXT REFERENCES case_files(case_file_id) ON DELETE SET NULL,
    content      TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    session_id TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id  TEXT NOT NULL,
    title      TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_messages (
    message_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES chat_sessions(session_id) ON DELETE CASCADE,
    user_id    TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id  TEXT NOT NULL,
    role       TEXT NOT NULL,   -- 'user' | 'assistant'
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Third-party credentials; blanked and stamped on anonymization.
CREATE TABLE IF NOT EXISTS access_tokens (
    token_id      TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id     TEXT NOT NULL,
    provider      TEXT NOT NULL,
    access_token  TEXT,
    refresh_token TEXT,
    expires_at    TEXT,
    revoked_at    TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS consent_records (
    consent_id     TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id      TEXT NOT NULL,
    purpose        TEXT NOT NULL,
    granted        INTEGER NOT NULL,
    granted_at     TEXT NOT NULL,
    revoked_at     TEXT,
    ip_address     TEXT,
    user_agent     TEXT,
    consent_method TEXT NOT NULL,
    CHECK ((granted = 1 AND revoked_at IS NULL) OR (granted = 0 AND revoked_at IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS data_export_requests (
    request_id        TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tenant_id         TEXT NOT NULL,
    status            TEXT NOT NULL,   -- 'pending' | 'processing' | 'completed' | 'failed'
    format            TEXT NOT NULL,
    requested_at      TEXT NOT NULL,
    completed_at      TEXT,
    expires_at        TEXT NOT NULL,
    size_bytes        INTEGER,
    item_count        INTEGER,
    error_message     TEXT,
    artifact_location TEXT,
    artifact_sha256   TEXT,
    artifact          BLOB,
    CHECK ((status = 'completed') = (
      completed_at IS NOT NULL AND size_bytes IS NOT NULL AND item_count IS NOT NULL
      AND artifact_location IS NOT NULL AND artifact_sha256 IS NOT NULL
    )),
    CHECK ((status = 'failed') = (error_message IS NOT NULL))
);

-- Append-only. `entity_id` and `actor_id` are opaque historical references
-- with no foreign key, so entries outlive the rows they describe.
CREATE TABLE IF NOT EXISTS audit_logs (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id    TEXT NOT NULL UNIQUE,
    tenant_id   TEXT NOT NULL,
    actor_id    TEXT,
    actor_type  TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   TEXT,
    metadata    TEXT NOT NULL,
    severity    TEXT NOT NULL,
    sensitive   INTEGER NOT NULL,
    ip_address  TEXT,
    user_agent  TEXT,
    created_at  TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audit_logs_no_update
BEFORE UPDATE ON audit_logs
BEGIN
    SELECT RAISE(ABORT, 'audit_logs is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_logs_no_delete
BEFORE DELETE ON audit_logs
BEGIN
    SELECT RAISE(ABORT, 'audit_logs is append-only');
END;

CREATE INDEX IF NOT EXISTS case_files_user_idx      ON case_files(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS documents_user_idx       ON documents(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS comments_user_idx        ON comments(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS chat_sessions_user_idx   ON chat_sessions(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS chat_messages_user_idx   ON chat_messages(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS access_tokens_user_idx   ON access_tokens(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS consent_records_user_idx ON consent_records(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS export_requests_user_idx ON data_export_requests(user_id, tenant_id);
CREATE INDEX IF NOT EXISTS audit_logs_tenant_idx    ON audit_logs(tenant_id, created_at);
CREATE INDEX IF NOT EXISTS audit_logs_actor_idx     ON audit_logs(actor_id);
CREATE INDEX IF NOT EXISTS audit_logs_entity_idx    ON audit_logs(entity_id);

PRAGMA user_version = 1;
";
