pub(crate) const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id           TEXT PRIMARY KEY NOT NULL,
    display_name TEXT,
    encoding     BLOB NOT NULL,
    length       INTEGER NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    identity_id  TEXT NOT NULL,
    period_key   TEXT NOT NULL,
    committed_at TEXT NOT NULL,
    PRIMARY KEY (identity_id, period_key)
);

CREATE INDEX IF NOT EXISTS attendance_by_period ON attendance (period_key);

CREATE TABLE IF NOT EXISTS absences (
    identity_id TEXT NOT NULL,
    period_key  TEXT NOT NULL,
    PRIMARY KEY (identity_id, period_key)
);
";
