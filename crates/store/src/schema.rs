use rusqlite::Connection;

use sa_domain::Result;

use crate::map_err;

/// Create every table named in spec §3/§6 plus the indexes required by
/// §4.1, idempotently. No migration framework beyond `CREATE … IF NOT
/// EXISTS` per the explicit non-goal in §1.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS providers (
            id              TEXT PRIMARY KEY,
            display_name    TEXT NOT NULL,
            command         TEXT NOT NULL,
            args_json       TEXT NOT NULL DEFAULT '[]',
            env_json        TEXT NOT NULL DEFAULT '{}',
            quality_score   REAL
        );

        CREATE TABLE IF NOT EXISTS tools (
            name            TEXT PRIMARY KEY,
            provider_id     TEXT NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
            description     TEXT NOT NULL,
            input_schema    TEXT NOT NULL,
            category        TEXT,
            keywords_json   TEXT NOT NULL DEFAULT '[]',
            usage_count     INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_tools_provider ON tools(provider_id);

        CREATE TABLE IF NOT EXISTS usage_log (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            ts              TEXT NOT NULL,
            tool_name       TEXT NOT NULL,
            args_json       TEXT NOT NULL,
            success         INTEGER NOT NULL,
            elapsed_ms      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_usage_tool_ts ON usage_log(tool_name, ts DESC);

        CREATE TABLE IF NOT EXISTS memory (
            id              TEXT PRIMARY KEY,
            key             TEXT NOT NULL,
            value           TEXT NOT NULL,
            category        TEXT,
            tags_json       TEXT NOT NULL DEFAULT '[]',
            created_at      TEXT NOT NULL,
            last_access_at  TEXT NOT NULL,
            access_count    INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_memory_category ON memory(category);
        CREATE INDEX IF NOT EXISTS idx_memory_created ON memory(created_at DESC);

        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY,
            content         TEXT NOT NULL,
            status          TEXT NOT NULL,
            parent_id       TEXT REFERENCES tasks(id) ON DELETE CASCADE,
            tags_json       TEXT NOT NULL DEFAULT '[]',
            item_type       TEXT,
            tdd_phase       TEXT,
            test_path       TEXT,
            agent_id        TEXT,
            created_at      TEXT NOT NULL,
            completed_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

        CREATE TABLE IF NOT EXISTS testruns (
            id              TEXT PRIMARY KEY,
            task_id         TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            test_path       TEXT NOT NULL,
            phase           TEXT NOT NULL,
            passed          INTEGER NOT NULL,
            created_at      TEXT NOT NULL,
            coverage        REAL
        );
        CREATE INDEX IF NOT EXISTS idx_testruns_path_ts ON testruns(test_path, created_at DESC);

        CREATE TABLE IF NOT EXISTS guides (
            id              TEXT PRIMARY KEY,
            slug            TEXT NOT NULL UNIQUE,
            title           TEXT NOT NULL,
            category        TEXT,
            difficulty      TEXT,
            body            TEXT NOT NULL,
            excerpt         TEXT NOT NULL,
            tags_json       TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_guides_category ON guides(category);

        CREATE TABLE IF NOT EXISTS guide_progress (
            guide_id        TEXT NOT NULL REFERENCES guides(id) ON DELETE CASCADE,
            session_id      TEXT NOT NULL,
            status          TEXT NOT NULL,
            step_index      INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (guide_id, session_id)
        );

        CREATE TABLE IF NOT EXISTS agents (
            id              TEXT PRIMARY KEY,
            agent_type      TEXT NOT NULL,
            task            TEXT NOT NULL,
            status          TEXT NOT NULL,
            parent_task_id  TEXT,
            result_json     TEXT,
            spawned_at      TEXT NOT NULL,
            completed_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);

        CREATE TABLE IF NOT EXISTS context_snapshots (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL,
            captured_at     TEXT NOT NULL,
            snapshot_json   TEXT NOT NULL,
            metadata_json   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_session ON context_snapshots(session_id, captured_at DESC);

        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            created_at      TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_err)?;
    Ok(())
}
