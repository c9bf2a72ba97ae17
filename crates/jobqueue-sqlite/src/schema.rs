//! DDL for the `jobs`/`job_executions` schema, normative per spec.md §6.

pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        function_identifier TEXT NOT NULL,
        parameters TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        dependencies TEXT NOT NULL DEFAULT '[]',
        max_attempts INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        timeout_seconds INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        worker_id TEXT,
        result TEXT,
        error TEXT,
        executing_workflow_id TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_status ON jobs(status)",
    "CREATE INDEX IF NOT EXISTS jobs_workflow ON jobs(executing_workflow_id)",
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES jobs(id),
        worker_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        status TEXT NOT NULL,
        result TEXT,
        error TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS executions_job ON job_executions(job_id)",
];
