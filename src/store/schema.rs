//! Linear-versioned schema migration driven by the `_schema` table.

// crates.io
use sqlx::SqlitePool;
// self
use crate::_prelude::*;

const SCHEMA_V0_UP: &str = "
CREATE TABLE IF NOT EXISTS _schema(
    version INTEGER PRIMARY KEY,
    created_at TIMESTAMP
);
INSERT INTO _schema(version, created_at) VALUES (0, CURRENT_TIMESTAMP) ON CONFLICT DO NOTHING;
";

const SCHEMA_V1_UP: &str = "
CREATE TABLE IF NOT EXISTS tests (
    test_id TEXT PRIMARY KEY,
    test_name TEXT NOT NULL,
    test_type TEXT CHECK( test_type IN (
                                            'HTTP',
                                            'Prometheus',
                                            'TLS',
                                            'DNS',
                                            'Ping',
                                            'SSH',
                                            'TCP',
                                            'HTTPPush',
                                            'PrometheusPush'
                                        )
                        ),
    url TEXT NOT NULL,
    interval INTEGER NOT NULL,
    timeout INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL,
    active INTEGER NOT NULL,
    blob BLOB
);

CREATE TABLE IF NOT EXISTS logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    test_id TEXT NOT NULL,
    status_id INTEGER NOT NULL,
    message TEXT,
    response_time INTEGER,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (test_id)
        REFERENCES tests (test_id),
    FOREIGN KEY (status_id)
        REFERENCES status_map (status_id)
);

CREATE TABLE IF NOT EXISTS status_map (
    status_id INTEGER PRIMARY KEY NOT NULL,
    status_name TEXT NOT NULL,
    UNIQUE (status_id, status_name)
);

CREATE TABLE IF NOT EXISTS contacts (
    contact_id TEXT NOT NULL,
    contact_name TEXT NOT NULL,
    contact_type TEXT NOT NULL,
    contact_url TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_contacts (
    test_id TEXT NOT NULL,
    contact_id TEXT NOT NULL,
    threshold INTEGER NOT NULL,
    UNIQUE (contact_id, test_id),
    FOREIGN KEY (test_id)
        REFERENCES tests (test_id),
    FOREIGN KEY (contact_id)
        REFERENCES contacts (contact_id)
);

INSERT INTO status_map(status_id, status_name)
VALUES
    (1, 'Successful'),
    (2, 'Error'),
    (3, 'TimedOut'),
    (5, 'Initialized'),
    (6, 'Paused')
;

CREATE TABLE IF NOT EXISTS incidents (
    incident_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    test_id TEXT NOT NULL,
    active INTEGER NOT NULL,
    root_cause TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    closed_at TIMESTAMP,
    FOREIGN KEY (test_id)
        REFERENCES tests (test_id)
);

CREATE TABLE IF NOT EXISTS incident_contact_log (
    incident_id INTEGER,
    contact_id TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (contact_id)
        REFERENCES contacts (contact_id),
    FOREIGN KEY (incident_id)
        REFERENCES incidents (incident_id)
);

INSERT INTO _schema(version, created_at) VALUES (1, CURRENT_TIMESTAMP) ON CONFLICT DO NOTHING;
";

/// Apply pending schema versions in order.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
	tracing::info!("migrating sql schema");

	sqlx::raw_sql(SCHEMA_V0_UP).execute(pool).await?;

	let version: i64 = sqlx::query_scalar("SELECT max(version) FROM _schema").fetch_one(pool).await?;

	tracing::info!(version, "schema version before migration");

	if version == 0 {
		tracing::info!("migrating to schema version 1");

		sqlx::raw_sql(SCHEMA_V1_UP).execute(pool).await?;
	}

	Ok(())
}
