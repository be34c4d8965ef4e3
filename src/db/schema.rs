use anyhow::Result;
use sqlx::PgPool;

/// Create every table the stores need; safe to run on every startup
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in [
        ("volume_types", CREATE_VOLUME_TYPES_TABLE),
        ("volumes", CREATE_VOLUMES_TABLE),
        ("volume_metadata", CREATE_VOLUME_METADATA_TABLE),
        ("volume_admin_metadata", CREATE_VOLUME_ADMIN_METADATA_TABLE),
        ("transfers", CREATE_TRANSFERS_TABLE),
        ("quota_usages", CREATE_QUOTA_USAGES_TABLE),
        ("reservations", CREATE_RESERVATIONS_TABLE),
        ("reservations_expiry_idx", CREATE_RESERVATIONS_EXPIRY_INDEX),
    ] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("PostgreSQL schema initialized successfully");
    Ok(())
}

const CREATE_VOLUME_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS volume_types (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    extra_specs JSONB NOT NULL DEFAULT '{}'::jsonb
)
"#;

const CREATE_VOLUMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS volumes (
    id             UUID PRIMARY KEY,
    status         TEXT NOT NULL,
    project_id     TEXT NOT NULL,
    user_id        TEXT NOT NULL,
    volume_type_id TEXT REFERENCES volume_types(id),
    size           BIGINT NOT NULL CHECK (size >= 0),
    display_name   TEXT,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_VOLUME_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS volume_metadata (
    volume_id UUID NOT NULL REFERENCES volumes(id) ON DELETE CASCADE,
    key       TEXT NOT NULL,
    value     TEXT NOT NULL,
    PRIMARY KEY (volume_id, key)
)
"#;

const CREATE_VOLUME_ADMIN_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS volume_admin_metadata (
    volume_id UUID NOT NULL REFERENCES volumes(id) ON DELETE CASCADE,
    key       TEXT NOT NULL,
    value     TEXT NOT NULL,
    PRIMARY KEY (volume_id, key)
)
"#;

// UNIQUE(volume_id): at most one live transfer per volume
const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id           UUID PRIMARY KEY,
    volume_id    UUID NOT NULL UNIQUE REFERENCES volumes(id) ON DELETE CASCADE,
    display_name TEXT,
    crypt_hash   TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_QUOTA_USAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quota_usages (
    project_id TEXT NOT NULL,
    resource   TEXT NOT NULL,
    in_use     BIGINT NOT NULL DEFAULT 0,
    reserved   BIGINT NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (project_id, resource)
)
"#;

const CREATE_RESERVATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reservations (
    id         UUID NOT NULL,
    project_id TEXT NOT NULL,
    resource   TEXT NOT NULL,
    delta      BIGINT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (id, resource)
)
"#;

const CREATE_RESERVATIONS_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_reservations_expires_at ON reservations (expires_at)";
