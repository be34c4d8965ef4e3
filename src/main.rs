//! volume-transfer CLI
//!
//! Every subcommand runs one request against the PostgreSQL stores named in
//! `config/<env>.yaml`, except `demo`, which runs a full create/accept round
//! trip against the in-memory stores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use volume_transfer::config::AppConfig;
use volume_transfer::context::RequestContext;
use volume_transfer::db::{Database, init_schema};
use volume_transfer::logging::init_logging;
use volume_transfer::memory::MemoryStore;
use volume_transfer::notify::TracingSink;
use volume_transfer::quota::{
    InMemoryQuotaLedger, PgQuotaLedger, QuotaDeltas, QuotaLedger, ReaperConfig, ReservationReaper,
};
use volume_transfer::transfer::{AuthKeyHasher, PgTransferStore, TransferManager};
use volume_transfer::volume::{
    LazyField, LazyVolume, PgVolumeStore, VolumeFieldLoader, VolumeRecord, VolumeStore, VolumeType,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Move block-storage volumes between projects")]
struct Cli {
    /// Config environment, read from config/<env>.yaml
    #[arg(long, global = true, default_value = "dev")]
    env: String,

    /// Caller project
    #[arg(long, global = true, default_value = "default")]
    project: String,

    /// Caller user
    #[arg(long, global = true, default_value = "admin")]
    user: String,

    /// Run with admin visibility
    #[arg(long, global = true)]
    admin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database tables
    InitDb,
    /// Register a volume owned by the caller's project
    VolumeCreate {
        #[arg(long)]
        size: i64,
        #[arg(long)]
        name: Option<String>,
        /// Volume type id; created on the fly when `--type-name` is given
        #[arg(long)]
        type_id: Option<String>,
        #[arg(long, requires = "type_id")]
        type_name: Option<String>,
    },
    /// Show a volume, loading the named related fields
    VolumeShow {
        volume_id: Uuid,
        /// metadata, admin_metadata or volume_type
        #[arg(long = "load")]
        fields: Vec<String>,
    },
    /// List the caller project's volumes
    VolumeList,
    /// Destroy a volume; pending transfers go with it
    VolumeDestroy { volume_id: Uuid },
    /// Offer a volume for transfer and print the one-time auth key
    Create {
        volume_id: Uuid,
        #[arg(long)]
        name: Option<String>,
    },
    /// Accept a transfer into the caller's project
    Accept { transfer_id: Uuid, auth_key: String },
    /// Show one transfer
    Show { transfer_id: Uuid },
    /// List visible transfers
    List,
    /// Cancel a transfer
    Delete { transfer_id: Uuid },
    /// Expire abandoned quota reservations until interrupted
    Reaper,
    /// In-memory create/accept round trip
    Demo,
}

struct PgServices {
    manager: TransferManager,
    volumes: Arc<PgVolumeStore>,
    quotas: Arc<PgQuotaLedger>,
}

async fn connect(config: &AppConfig, env: &str) -> Result<PgServices> {
    let url = config.require_postgres_url(env)?;
    let db = Database::connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;
    let pool = db.pool().clone();

    let volumes = Arc::new(PgVolumeStore::new(pool.clone()));
    let transfers = Arc::new(PgTransferStore::new(pool.clone()));
    let quotas = Arc::new(PgQuotaLedger::new(pool, config.quota.clone()));
    let manager = TransferManager::new(
        volumes.clone(),
        transfers,
        volumes.clone(),
        quotas.clone(),
        Arc::new(TracingSink),
        hasher(config)?,
    );

    Ok(PgServices {
        manager,
        volumes,
        quotas,
    })
}

fn hasher(config: &AppConfig) -> Result<AuthKeyHasher> {
    Ok(AuthKeyHasher::new(
        config.transfer.key_length,
        config.transfer.hash_memory_kib,
        config.transfer.hash_iterations,
    )?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.env)?;
    let _guard = init_logging(&config);

    let ctx = if cli.admin {
        RequestContext::admin(cli.user.as_str(), cli.project.as_str())
    } else {
        RequestContext::new(cli.user.as_str(), cli.project.as_str())
    };
    info!(request_id = %ctx.request_id, project_id = %ctx.project_id, "volume-transfer starting");

    match cli.command {
        Command::InitDb => {
            let url = config.require_postgres_url(&cli.env)?;
            let db = Database::connect(url).await?;
            init_schema(db.pool()).await?;
            Ok(())
        }
        Command::VolumeCreate {
            size,
            name,
            type_id,
            type_name,
        } => {
            let services = connect(&config, &cli.env).await?;
            let mut volume = VolumeRecord::new(ctx.project_id.as_str(), ctx.user_id.as_str(), size);
            if let Some(name) = name {
                volume = volume.with_display_name(name);
            }
            let mut quota_type = None;
            if let Some(type_id) = type_id {
                if let Some(type_name) = type_name {
                    services
                        .volumes
                        .upsert_volume_type(&VolumeType {
                            id: type_id.clone(),
                            name: type_name,
                            extra_specs: BTreeMap::new(),
                        })
                        .await?;
                }
                quota_type = services
                    .volumes
                    .load_volume_type(&type_id)
                    .await?
                    .map(|t| t.name);
                volume = volume.with_volume_type(type_id);
            }

            let reservation = services
                .quotas
                .reserve(&ctx.project_id, &QuotaDeltas::for_volume(size, quota_type.as_deref()))
                .await?;
            if let Err(e) = services.volumes.create(&volume).await {
                services.quotas.rollback(&reservation).await?;
                return Err(e.into());
            }
            services.quotas.commit(&reservation).await?;
            print_json(&volume)
        }
        Command::VolumeShow { volume_id, fields } => {
            let services = connect(&config, &cli.env).await?;
            let record = services
                .volumes
                .get(volume_id)
                .await?
                .filter(|v| ctx.can_see_project(&v.project_id))
                .ok_or_else(|| anyhow!("volume {} not found", volume_id))?;

            let mut lazy = LazyVolume::new(&ctx, record, services.volumes.clone());
            let mut out = serde_json::Map::new();
            out.insert("volume".into(), serde_json::to_value(lazy.record())?);
            for name in &fields {
                lazy.load(name).await?;
                let field: LazyField = name.parse()?;
                let value = match field {
                    LazyField::Metadata => serde_json::to_value(lazy.metadata().await?)?,
                    LazyField::AdminMetadata => serde_json::to_value(lazy.admin_metadata().await?)?,
                    LazyField::VolumeType => serde_json::to_value(lazy.volume_type().await?)?,
                };
                out.insert(field.to_string(), value);
            }
            print_json(&out)
        }
        Command::VolumeList => {
            let services = connect(&config, &cli.env).await?;
            print_json(&services.volumes.list_by_project(&ctx.project_id).await?)
        }
        Command::VolumeDestroy { volume_id } => {
            let services = connect(&config, &cli.env).await?;
            let destroyed = services.volumes.destroy(volume_id).await?;
            print_json(&json!({ "volume_id": volume_id, "destroyed": destroyed }))
        }
        Command::Create { volume_id, name } => {
            let services = connect(&config, &cli.env).await?;
            let created = services
                .manager
                .create(&ctx, volume_id, name.as_deref())
                .await?;
            print_json(&created)
        }
        Command::Accept {
            transfer_id,
            auth_key,
        } => {
            let services = connect(&config, &cli.env).await?;
            let accepted = services.manager.accept(&ctx, transfer_id, &auth_key).await?;
            print_json(&accepted)
        }
        Command::Show { transfer_id } => {
            let services = connect(&config, &cli.env).await?;
            print_json(&services.manager.get(&ctx, transfer_id).await?)
        }
        Command::List => {
            let services = connect(&config, &cli.env).await?;
            print_json(&services.manager.get_all(&ctx).await?)
        }
        Command::Delete { transfer_id } => {
            let services = connect(&config, &cli.env).await?;
            services.manager.delete(&ctx, transfer_id).await?;
            print_json(&json!({ "id": transfer_id, "deleted": true }))
        }
        Command::Reaper => {
            let services = connect(&config, &cli.env).await?;
            let reaper = ReservationReaper::new(
                services.quotas,
                ReaperConfig {
                    scan_interval: Duration::from_secs(config.reaper.scan_interval_secs),
                },
            );
            tokio::select! {
                _ = reaper.run() => Ok(()),
                _ = tokio::signal::ctrl_c() => {
                    info!("Reaper interrupted, shutting down");
                    Ok(())
                }
            }
        }
        Command::Demo => demo(&config).await,
    }
}

async fn demo(config: &AppConfig) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let quotas = Arc::new(InMemoryQuotaLedger::new(config.quota.clone()));
    let manager = TransferManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        quotas.clone(),
        Arc::new(TracingSink),
        hasher(config)?,
    );

    let owner = RequestContext::new("alice", "project-a");
    let recipient = RequestContext::new("bob", "project-b");

    let volume = VolumeRecord::new("project-a", "alice", 10).with_display_name("demo");
    VolumeStore::create(store.as_ref(), &volume).await?;
    let charge = quotas
        .reserve("project-a", &QuotaDeltas::for_volume(volume.size, None))
        .await?;
    quotas.commit(&charge).await?;

    let created = manager.create(&owner, volume.id, Some("demo transfer")).await?;
    let accepted = manager
        .accept(&recipient, created.id, &created.auth_key)
        .await?;
    let moved = VolumeStore::get(store.as_ref(), volume.id)
        .await?
        .ok_or_else(|| anyhow!("volume vanished"))?;

    print_json(&json!({
        "transfer": accepted,
        "volume": moved,
        "project_a_gigabytes": quotas.usage("project-a", "gigabytes").await?,
        "project_b_gigabytes": quotas.usage("project-b", "gigabytes").await?,
    }))
}
