use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use schemact::{
    engine::{Engine, EngineOptions},
    generator_for, infer_dialect_from_url,
    introspect::pull_schema,
    validate::{resolve_in_migrations_dir, validate_migration_name},
    Dialect, Ledger, SqlxAdapter, DEFAULT_LEDGER_FILE, MIGRATION_EXTENSION,
};
use std::fs;
use std::path::Path;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnArgs {
    /// Database URL; defaults to the DATABASE_URL environment variable
    #[arg(long)]
    url: Option<String>,
    /// Target database: postgres, mysql, or sqlite; inferred from the URL if omitted
    #[arg(long)]
    database: Option<String>,
}

#[derive(Args)]
struct PathArgs {
    /// Migrations directory
    #[arg(long, default_value = "migrations")]
    dir: String,
    /// Ledger file path
    #[arg(long, default_value = DEFAULT_LEDGER_FILE)]
    ledger: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations directory
    Init {
        #[arg(long, default_value = "migrations")]
        dir: String,
    },
    /// Create a new timestamped migration file
    Create {
        /// Descriptive name for the migration
        name: String,
        #[arg(long, default_value = "migrations")]
        dir: String,
    },
    /// Apply all pending migrations as a single batch
    Up {
        #[command(flatten)]
        conn: ConnArgs,
        #[command(flatten)]
        paths: PathArgs,
        /// Skip the per-file and aggregate size caps
        #[arg(long)]
        no_size_check: bool,
        /// Total time to wait for the ledger lock, in milliseconds
        #[arg(long, default_value_t = 30_000)]
        lock_timeout_ms: u64,
    },
    /// Roll back the most recent batch
    Down {
        #[command(flatten)]
        conn: ConnArgs,
        #[command(flatten)]
        paths: PathArgs,
        #[arg(long, default_value_t = 30_000)]
        lock_timeout_ms: u64,
    },
    /// Show applied and pending migrations
    Status {
        #[command(flatten)]
        conn: ConnArgs,
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Reverse engineer a live database into DSL text
    Pull {
        /// Schema to read (PostgreSQL only; defaults to public)
        schema: Option<String>,
        #[command(flatten)]
        conn: ConnArgs,
        /// Write the DSL here instead of printing it
        #[arg(long)]
        out: Option<String>,
    },
    /// Remove the ledger lock left behind by a crashed run
    ForceUnlock {
        #[arg(long, default_value = DEFAULT_LEDGER_FILE)]
        ledger: String,
    },
}

fn resolve_connection(conn: &ConnArgs) -> Result<(String, Dialect)> {
    let url = conn
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not specified"))?;
    let dialect = match &conn.database {
        Some(name) => name.parse()?,
        None => infer_dialect_from_url(&url)
            .ok_or_else(|| anyhow::anyhow!("cannot infer database from URL; pass --database"))?,
    };
    Ok((url, dialect))
}

fn engine_options(paths: &PathArgs, no_size_check: bool, lock_timeout_ms: u64) -> EngineOptions {
    EngineOptions {
        migrations_path: paths.dir.clone().into(),
        ledger_path: paths.ledger.clone().into(),
        enable_file_size_validation: !no_size_check,
        lock_timeout_ms,
        ..EngineOptions::default()
    }
}

async fn build_engine(
    conn: &ConnArgs,
    paths: &PathArgs,
    no_size_check: bool,
    lock_timeout_ms: u64,
) -> Result<Engine> {
    let (url, dialect) = resolve_connection(conn)?;
    let adapter = SqlxAdapter::connect(&url).await?;
    Ok(Engine::new(
        Box::new(adapter),
        generator_for(dialect),
        engine_options(paths, no_size_check, lock_timeout_ms),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("schemact=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { dir } => {
            let path = Path::new(&dir);
            if path.exists() {
                println!("{} {} already exists", "Found:".yellow(), dir);
            } else {
                fs::create_dir_all(path)?;
                println!("{} {}", "Created:".green(), dir);
            }
            println!(
                "Add migrations with {} and apply them with {}",
                "schemact create <name>".cyan(),
                "schemact up".cyan()
            );
        }
        Commands::Create { name, dir } => {
            let name = validate_migration_name(&name)?;
            fs::create_dir_all(&dir)?;
            let ts = chrono::Utc::now().format("%Y%m%d%H%M%S");
            let filename = format!("{}_{}.{}", ts, name, MIGRATION_EXTENSION);
            let path = resolve_in_migrations_dir(Path::new(&dir), &filename)?;
            let template = format!(
                "# {}\n#\n# model Example {{\n#   id Serial @pk\n#   createdAt Timestamp @default(now)\n# }}\n",
                name
            );
            fs::write(&path, template)?;
            println!("{} {}", "Created migration:".green(), path.display());
        }
        Commands::Up {
            conn,
            paths,
            no_size_check,
            lock_timeout_ms,
        } => {
            let engine = build_engine(&conn, &paths, no_size_check, lock_timeout_ms).await?;
            let outcome = engine.up().await?;
            if outcome.applied.is_empty() {
                println!("{}", "Nothing to apply; schema is up to date.".green());
            } else {
                for applied in &outcome.applied {
                    println!(
                        "  {} {} ({} statements, {} ms)",
                        "✓".green(),
                        applied.filename,
                        applied.statements,
                        applied.elapsed.as_millis()
                    );
                }
                println!(
                    "{}",
                    format!(
                        "Applied {} migration(s) as batch {}",
                        outcome.applied.len(),
                        outcome.batch
                    )
                    .green()
                    .bold()
                );
            }
        }
        Commands::Down {
            conn,
            paths,
            lock_timeout_ms,
        } => {
            let engine = build_engine(&conn, &paths, false, lock_timeout_ms).await?;
            let outcome = engine.down().await?;
            if outcome.rolled_back.is_empty() {
                println!("{}", "Nothing to roll back.".yellow());
            } else {
                for filename in &outcome.rolled_back {
                    println!("  {} {}", "↩".yellow(), filename);
                }
                println!(
                    "{}",
                    format!(
                        "Rolled back batch {} ({} migration(s))",
                        outcome.batch,
                        outcome.rolled_back.len()
                    )
                    .green()
                    .bold()
                );
            }
        }
        Commands::Status { conn, paths } => {
            // Status never touches the database; the connection args are
            // accepted for symmetry with up/down.
            let _ = conn;
            let engine = Engine::new(
                Box::new(NullAdapter),
                generator_for(Dialect::Postgres),
                engine_options(&paths, false, 30_000),
            );
            let status = engine.status()?;
            println!("{}", "Migration status".cyan().bold());
            println!("  Current batch: {}", status.current_batch);
            for entry in &status.applied {
                println!(
                    "  {} {} (batch {}, {})",
                    "✓".green(),
                    entry.filename,
                    entry.batch,
                    entry.applied_at
                );
            }
            for name in &status.pending {
                println!("  {} {}", "○".yellow(), name);
            }
            if status.applied.is_empty() && status.pending.is_empty() {
                println!("  {}", "no migrations found".dimmed());
            }
        }
        Commands::Pull { schema, conn, out } => {
            let (url, dialect) = resolve_connection(&conn)?;
            let adapter = SqlxAdapter::connect(&url).await?;
            let dsl = pull_schema(&adapter, dialect, schema.as_deref()).await?;
            if let Some(path) = out {
                fs::write(&path, &dsl)?;
                println!("{} {}", "Wrote schema to".green(), path);
            } else {
                print!("{}", dsl);
            }
        }
        Commands::ForceUnlock { ledger } => {
            if Ledger::new(&ledger).force_unlock()? {
                println!("{}", "Removed ledger lock.".green());
            } else {
                println!("{}", "No lock present.".yellow());
            }
        }
    }
    Ok(())
}

/// Stand-in adapter for subcommands that never reach the database.
struct NullAdapter;

#[async_trait::async_trait]
impl schemact::DbAdapter for NullAdapter {
    async fn ping(&self) -> schemact::Result<()> {
        Err(schemact::Error::Adapter("no database configured".into()))
    }

    async fn query(&self, _sql: &str) -> schemact::Result<Vec<schemact::adapter::Row>> {
        Err(schemact::Error::Adapter("no database configured".into()))
    }

    async fn transaction(&self, _statements: &[String]) -> schemact::Result<()> {
        Err(schemact::Error::Adapter("no database configured".into()))
    }

    async fn disconnect(&self) {}
}
