//! The migration runner: discover, validate, compile, execute, record.
//!
//! One `up()` invocation applies every pending file that existed when the run
//! started and records them as a single batch; one `down()` invocation rolls
//! back exactly the most recent batch. Migrations are pipelined strictly one
//! at a time, each inside its own database transaction, and the ledger is
//! only touched after the database work has committed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::adapter::DbAdapter;
use crate::ast::Schema;
use crate::codegen::SqlGenerator;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerEntry, DEFAULT_LEDGER_FILE};
use crate::lock::LockOptions;
use crate::{lexer, parser, validate};

/// Migration files carry this extension.
pub const MIGRATION_EXTENSION: &str = "sigl";

const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_TOTAL_SIZE: u64 = 50 * 1024 * 1024;
const PING_ATTEMPTS: u32 = 3;
const PING_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Receiver for per-migration measurements.
pub trait MetricsSink: Send + Sync {
    fn migration_applied(&self, _filename: &str, _statements: usize, _elapsed: Duration) {}
    fn migration_rolled_back(&self, _filename: &str, _statements: usize, _elapsed: Duration) {}
}

/// The explicit options record. Every recognized knob is a field; there is
/// nothing dynamic to misspell.
pub struct EngineOptions {
    pub migrations_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Per-file byte cap checked before reading.
    pub max_file_size: u64,
    /// Aggregate byte cap for one run.
    pub max_total_size: u64,
    /// Explicit opt-out for the size caps.
    pub enable_file_size_validation: bool,
    pub lock_timeout_ms: u64,
    pub lock_retry_delay_ms: u64,
    /// Emit tracing events while running.
    pub logging: bool,
    pub metrics_sink: Option<Box<dyn MetricsSink>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            migrations_path: PathBuf::from("migrations"),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_FILE),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            enable_file_size_validation: true,
            lock_timeout_ms: 30_000,
            lock_retry_delay_ms: 100,
            logging: true,
            metrics_sink: None,
        }
    }
}

/// One migration applied by [`Engine::up`].
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub filename: String,
    pub statements: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct UpOutcome {
    pub applied: Vec<AppliedMigration>,
    pub batch: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DownOutcome {
    pub rolled_back: Vec<String>,
    pub batch: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Status {
    pub applied: Vec<LedgerEntry>,
    pub pending: Vec<String>,
    pub current_batch: u32,
}

pub struct Engine {
    adapter: Box<dyn DbAdapter>,
    generator: Box<dyn SqlGenerator>,
    options: EngineOptions,
    ledger: Ledger,
}

impl Engine {
    pub fn new(
        adapter: Box<dyn DbAdapter>,
        generator: Box<dyn SqlGenerator>,
        options: EngineOptions,
    ) -> Self {
        let ledger = Ledger::with_lock_options(
            options.ledger_path.clone(),
            LockOptions {
                acquire_timeout_ms: options.lock_timeout_ms,
                retry_delay_ms: options.lock_retry_delay_ms,
                ..LockOptions::default()
            },
        );
        Engine {
            adapter,
            generator,
            options,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply every pending migration as one batch.
    pub async fn up(&self) -> Result<UpOutcome> {
        let state = self.ledger.load()?;
        let discovered = self.discover()?;
        if self.options.enable_file_size_validation {
            let sizes = self.file_sizes(&discovered)?;
            validate::check_file_sizes(
                &sizes,
                self.options.max_file_size,
                self.options.max_total_size,
            )?;
        }
        let files = self.read_files(&discovered)?;
        state.validate_integrity(&files)?;

        let pending = state.pending(&discovered);
        if pending.is_empty() {
            if self.options.logging {
                tracing::info!("no pending migrations");
            }
            return Ok(UpOutcome {
                applied: Vec::new(),
                batch: state.current_batch,
            });
        }

        self.verify_ledger_writable()?;
        self.ping_with_retries().await?;

        // Compile everything up front so a parse or generator error in any
        // pending file aborts the run before a single statement executes.
        let mut plans = Vec::with_capacity(pending.len());
        for filename in &pending {
            let schema = self.parse_migration(filename, &files[filename])?;
            plans.push((filename.clone(), self.generator.generate_up(&schema)?));
        }

        let mut applied = Vec::new();
        for (index, (filename, statements)) in plans.iter().enumerate() {
            if self.options.logging {
                tracing::info!(migration = %filename, statements = statements.len(), "applying");
            }
            let started = Instant::now();
            if let Err(e) = self.adapter.transaction(statements).await {
                if index == 0 {
                    return Err(e);
                }
                let committed: Vec<&str> =
                    applied.iter().map(|a: &AppliedMigration| a.filename.as_str()).collect();
                return Err(Error::CriticalInconsistency(format!(
                    "{} failed after [{}] had already been committed in this run; the committed migrations are NOT recorded in the ledger: {}",
                    filename,
                    committed.join(", "),
                    e
                )));
            }
            let elapsed = started.elapsed();
            if self.options.logging {
                tracing::info!(
                    migration = %filename,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "applied"
                );
            }
            if let Some(sink) = &self.options.metrics_sink {
                sink.migration_applied(filename, statements.len(), elapsed);
            }
            applied.push(AppliedMigration {
                filename: filename.clone(),
                statements: statements.len(),
                elapsed,
            });
        }

        let batch_files: Vec<(String, Vec<u8>)> = pending
            .iter()
            .map(|name| (name.clone(), files[name].clone()))
            .collect();
        match self.ledger.record_batch(&batch_files) {
            Ok(state) => Ok(UpOutcome {
                applied,
                batch: state.current_batch,
            }),
            Err(e) => Err(Error::CriticalInconsistency(format!(
                "all {} migrations committed but the ledger could not be updated: {}",
                applied.len(),
                e
            ))),
        }
    }

    /// Roll back the most recent batch, newest file first.
    pub async fn down(&self) -> Result<DownOutcome> {
        let state = self.ledger.load()?;
        if state.current_batch == 0 {
            if self.options.logging {
                tracing::info!("nothing to roll back");
            }
            return Ok(DownOutcome::default());
        }

        self.verify_ledger_writable()?;
        self.ping_with_retries().await?;

        let entries = state.last_batch_entries();
        let mut plans = Vec::with_capacity(entries.len());
        for entry in &entries {
            let path = self.options.migrations_path.join(&entry.filename);
            let bytes = std::fs::read(&path).map_err(|e| {
                Error::Integrity(format!(
                    "cannot roll back {}: the original migration file is required but unreadable: {}",
                    entry.filename, e
                ))
            })?;
            let schema = self.parse_migration(&entry.filename, &bytes)?;
            plans.push((entry.filename.clone(), self.generator.generate_down(&schema)?));
        }

        let mut rolled_back: Vec<String> = Vec::new();
        for (index, (filename, statements)) in plans.iter().enumerate() {
            if self.options.logging {
                tracing::info!(migration = %filename, "rolling back");
            }
            let started = Instant::now();
            if let Err(e) = self.adapter.transaction(statements).await {
                if index == 0 {
                    return Err(e);
                }
                return Err(Error::CriticalInconsistency(format!(
                    "rollback of {} failed after [{}] had already been reverted; the ledger still records them: {}",
                    filename,
                    rolled_back.join(", "),
                    e
                )));
            }
            let elapsed = started.elapsed();
            if let Some(sink) = &self.options.metrics_sink {
                sink.migration_rolled_back(filename, statements.len(), elapsed);
            }
            rolled_back.push(filename.clone());
        }

        let batch = state.current_batch;
        match self.ledger.rollback_last_batch() {
            Ok(_) => Ok(DownOutcome { rolled_back, batch }),
            Err(e) => Err(Error::CriticalInconsistency(format!(
                "batch {} was reverted in the database but the ledger could not be updated: {}",
                batch, e
            ))),
        }
    }

    /// Report applied and pending migrations. Mutates nothing, takes no lock.
    pub fn status(&self) -> Result<Status> {
        let state = self.ledger.load()?;
        let discovered = self.discover()?;
        let pending = state.pending(&discovered);
        Ok(Status {
            applied: state.migrations,
            pending,
            current_batch: state.current_batch,
        })
    }

    /// Filenames with the migration extension, sorted lexicographically. The
    /// timestamp prefix convention makes that chronological order.
    fn discover(&self) -> Result<Vec<String>> {
        let dir = &self.options.migrations_path;
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Validation(format!(
                "cannot read migrations directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::Validation(format!(
                    "cannot read migrations directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MIGRATION_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_sizes(&self, names: &[String]) -> Result<Vec<(String, u64)>> {
        names
            .iter()
            .map(|name| {
                let path = self.options.migrations_path.join(name);
                let meta = std::fs::metadata(&path).map_err(|e| {
                    Error::Validation(format!("cannot stat migration {}: {}", name, e))
                })?;
                Ok((name.clone(), meta.len()))
            })
            .collect()
    }

    fn read_files(&self, names: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut files = HashMap::new();
        for name in names {
            let path = self.options.migrations_path.join(name);
            let bytes = std::fs::read(&path).map_err(|e| {
                Error::Validation(format!("cannot read migration {}: {}", name, e))
            })?;
            files.insert(name.clone(), bytes);
        }
        Ok(files)
    }

    fn parse_migration(&self, filename: &str, bytes: &[u8]) -> Result<Schema> {
        let source = std::str::from_utf8(bytes).map_err(|_| {
            Error::Validation(format!("migration {} is not valid UTF-8", filename))
        })?;
        let locate = |e: Error| match e {
            Error::Parse {
                message,
                line,
                column,
            } => Error::Parse {
                message: format!("{}: {}", filename, message),
                line,
                column,
            },
            other => other,
        };
        let tokens = lexer::tokenize(source).map_err(locate)?;
        parser::parse(tokens).map_err(locate)
    }

    /// Prove the ledger can be written before any transaction commits, using
    /// the same temp path atomic persistence will use.
    fn verify_ledger_writable(&self) -> Result<()> {
        let temp = self.ledger.temp_path();
        std::fs::write(&temp, b"").map_err(|e| {
            Error::Validation(format!(
                "ledger {} is not writable: {}",
                self.ledger.path().display(),
                e
            ))
        })?;
        let _ = std::fs::remove_file(&temp);
        Ok(())
    }

    async fn ping_with_retries(&self) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=PING_ATTEMPTS {
            match self.adapter.ping().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if self.options.logging {
                        tracing::warn!(attempt, error = %e, "database probe failed");
                    }
                    last_error = Some(e);
                    if attempt < PING_ATTEMPTS {
                        tokio::time::sleep(PING_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Adapter("database unreachable".into())))
    }
}
