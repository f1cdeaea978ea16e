//! lix CLI - Command-line interface for a lix repository.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lix_engine::ast::{col, lit, Select};
use lix_engine::{Lix, LixConfig, MergeOutcome, Session, StdFileSystem, VersionBase};

/// Setting that remembers the active version between invocations.
const ACTIVE_VERSION_SETTING: &str = "active_version_id";

/// lix - Change control for files and structured data
#[derive(Parser)]
#[command(name = "lix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (default: from config, or the platform data directory)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Config file (default: ~/.config/lix/config.toml or ./lix.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage versions
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// Commit the staged changes of the active version
    Commit {
        /// Commit description
        #[arg(short, long)]
        message: String,
    },

    /// Show the history of the active version
    Log {
        /// Maximum number of commits
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Point the active version back at a commit
    Restore {
        /// Commit id
        commit: String,
    },

    /// Manage files
    File {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Print the rows of a view as JSON
    Query {
        /// View name (state, file, <schema>, <schema>_history, ...)
        view: String,

        /// Version to read instead of the active one
        #[arg(long)]
        version: Option<String>,

        /// Equality filter, repeatable
        #[arg(short = 'w', long = "where", value_name = "COLUMN=VALUE")]
        filters: Vec<String>,

        /// Maximum number of rows
        #[arg(short = 'n', long)]
        limit: Option<u64>,
    },

    /// Write every file below a directory into the active version
    Sync {
        /// Directory to read
        dir: PathBuf,
    },

    /// Write every file of the active version below a directory
    Checkout {
        /// Directory to write
        dir: PathBuf,
    },

    /// Write a standalone copy of the database
    Export {
        /// Output file
        out: PathBuf,
    },

    /// Create the database from an exported copy
    Import {
        /// Exported file
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum VersionAction {
    /// List all versions
    List,

    /// Create a new version from the active one
    Create {
        /// Version name
        name: String,

        /// Start from another version instead of the active one
        #[arg(long, conflicts_with = "at")]
        from: Option<String>,

        /// Start from a commit instead of the active version
        #[arg(long)]
        at: Option<String>,

        /// Version to read through for untouched entities
        #[arg(long)]
        inherit: Option<String>,
    },

    /// Make a version the active one
    Switch {
        /// Version name or id
        name: String,
    },

    /// Delete a version
    Delete {
        /// Version name or id
        name: String,
    },

    /// Merge another version into the active one
    Merge {
        /// Version name or id
        source: String,
    },
}

#[derive(Subcommand)]
enum FileAction {
    /// List files of the active version
    List,

    /// Create or replace a file from a local file
    Put {
        /// Path inside the repository, e.g. /docs/readme.md
        path: String,

        /// Local file to read
        source: PathBuf,
    },

    /// Print a file, or write it to --out
    Get {
        /// Path inside the repository
        path: String,

        /// Local file to write
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a file
    Rm {
        /// Path inside the repository
        path: String,
    },
}

fn setup_logging(verbose: bool) {
    // RUST_LOG takes precedence over --verbose.
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> Result<LixConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => LixConfig::load(path)?,
        None => LixConfig::load_default()?,
    };
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => {
            init_database(config)?;
        }
        Commands::Import { input } => {
            import_database(&config.database.path, &input)?;
        }
        command => {
            let lix = open_lix(config)?;
            let mut session = restore_session(&lix).await?;
            run(&lix, &mut session, command).await?;
        }
    }

    Ok(())
}

async fn run(lix: &Lix, session: &mut Session, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Version { action } => version(lix, session, action).await?,
        Commands::Commit { message } => {
            let commit = lix.commit(session, &message).await?;
            println!(
                "Committed {} change(s) as {}",
                commit.change_ids.len(),
                commit.id
            );
        }
        Commands::Log { limit } => {
            for commit in lix.history(session).await?.into_iter().take(limit) {
                println!(
                    "{}  {}  {:<12}  {}",
                    &commit.id[..12.min(commit.id.len())],
                    commit.created_at,
                    commit.author,
                    commit.description
                );
            }
        }
        Commands::Restore { commit } => {
            lix.restore_change_set(session, &commit).await?;
            println!("Restored to {}", commit);
        }
        Commands::File { action } => file(lix, session, action).await?,
        Commands::Query {
            view,
            version,
            filters,
            limit,
        } => {
            let target = match version {
                Some(version) => lix.session_at(&version)?,
                None => lix.session_at(session.active_version_id())?,
            };
            query(lix, &target, &view, &filters, limit).await?;
        }
        Commands::Sync { dir } => {
            let count = lix.sync_from_fs(session, &StdFileSystem, &dir).await?;
            println!("Synced {} file(s) from {}", count, dir.display());
        }
        Commands::Checkout { dir } => {
            let count = lix.export_to_fs(session, &StdFileSystem, &dir).await?;
            println!("Wrote {} file(s) to {}", count, dir.display());
        }
        Commands::Export { out } => {
            fs::write(&out, lix.export()?)?;
            println!("Exported database to {}", out.display());
        }
        Commands::Init | Commands::Import { .. } => {}
    }
    Ok(())
}

fn init_database(config: LixConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Create parent directory if needed
    if let Some(parent) = config.database.path.parent() {
        fs::create_dir_all(parent)?;
    }

    let path = config.database.path.clone();
    let _lix = Lix::open_with_config(config)?;
    println!("Initialized repository at: {}", path.display());
    Ok(())
}

fn import_database(db_path: &Path, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if db_path.exists() {
        eprintln!("{} already exists; choose another path with -d.", db_path.display());
        std::process::exit(1);
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let bytes = fs::read(input)?;
    let _lix = Lix::import(&bytes, db_path)?;
    println!("Imported {} into {}", input.display(), db_path.display());
    Ok(())
}

fn open_lix(config: LixConfig) -> Result<Lix, Box<dyn std::error::Error>> {
    if !config.database.path.exists() {
        eprintln!("Repository does not exist. Run 'lix init' first, or specify a path with -d.");
        std::process::exit(1);
    }

    Ok(Lix::open_with_config(config)?)
}

/// Session on the version the previous invocation left active.
async fn restore_session(lix: &Lix) -> Result<Session, Box<dyn std::error::Error>> {
    let session = lix.session()?;
    let stored = lix
        .transaction(&session, |tx| tx.setting(ACTIVE_VERSION_SETTING))
        .await?;

    let Some(id) = stored else {
        return Ok(session);
    };
    match lix.session_at(&id) {
        Ok(restored) => Ok(restored),
        Err(e) => {
            warn!("Active version {} is gone ({}), using main", id, e);
            Ok(session)
        }
    }
}

async fn remember_active(lix: &Lix, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let id = session.active_version_id().to_string();
    lix.transaction(session, |tx| tx.set_setting(ACTIVE_VERSION_SETTING, &id))
        .await?;
    Ok(())
}

async fn version(lix: &Lix, session: &mut Session, action: VersionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        VersionAction::List => {
            let active = session.active_version_id().to_string();
            for version in lix.list_versions(session).await? {
                let marker = if version.id == active { "*" } else { " " };
                let inherits = version
                    .inherits_from_version_id
                    .map(|p| format!("  (inherits {})", p))
                    .unwrap_or_default();
                println!("{} {:<16} {}{}", marker, version.name, version.id, inherits);
            }
        }
        VersionAction::Create {
            name,
            from,
            at,
            inherit,
        } => {
            let base = match (from, at) {
                (Some(version), _) => VersionBase::Version(version),
                (None, Some(commit)) => VersionBase::Commit(commit),
                (None, None) => VersionBase::Active,
            };
            let created = lix
                .create_version(session, base, inherit.as_deref(), Some(&name))
                .await?;
            println!("Created version {} ({}) at {}", created.name, created.id, created.commit_id);
        }
        VersionAction::Switch { name } => {
            let target = lix.switch_version(session, &name).await?;
            remember_active(lix, session).await?;
            println!("Switched to {}", target.name);
        }
        VersionAction::Delete { name } => {
            lix.delete_version(session, &name).await?;
            println!("Deleted version {}", name);
        }
        VersionAction::Merge { source } => match lix.merge_version(session, &source).await? {
            MergeOutcome::UpToDate => println!("Already up to date"),
            MergeOutcome::Merged(commit) => println!("Merged {} as {}", source, commit.id),
            MergeOutcome::Conflicts(conflicts) => {
                eprintln!("Merge stopped on {} conflict(s):", conflicts.len());
                for conflict in conflicts {
                    eprintln!(
                        "  {}  {} <> {}",
                        conflict.key, conflict.change_ids.0, conflict.change_ids.1
                    );
                }
                std::process::exit(1);
            }
        },
    }
    Ok(())
}

async fn file(lix: &Lix, session: &Session, action: FileAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        FileAction::List => {
            for descriptor in lix.list_files(session).await? {
                println!("{}  {}", descriptor.id, descriptor.path);
            }
        }
        FileAction::Put { path, source } => {
            let data = fs::read(&source)?;
            let descriptor = lix.write_file(session, &path, &data).await?;
            println!("Wrote {} ({} bytes)", descriptor.path, data.len());
        }
        FileAction::Get { path, out } => {
            let file = lix.read_file(session, &path).await?;
            match out {
                Some(out) => fs::write(out, &file.data)?,
                None => print!("{}", String::from_utf8_lossy(&file.data)),
            }
        }
        FileAction::Rm { path } => {
            lix.delete_file(session, &path).await?;
            println!("Deleted {}", path);
        }
    }
    Ok(())
}

fn parse_filter(filter: &str) -> Result<(&str, &str), Box<dyn std::error::Error>> {
    filter
        .split_once('=')
        .filter(|(column, _)| !column.is_empty())
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{}'", filter).into())
}

async fn query(
    lix: &Lix,
    session: &Session,
    view: &str,
    filters: &[String],
    limit: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut select = Select::star_from(view);
    for filter in filters {
        let (column, value) = parse_filter(filter)?;
        select = select.filter(col(column).eq(lit(value)));
    }
    if let Some(limit) = limit {
        select = select.limit(limit);
    }

    let result = lix.execute(session, select, &[]).await?;
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("id=t1").unwrap(), ("id", "t1"));
        assert_eq!(parse_filter("path=/a=b").unwrap(), ("path", "/a=b"));
        assert!(parse_filter("=x").is_err());
        assert!(parse_filter("nothing").is_err());
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::parse_from(["lix", "-d", "/tmp/x.lix", "version", "create", "feature", "--inherit", "main"]);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.lix")));
        match cli.command {
            Commands::Version {
                action: VersionAction::Create { name, inherit, .. },
            } => {
                assert_eq!(name, "feature");
                assert_eq!(inherit.as_deref(), Some("main"));
            }
            _ => panic!("unexpected command"),
        }
    }
}
