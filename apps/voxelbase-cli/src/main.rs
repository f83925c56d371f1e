mod config;
mod host;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use config::{FileConfig, Overrides, Settings};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use voxelbase_author::{RevertError, RevertSummary, Session};
use voxelbase_common::{CellPos, CellState, short_id};
use voxelbase_kernel::{CellReader, VoxelWorld};
use voxelbase_sync::{HttpRemote, RemoteConfig, RemoteTarget, create_remote_repository, push_all};
use voxelbase_tools::{DiffView, StatusInspector, ViewMode};

#[derive(Parser)]
#[command(name = "voxelbase", about = "Version control for voxel worlds", version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Session root holding `world.json` and `.vcsdata/`
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Backend API base URL (overrides the configured remote)
    #[arg(long, env = "VOXELBASE_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "VOXELBASE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository (no-op if it exists)
    Init {
        /// Repository name
        #[arg(long)]
        name: Option<String>,
    },
    /// Place a cell in the simulated world
    Place {
        #[command(flatten)]
        at: Position,
        /// Cell type, e.g. minecraft:stone
        type_id: String,
        /// Cell property as key=value (repeatable)
        #[arg(short, long = "prop", value_parser = parse_property)]
        props: Vec<(String, String)>,
    },
    /// Break a cell in the simulated world
    Break {
        #[command(flatten)]
        at: Position,
    },
    /// Stage every tracked change
    Add,
    /// Commit the staged changes
    Commit {
        message: String,
        #[arg(long)]
        author: Option<String>,
    },
    /// Show recent commits, newest first
    Log {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Show tracked and staged changes
    Status,
    /// Roll the world back to a commit, deleting newer commits
    Reset {
        #[arg(long)]
        hard: bool,
        /// Commit id or unique prefix
        commit: String,
    },
    /// Push local commits to the remote
    Push,
    /// Diff view against recent history
    Diff {
        #[command(subcommand)]
        action: DiffAction,
    },
    /// Configure the remote
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
}

#[derive(Args, Clone, Copy)]
struct Position {
    #[arg(allow_negative_numbers = true)]
    x: i32,
    #[arg(allow_negative_numbers = true)]
    y: i32,
    #[arg(allow_negative_numbers = true)]
    z: i32,
}

impl From<Position> for CellPos {
    fn from(p: Position) -> Self {
        CellPos::new(p.x, p.y, p.z)
    }
}

#[derive(Subcommand)]
enum DiffAction {
    /// Enter the diff view, or advance DIFF -> CURRENT -> PREVIOUS -> DIFF
    Enter {
        /// Anchor position used when entering from OFF
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
        at: Option<Vec<i32>>,
    },
    /// Leave the diff view
    Clear,
}

#[derive(Subcommand)]
enum RemoteAction {
    /// Set the remote, e.g. `remote add origin https://host/api/repos/<id>`
    Add { name: String, url: String },
    /// Print the configured remote
    Show,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = cli.root.clone();
    let settings = Settings::resolve(
        FileConfig::load(&root)?,
        Overrides {
            api_url: cli.api_url.clone(),
            api_key: cli.api_key.clone(),
            ..Overrides::default()
        },
    );
    let session = Session::resume(&root).context("cannot load working set")?;
    let mut world = host::load_world(&root)?;

    let result = run(cli.command, &root, &settings, &session, &mut world);
    session.save_working_set()?;
    result
}

fn run(
    command: Commands,
    root: &Path,
    settings: &Settings,
    session: &Session,
    world: &mut VoxelWorld,
) -> anyhow::Result<()> {
    match command {
        Commands::Init { name } => {
            let existed = session.store().load().is_some();
            let repo = session.init(name.as_deref(), now_millis())?;
            if existed {
                println!("Repository already initialized: {} ({})", repo.name, repo.id);
            } else {
                println!("Initialized repository {} ({})", repo.name, repo.id);
                println!("Data directory: {}", session.store().data_dir().display());
            }
        }
        Commands::Place { at, type_id, props } => {
            let state = props
                .into_iter()
                .fold(CellState::new(type_id), |s, (k, v)| s.with_property(k, v));
            let pos = CellPos::from(at);
            let previous = world.place(pos, state.clone())?;
            world.step();
            session.capture(world.drain_events());
            host::save_world(root, world)?;
            match previous {
                Some(old) => println!("{pos}: {old} -> {state}"),
                None => println!("{pos}: placed {state}"),
            }
        }
        Commands::Break { at } => {
            let pos = CellPos::from(at);
            let previous = world.break_cell(pos)?;
            world.step();
            session.capture(world.drain_events());
            host::save_world(root, world)?;
            match previous {
                Some(old) => println!("{pos}: broke {old}"),
                None => println!("{pos}: already empty"),
            }
        }
        Commands::Add => {
            let staged = session.stage()?;
            if staged == 0 {
                println!("No changes to stage.");
            } else {
                println!("Staged {staged} change(s). Use `status` to review.");
            }
        }
        Commands::Commit { message, author } => {
            let author = author.unwrap_or_else(|| settings.author.clone());
            let commit = session.commit(&message, &author, now_millis())?;
            println!(
                "[{}] {} ({} change(s))",
                commit.short_id(),
                commit.message(),
                commit.changes().len()
            );
        }
        Commands::Log { limit } => {
            let commits = session.log(limit)?;
            if commits.is_empty() {
                println!("No commits yet.");
            }
            for commit in commits {
                println!(
                    "commit {} | {} | {}",
                    commit.short_id(),
                    commit.author(),
                    commit.message()
                );
            }
        }
        Commands::Status => {
            println!("{}", StatusInspector::report(session));
        }
        Commands::Reset { hard, commit } => {
            if !hard {
                bail!("only `reset --hard <commit>` is supported");
            }
            session.repository()?;
            let tracked = session.change_log().count();
            let staged = session.staging().count();
            match session.reset_hard(world, &commit) {
                Ok(summary) => {
                    host::save_world(root, world)?;
                    if let Some(notice) = discarded_notice(tracked, staged, &summary) {
                        tracing::warn!(tracked, staged, "hard reset discarded uncommitted work");
                        println!("{notice}");
                    }
                    for failure in &summary.prune_errors {
                        eprintln!("warning: {failure}");
                    }
                    if summary.already_at_target() {
                        println!("Already at commit {}.", short_id(&summary.target));
                    } else {
                        println!(
                            "HEAD is now at {}; reverted {} commit(s), {} change(s).",
                            short_id(&summary.target),
                            summary.reverted.len(),
                            summary.records_applied
                        );
                    }
                }
                Err(RevertError::PartialApply(partial)) => {
                    host::save_world(root, world)?;
                    for failure in &partial.prune_errors {
                        eprintln!("warning: {failure}");
                    }
                    bail!(
                        "reset stopped at {}: {} change(s) undone, {} left; {} newer commit(s) pruned; {} older commit(s) kept ({})",
                        short_id(&partial.failed_commit),
                        partial.applied_in_failed,
                        partial.remaining_in_failed,
                        partial.fully_applied.len(),
                        partial.untouched.len(),
                        partial.error
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Push => {
            let repo = session.repository()?;
            let Some(base) = settings.api_url.clone().or_else(|| repo.remote_url.clone()) else {
                bail!("no remote set; use `remote add origin <url>`");
            };
            let client = HttpRemote::new(
                RemoteConfig::new(&base).with_api_key(settings.api_key.clone()),
            )?;
            let report = push_all(session.store(), &repo, &client)?;
            if report.pushed_count() == 0 && report.is_clean() {
                println!("No commits to push.");
                return Ok(());
            }
            println!("{report}");
            if !report.is_clean() {
                bail!("{} commit(s) failed to push", report.failed_count());
            }
        }
        Commands::Diff { action } => diff(action, root, settings, session, world)?,
        Commands::Remote { action } => remote(action, settings, session)?,
    }
    Ok(())
}

/// Warning for uncommitted work a completed reset threw away. A reset that
/// stays at HEAD leaves the working set alone.
fn discarded_notice(tracked: usize, staged: usize, summary: &RevertSummary) -> Option<String> {
    if summary.already_at_target() || (tracked == 0 && staged == 0) {
        return None;
    }
    Some(format!("Warning: discarded {tracked} tracked and {staged} staged change(s)."))
}

fn diff(
    action: DiffAction,
    root: &Path,
    settings: &Settings,
    session: &Session,
    world: &VoxelWorld,
) -> anyhow::Result<()> {
    match action {
        DiffAction::Clear => {
            host::clear_view(root)?;
            println!("Diff view cleared.");
        }
        DiffAction::Enter { at } => {
            let anchor = match at.as_deref() {
                Some(&[x, y, z]) => CellPos::new(x, y, z),
                _ => CellPos::new(0, 64, 0),
            };
            let state = host::load_view(root)?;
            let mut view = DiffView::resume(state, settings.diff_radius);
            let mode = view.cycle(session.store(), world, anchor);
            host::save_view(root, &view.state())?;
            print_view(&view, world, mode);
        }
    }
    Ok(())
}

fn print_view(view: &DiffView, world: &VoxelWorld, mode: ViewMode) {
    let anchor = view.anchor().map(|a| a.to_string()).unwrap_or_default();
    println!("Diff view: {mode} (anchor {anchor}, radius {})", view.radius());
    match mode {
        ViewMode::Off => {}
        ViewMode::Diff => {
            println!(
                "+{} added, -{} removed, ~{} modified",
                view.added().len(),
                view.removed().len(),
                view.modified().len()
            );
            for pos in view.added() {
                println!("  + {pos}");
            }
            for pos in view.removed() {
                println!("  - {pos}");
            }
            for pos in view.modified() {
                println!("  ~ {pos}");
            }
        }
        ViewMode::Current => {
            for pos in view.previous_states().keys() {
                match world.read_cell(*pos) {
                    Some(state) => println!("  {pos}: {state}"),
                    None => println!("  {pos}: (empty)"),
                }
            }
        }
        ViewMode::Previous => {
            for (pos, state) in view.previous_states() {
                match state {
                    Some(state) => println!("  {pos}: {state}"),
                    None => println!("  {pos}: (empty)"),
                }
            }
        }
    }
}

fn remote(action: RemoteAction, settings: &Settings, session: &Session) -> anyhow::Result<()> {
    let repo = session.repository()?;
    match action {
        RemoteAction::Show => match &repo.remote_url {
            Some(url) => {
                println!("origin: {url}");
                if let Some(id) = &repo.remote_repo_id {
                    println!("remote repository: {id}");
                }
            }
            None => println!("No remote set. Use `remote add origin <url>`."),
        },
        RemoteAction::Add { name, url } => {
            if name != "origin" {
                bail!("only the `origin` remote is supported");
            }
            let target = RemoteTarget::parse(&url)?;
            let updated = repo.with_remote(target.base_url.clone(), target.repo_id.clone());
            session.store().save_repository(&updated)?;
            println!("Remote origin set to {}", target.base_url);

            let created = HttpRemote::new(
                RemoteConfig::new(&target.base_url).with_api_key(settings.api_key.clone()),
            )
            .and_then(|client| create_remote_repository(&client, &updated));
            match created {
                Ok(()) => println!("Repository {} created on the backend.", updated.push_target_id()),
                Err(e) => {
                    tracing::warn!(error = %e, "backend repository creation failed");
                    println!("Remote saved locally; backend create failed: {e}");
                }
            }
        }
    }
    Ok(())
}
