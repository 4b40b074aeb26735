#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use clap::Parser;
use mirrorkit_core::types::ModificationData;
use mirrorkit_core::{run_blocking, GitSupport, PluginConfig, SubmodulePolicy, Transport, VcsRoot};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mirrorkit", version, about = "Local mirror cache for remote git repositories")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GlobalArgs {
    /// YAML settings file
    #[arg(long, env = "MIRRORKIT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Root directory of all mirrors (overrides the settings file)
    #[arg(long, env = "MIRRORKIT_MIRRORS_DIR", global = true)]
    mirrors_dir: Option<PathBuf>,

    /// Fetch transport: native or embedded
    #[arg(long, env = "MIRRORKIT_TRANSPORT", global = true)]
    transport: Option<Transport>,

    /// Overall time limit in seconds
    #[arg(long, env = "MIRRORKIT_TIMEOUT", global = true)]
    timeout: Option<u64>,

    /// Output format
    #[arg(
        long,
        env = "MIRRORKIT_OUTPUT_FORMAT",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text
    )]
    output_format: OutputFormat,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(clap::Args, Clone)]
struct RootArgs {
    /// Fetch URL of the repository
    #[arg(long, env = "MIRRORKIT_URL")]
    url: String,

    /// Branch tracked by the root
    #[arg(long, env = "MIRRORKIT_BRANCH", default_value = "master")]
    branch: String,

    /// Submodule policy: ignore, checkout, non-recursive-checkout, ...
    #[arg(long, env = "MIRRORKIT_SUBMODULES", default_value = "ignore")]
    submodules: SubmodulePolicy,

    /// Convert LF to CRLF in returned content
    #[arg(long, env = "MIRRORKIT_AUTO_CRLF")]
    auto_crlf: bool,

    /// Custom repository directory
    #[arg(long)]
    path: Option<PathBuf>,
}

impl RootArgs {
    fn to_root(&self) -> VcsRoot {
        let mut root = VcsRoot::new(self.url.clone(), self.url.clone())
            .with_branch(self.branch.clone())
            .with_submodule_policy(self.submodules)
            .with_auto_crlf(self.auto_crlf);
        if let Some(path) = &self.path {
            root = root.with_path(path.clone());
        }
        root
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the mirror directory used for a repository
    MirrorDir(RootArgs),

    /// Make a commit available in the mirror
    Sync {
        #[command(flatten)]
        root: RootArgs,
        /// Commit id, optionally `sha@timestamp`
        version: String,
    },

    /// Print per-commit changes reachable from a commit
    Changes {
        #[command(flatten)]
        root: RootArgs,
        /// Newest commit of the walk
        to: String,
        /// Exclude this commit and its ancestors
        #[arg(long)]
        from: Option<String>,
        /// Stop after this many commits
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write file content at a commit to stdout
    Content {
        #[command(flatten)]
        root: RootArgs,
        /// Path inside the repository
        path: String,
        /// Commit id
        version: String,
    },

    /// Fetch one commit with depth 1 into a working repository
    ShallowFetch {
        #[command(flatten)]
        root: RootArgs,
        /// Target repository, created when absent
        target: PathBuf,
        /// Commit id
        version: String,
    },
}

/// Output format for the CLI
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    /// JSON to stdout
    Json,
    /// Human-readable text to stdout
    Text,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose, cli.global.quiet);
    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirrorkit={level},mirrorkit_core={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_config(global: &GlobalArgs) -> anyhow::Result<PluginConfig> {
    let mut config = match &global.config {
        Some(path) => PluginConfig::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => PluginConfig::default(),
    };
    if let Some(dir) = &global.mirrors_dir {
        config.mirrors_dir = dir.clone();
    }
    if let Some(transport) = global.transport {
        config.transport = transport;
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.global)?;
    let format = cli.global.output_format;
    let timeout = cli.global.timeout.map(Duration::from_secs);
    let support = Arc::new(GitSupport::new(config));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    let result = rt.block_on(dispatch(Arc::clone(&support), cli.command, format, timeout));
    // A timed-out command may still be running on the blocking pool
    rt.shutdown_background();
    support.shutdown();
    result
}

async fn dispatch(
    support: Arc<GitSupport>,
    command: Commands,
    format: OutputFormat,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    match command {
        Commands::MirrorDir(args) => {
            let dir = support.repository_dir(&args.to_root());
            match format {
                OutputFormat::Json => write_json(&serde_json::json!({ "dir": dir })),
                OutputFormat::Text => write_line(&dir.display().to_string()),
            }
        }
        Commands::Sync { root, version } => {
            let root = root.to_root();
            let commit = run_blocking("sync", timeout, move || support.sync(&root, &version)).await?;
            match format {
                OutputFormat::Json => write_json(&serde_json::json!({ "commit": commit.to_string() })),
                OutputFormat::Text => write_line(&commit.to_string()),
            }
        }
        Commands::Changes {
            root,
            to,
            from,
            limit,
        } => {
            let root = root.to_root();
            let batches = run_blocking("changes", timeout, move || {
                support.collect_changes(&root, &to, from.as_deref(), limit)
            })
            .await?;
            match format {
                OutputFormat::Json => write_json(&batches),
                OutputFormat::Text => write_changes_text(&batches),
            }
        }
        Commands::Content {
            root,
            path,
            version,
        } => {
            let root = root.to_root();
            let bytes = run_blocking("content", timeout, move || {
                support.get_content(&root, &path, &version)
            })
            .await?;
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            w.write_all(&bytes)?;
            w.flush()?;
            Ok(())
        }
        Commands::ShallowFetch {
            root,
            target,
            version,
        } => {
            let root = root.to_root();
            let shown = target.display().to_string();
            let commit = run_blocking("shallow fetch", timeout, move || {
                support.shallow_fetch(&root, &target, &version)
            })
            .await?;
            match format {
                OutputFormat::Json => write_json(&serde_json::json!({
                    "commit": commit.to_string(),
                    "target": shown,
                })),
                OutputFormat::Text => write_line(&format!("{commit} -> {shown}")),
            }
        }
    }
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut w = stdout.lock();
    serde_json::to_writer_pretty(&mut w, value)?;
    writeln!(w)?;
    Ok(())
}

fn write_line(line: &str) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut w = stdout.lock();
    writeln!(w, "{line}")?;
    Ok(())
}

fn write_changes_text(batches: &[ModificationData]) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut w = stdout.lock();
    for batch in batches {
        writeln!(
            w,
            "{} {} <{}> {}",
            batch.version,
            batch.author,
            batch.email,
            batch.time.to_rfc3339()
        )?;
        writeln!(w, "    {}", batch.message.lines().next().unwrap_or_default())?;
        for change in &batch.changes {
            let fixup = change
                .fixup
                .as_ref()
                .map(|f| format!(" (submodule {} via {})", f.submodule_path, f.commit))
                .unwrap_or_default();
            writeln!(w, "  {:<12} {}{}", change.change_type.as_str(), change.path, fixup)?;
        }
    }
    Ok(())
}
