//! llmmerge: a Git merge driver that resolves conflicts with a language model.
//!
//! Git runs the driver once per conflicted file:
//!
//! ```text
//! [merge "llmmerge"]
//!     driver = llmmerge %O %A %B --path %P --marker-size %L
//! ```
//!
//! The exit status tells Git whether the file is merged (0) or still
//! conflicted (1). Configuration and I/O problems exit with 2 and an
//! interrupt with 130.

mod signals;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use llmmerge_core::config::{default_config_path, DriverSection, DEFAULT_CONFIG_TEMPLATE};
use llmmerge_core::errors::{ConfigError, ContentError, CoreError};
use llmmerge_core::input::DEFAULT_MARKER_SIZE;
use llmmerge_core::{BackendChain, DriverConfig, MergeInvocation, MergeResolver, ResolutionResult, SideLabels};

const EXIT_UNRESOLVED: u8 = 1;
const EXIT_ERROR: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Resolve a three-way merge conflict with a language model.
#[derive(Parser, Debug)]
#[command(
    name = "llmmerge",
    version,
    about = "Git merge driver that resolves conflicts with a language model",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, env = "LLMMERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Common ancestor version (%O).
    #[arg(required = true)]
    base: Option<PathBuf>,

    /// Current branch version (%A); the merge is written here by default.
    #[arg(required = true)]
    ours: Option<PathBuf>,

    /// Incoming branch version (%B).
    #[arg(required = true)]
    theirs: Option<PathBuf>,

    /// Write the merge here instead of OURS.
    output: Option<PathBuf>,

    /// Repository path of the file being merged (%P).
    #[arg(long, value_name = "NAME")]
    path: Option<String>,

    /// Conflict marker width (%L).
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MARKER_SIZE)]
    marker_size: usize,

    /// Label after `<<<<<<<` (%X).
    #[arg(long, default_value = "ours")]
    ours_label: String,

    /// Label after `>>>>>>>` (%Y).
    #[arg(long, default_value = "theirs")]
    theirs_label: String,

    /// Label after `|||||||` (%S).
    #[arg(long, default_value = "base")]
    base_label: String,

    /// Print the merge to stdout instead of writing it.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path (defaults to the per-user config location).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration and the backend credentials.
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Init { ref output }) => cmd_init(output.as_deref()).map(|()| 0),
        Some(Commands::Validate) => cmd_validate(cli.config.as_deref()).map(|()| 0),
        None => cmd_merge(&cli).await,
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Exit status for a failed run: the core error's own code if there is one.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return core.exit_code();
        }
        if cause.is::<ContentError>() {
            return EXIT_UNRESOLVED;
        }
        if cause.is::<ConfigError>() {
            return EXIT_ERROR;
        }
    }
    EXIT_ERROR
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the global subscriber. `LLMMERGE_LOG` overrides the configured
/// level. The returned guard flushes the file writer on drop.
fn init_logging(driver: &DriverSection) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env("LLMMERGE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&driver.log_level));

    let Some(ref log_file) = driver.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
        return Ok(None);
    };

    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid log_file: {}", log_file.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(Some(guard))
}

// ---------------------------------------------------------------------------
// Merge driver
// ---------------------------------------------------------------------------

fn invocation_from(cli: &Cli) -> Result<MergeInvocation> {
    let (Some(base), Some(ours), Some(theirs)) = (&cli.base, &cli.ours, &cli.theirs) else {
        anyhow::bail!("BASE, OURS and THEIRS are required");
    };

    let mut invocation = MergeInvocation::new(base, ours, theirs)
        .with_marker_size(cli.marker_size)
        .with_labels(SideLabels {
            base: cli.base_label.clone(),
            ours: cli.ours_label.clone(),
            theirs: cli.theirs_label.clone(),
        });
    if let Some(ref output) = cli.output {
        invocation = invocation.with_output(output);
    }
    if let Some(ref path) = cli.path {
        invocation = invocation.with_path_name(path);
    }
    Ok(invocation)
}

async fn cmd_merge(cli: &Cli) -> Result<u8> {
    let invocation = invocation_from(cli)?;
    if invocation.marker_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "--marker-size".into(),
            detail: "must be at least 1".into(),
        })
        .context("invalid arguments");
    }

    // Credentials are checked before any file is read or written.
    let config =
        DriverConfig::load_and_resolve(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_logging(&config.driver)?;

    let chain = BackendChain::from_config(&config).context("failed to set up completion backends")?;
    debug!(backends = ?chain.names(), "backend chain");
    let resolver = MergeResolver::new(config, chain).with_dry_run(cli.dry_run);
    let name = invocation.display_name();
    info!(file = %name, "merge driver started");

    let result = tokio::select! {
        result = resolver.resolve(&invocation) => {
            result.with_context(|| format!("failed to merge {}", name))?
        }
        signal = signals::wait_for_interrupt() => {
            eprintln!("{}", style::notice(&name, &format!("interrupted by {}, output left unchanged", signal)));
            return Ok(EXIT_INTERRUPTED);
        }
    };

    if cli.dry_run {
        if let Some(text) = result.merged_text() {
            print!("{}", text);
        }
    }
    if let ResolutionResult::Unresolved { ref reason, ref merged_with_markers } = result {
        let what = if merged_with_markers.is_some() && !cli.dry_run {
            "conflict markers written"
        } else {
            "output left unchanged"
        };
        eprintln!("{}", style::notice(&name, &format!("{} ({})", what, reason)));
    }
    Ok(result.exit_code())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: Option<&Path>) -> Result<()> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => default_config_path().context("cannot determine the user config directory")?,
    };

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&output, DEFAULT_CONFIG_TEMPLATE).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("{}", style::section("Next steps:"));
    println!("  1. Set OPENAI_API_KEY (or edit the [[backends]] entries)");
    println!("  2. Validate with: llmmerge validate --config {}", output.display());
    println!("  3. Register the driver:");
    println!("       git config --global merge.llmmerge.name \"LLM-assisted merge\"");
    println!("       git config --global merge.llmmerge.driver \"llmmerge %O %A %B --path %P --marker-size %L\"");
    println!("  4. Route files to it in .gitattributes, e.g. `*.py merge=llmmerge`");

    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    match config_path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) if config_path.is_some() || path.exists() => {
            println!("Validating configuration: {}", path.display());
        }
        _ => println!("Validating built-in default configuration"),
    }
    println!();

    let mut config = DriverConfig::discover(config_path).context("failed to parse configuration")?;
    println!("{}", style::check(true, "TOML structure is valid"));

    match config.validate() {
        Ok(()) => println!("{}", style::check(true, "All required fields are valid")),
        Err(e) => {
            println!("{}", style::check(false, &format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    let credentials = config.resolve_env_vars();
    match credentials {
        Ok(()) => println!("{}", style::check(true, "Environment variable references resolved")),
        Err(ref e) => println!("{}", style::check(false, &e.to_string())),
    }

    println!();
    println!("{}", style::section("Configuration summary:"));
    println!("  On unresolved : {:?}", config.driver.on_unresolved);
    println!("  Diff3 markers : {}", config.driver.diff3_markers);
    println!("  Concurrency   : {}", config.driver.max_concurrent_requests);
    println!(
        "  Prompt limits : {} context lines, {} bytes",
        config.prompt.context_lines, config.prompt.max_prompt_bytes
    );
    println!("{}", style::section("Backends (in order):"));
    for backend in &config.backends {
        let key = style::credential(backend.api_key_env.as_deref(), backend.api_key.is_some());
        println!(
            "  {:<12} {:?} {} at {} ({}s, {})",
            backend.name, backend.kind, backend.model, backend.api_url, backend.timeout_secs, key
        );
    }

    credentials.context("backend credentials are missing")?;
    println!();
    println!("{}", style::success("Configuration is valid"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_git_driver_arguments() {
        let cli = Cli::try_parse_from([
            "llmmerge",
            ".merge_file_a",
            ".merge_file_b",
            ".merge_file_c",
            "--path",
            "src/app.py",
            "--marker-size",
            "9",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert_eq!(cli.path.as_deref(), Some("src/app.py"));
        let invocation = invocation_from(&cli).unwrap();
        assert_eq!(invocation.base, PathBuf::from(".merge_file_a"));
        assert_eq!(invocation.output, PathBuf::from(".merge_file_b"));
        assert_eq!(invocation.marker_size, 9);
        assert_eq!(invocation.labels, SideLabels::default());
        assert_eq!(invocation.display_name(), "src/app.py");
    }

    #[test]
    fn test_explicit_output_and_labels() {
        let cli = Cli::try_parse_from([
            "llmmerge",
            "base",
            "ours",
            "theirs",
            "merged",
            "--ours-label",
            "HEAD",
            "--theirs-label",
            "feature",
            "--dry-run",
        ])
        .unwrap();

        assert!(cli.dry_run);
        let invocation = invocation_from(&cli).unwrap();
        assert_eq!(invocation.output, PathBuf::from("merged"));
        assert_eq!(invocation.labels.ours, "HEAD");
        assert_eq!(invocation.labels.theirs, "feature");
        assert_eq!(invocation.marker_size, DEFAULT_MARKER_SIZE);
    }

    #[test]
    fn test_subcommands_do_not_need_files() {
        let cli = Cli::try_parse_from(["llmmerge", "init", "--output", "/tmp/x.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { output: Some(_) })));

        let cli = Cli::try_parse_from(["llmmerge", "validate", "--config", "c.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Validate)));
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn test_missing_files_is_usage_error() {
        assert!(Cli::try_parse_from(["llmmerge", "base", "ours"]).is_err());
    }

    #[test]
    fn test_exit_codes_follow_core_errors() {
        let err = anyhow::Error::from(CoreError::from(ContentError::Binary {
            path: PathBuf::from("ours"),
        }))
        .context("failed to merge ours");
        assert_eq!(exit_code_for(&err), EXIT_UNRESOLVED);

        let err = anyhow::Error::from(ConfigError::ParseError("bad".into())).context("failed to load configuration");
        assert_eq!(exit_code_for(&err), EXIT_ERROR);

        assert_eq!(exit_code_for(&anyhow::anyhow!("something else")), EXIT_ERROR);
    }

    #[tokio::test]
    async fn test_missing_credential_stops_before_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            "[[backends]]\nname = \"primary\"\nmodel = \"m\"\napi_key_env = \"LLMMERGE_CLI_TEST_UNSET_KEY\"\n",
        )
        .unwrap();
        std::env::remove_var("LLMMERGE_CLI_TEST_UNSET_KEY");

        let write = |name: &str, text: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, text).unwrap();
            path.to_string_lossy().into_owned()
        };
        let base = write("base", "x\n");
        let ours = write("ours", "mine\n");
        let theirs = write("theirs", "yours\n");

        let cli = Cli::try_parse_from([
            "llmmerge",
            "--config",
            config.to_str().unwrap(),
            base.as_str(),
            ours.as_str(),
            theirs.as_str(),
        ])
        .unwrap();
        let err = cmd_merge(&cli).await.unwrap_err();

        assert_eq!(exit_code_for(&err), EXIT_ERROR);
        assert!(err.chain().any(|cause| matches!(
            cause.downcast_ref::<ConfigError>(),
            Some(ConfigError::EnvVarMissing { var, .. }) if var == "LLMMERGE_CLI_TEST_UNSET_KEY"
        )));
        assert_eq!(std::fs::read(&ours).unwrap(), b"mine\n");
        assert_eq!(
            std::fs::read_dir(dir.path()).unwrap().count(),
            4,
            "no temp or output files expected"
        );
    }

    #[test]
    fn test_init_writes_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        cmd_init(Some(&path)).unwrap();
        let config = DriverConfig::load_from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.backends.len(), 1);

        // A second run refuses to overwrite.
        assert!(cmd_init(Some(&path)).is_err());
    }
}
