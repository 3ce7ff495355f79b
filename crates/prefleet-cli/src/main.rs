//! prefleet CLI - release announcement and transfer control for cbftp.

mod output;

use clap::{Parser, Subcommand, ValueEnum};
use prefleet::{Config, ClientRegistry, JobTracker, Orchestrator, PreError, SiteConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "prefleet")]
#[command(about = "Release announcement and transfer control for cbftp instances")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Name of the cbftp instance to operate on
    #[arg(short, long)]
    instance: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Assume yes for interactive prompts
    #[arg(short = 'y', long)]
    yes: bool,

    /// Order releases are processed in
    #[arg(long, value_enum, default_value_t = SortOrder::Asc)]
    sort: SortOrder,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortOrder {
    Asc,
    Desc,
}

#[derive(Subcommand)]
enum Commands {
    /// Announce releases on site(s)
    Pre {
        /// Release name(s) to announce
        #[arg(short, long = "release")]
        releases: Vec<String>,

        /// Read additional release names from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,

        /// Site(s) to announce on
        #[arg(short, long = "site", required = true)]
        sites: Vec<String>,

        /// Cooldown in seconds between releases
        #[arg(long, default_value_t = 5.0)]
        cooldown: f64,
    },

    /// Upload releases to site(s)
    Upload {
        /// Release name(s) to upload
        #[arg(short, long = "release")]
        releases: Vec<String>,

        /// Read additional release names from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,

        /// Site(s) to upload to
        #[arg(short, long = "site", required = true)]
        sites: Vec<String>,

        /// Source directory on the remote service host
        #[arg(long)]
        src_path: Option<String>,

        /// Wait for the transfers to finish, showing progress
        #[arg(short, long)]
        wait: bool,

        /// Check release completeness afterwards
        #[arg(long)]
        check: bool,

        /// FXP the releases onward to these site(s) after upload
        #[arg(long = "fxp")]
        fxp: Vec<String>,
    },

    /// FXP releases between sites
    Fxp {
        /// Release name(s) to transfer
        #[arg(short, long = "release")]
        releases: Vec<String>,

        /// Read additional release names from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,

        /// Site to transfer from
        #[arg(short, long)]
        from: String,

        /// Site(s) to transfer to
        #[arg(short, long = "to", required = true)]
        to: Vec<String>,

        /// Wait for the transfers to finish, showing progress
        #[arg(short, long)]
        wait: bool,

        /// Check release completeness afterwards
        #[arg(long)]
        check: bool,
    },

    /// List sites available on the instance
    Sites,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), PreError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(PreError::Config)?;

    let config = Arc::new(Config::load(&cli.config)?);
    info!("Loaded configuration from {:?}", cli.config);

    let registry = ClientRegistry::from_config(&config)?;
    let remote = registry.get(&cli.instance)?;
    let orchestrator = Arc::new(Orchestrator::connect(remote, config.clone()).await?);

    // Cancellation via SIGINT/SIGTERM
    let cancel = setup_signal_handler();

    match cli.command {
        Commands::Pre {
            releases,
            file,
            sites,
            cooldown,
        } => {
            let releases = gather_releases(releases, file.as_deref(), cli.sort)?;
            let sites = resolve_sites(&config, &sites)?;
            run_pre(&orchestrator, &releases, &sites, cooldown, &cancel).await?;
        }

        Commands::Upload {
            releases,
            file,
            sites,
            src_path,
            wait,
            check,
            fxp,
        } => {
            let releases = gather_releases(releases, file.as_deref(), cli.sort)?;
            ensure_disjoint(&sites, &fxp)?;
            let sites = resolve_sites(&config, &sites)?;
            let fxp_sites = resolve_sites(&config, &fxp)?;
            ensure_on_instance(&orchestrator, sites.iter().chain(&fxp_sites)).await?;

            let mut job_ids = Vec::new();
            for site in &sites {
                for release in &releases {
                    info!("Uploading {} to {}...", release, site.id);
                    let job = orchestrator.upload(site, release, src_path.as_deref()).await?;
                    job_ids.push(job.id);
                }
            }

            let tracker = JobTracker::new(orchestrator.remote());
            // Chained FXP needs the uploads on disk first, so the presence
            // of FXP targets forces a wait even without --wait.
            if wait || !fxp_sites.is_empty() {
                wait_for_jobs(&tracker, &job_ids, wait, cli.yes, &cancel).await?;
            }

            if !fxp_sites.is_empty() {
                let src = &sites[0];
                let mut fxp_ids = Vec::new();
                for dst in &fxp_sites {
                    for release in &releases {
                        info!("FXP {} from {} to {}...", release, src.id, dst.id);
                        let job = orchestrator.fxp(src, dst, release).await?;
                        fxp_ids.push(job.id);
                    }
                }
                if wait {
                    wait_for_jobs(&tracker, &fxp_ids, true, cli.yes, &cancel).await?;
                }
            }

            if check {
                let targets: Vec<&SiteConfig> = sites.iter().chain(&fxp_sites).collect();
                report_completeness(&orchestrator, &releases, &targets).await?;
            }
        }

        Commands::Fxp {
            releases,
            file,
            from,
            to,
            wait,
            check,
        } => {
            let releases = gather_releases(releases, file.as_deref(), cli.sort)?;
            ensure_disjoint(&[from.clone()], &to)?;
            let src = resolve_sites(&config, std::slice::from_ref(&from))?.remove(0);
            let to_sites = resolve_sites(&config, &to)?;

            let mut job_ids = Vec::new();
            for dst in &to_sites {
                for release in &releases {
                    info!("FXP {} from {} to {}...", release, src.id, dst.id);
                    let job = orchestrator.fxp(&src, dst, release).await?;
                    job_ids.push(job.id);
                }
            }

            if wait {
                let tracker = JobTracker::new(orchestrator.remote());
                wait_for_jobs(&tracker, &job_ids, true, cli.yes, &cancel).await?;
            }

            if check {
                let targets: Vec<&SiteConfig> = to_sites.iter().collect();
                report_completeness(&orchestrator, &releases, &targets).await?;
            }
        }

        Commands::Sites => {
            for site in orchestrator.sites().await? {
                println!("{}", site);
            }
        }
    }

    Ok(())
}

/// Announce each release on all sites, pausing between releases.
async fn run_pre(
    orchestrator: &Arc<Orchestrator>,
    releases: &[String],
    sites: &[SiteConfig],
    cooldown: f64,
    cancel: &CancellationToken,
) -> Result<(), PreError> {
    let pause = Duration::from_secs_f64(cooldown.max(0.0));
    for (idx, release) in releases.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PreError::Cancelled);
        }
        info!("Preing {}...", release);
        orchestrator.pre(release, sites).await?;
        println!("Pre'd {} on {} site(s)", release, sites.len());

        if idx + 1 < releases.len() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PreError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
    Ok(())
}

async fn wait_for_jobs(
    tracker: &JobTracker,
    job_ids: &[i64],
    show_progress: bool,
    assume_yes: bool,
    cancel: &CancellationToken,
) -> Result<(), PreError> {
    let confirm = output::PromptConfirm { assume_yes };
    if show_progress {
        let sink = output::BarSink::new();
        tracker.wait(job_ids, &sink, &confirm, cancel).await
    } else {
        tracker.wait(job_ids, &output::QuietSink, &confirm, cancel).await
    }
}

async fn report_completeness(
    orchestrator: &Arc<Orchestrator>,
    releases: &[String],
    sites: &[&SiteConfig],
) -> Result<(), PreError> {
    for site in sites {
        for release in releases {
            if orchestrator.check_complete(release, site).await? {
                println!("{} is complete on {}", release, site.id);
            } else {
                warn!("{} is incomplete on {}", release, site.id);
            }
        }
    }
    Ok(())
}

/// Merge release arguments with an optional file list, dedupe and order.
///
/// Ordering is plain lexicographic on the release name; no natural-sort
/// handling of embedded numbers.
fn gather_releases(
    args: Vec<String>,
    file: Option<&Path>,
    sort: SortOrder,
) -> Result<Vec<String>, PreError> {
    let mut releases = args;
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)?;
        releases.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    releases.sort();
    releases.dedup();
    if sort == SortOrder::Desc {
        releases.reverse();
    }
    if releases.is_empty() {
        return Err(PreError::InvalidRequest("no releases provided".to_string()));
    }
    Ok(releases)
}

/// Map site names to their configurations.
fn resolve_sites(config: &Config, names: &[String]) -> Result<Vec<SiteConfig>, PreError> {
    names
        .iter()
        .map(|name| {
            config.sites.get(name).cloned().ok_or_else(|| {
                PreError::Config(format!("unknown site '{}' in configuration", name))
            })
        })
        .collect()
}

/// Transfer targets must not overlap with transfer sources.
fn ensure_disjoint(sources: &[String], targets: &[String]) -> Result<(), PreError> {
    let overlap: Vec<&str> = targets
        .iter()
        .filter(|target| sources.contains(target))
        .map(String::as_str)
        .collect();
    if !overlap.is_empty() {
        return Err(PreError::InvalidRequest(format!(
            "cannot FXP to the site(s) the releases were uploaded to: {}",
            overlap.join(", ")
        )));
    }
    Ok(())
}

/// Sites whose cbftp ID the instance does not know.
fn missing_on_instance<'a>(
    available: &BTreeSet<String>,
    sites: impl Iterator<Item = &'a SiteConfig>,
) -> Vec<&'a str> {
    sites
        .filter(|site| !available.contains(site.id.as_str()))
        .map(|site| site.id.as_str())
        .collect()
}

/// Every resolved site must carry an ID the instance knows.
async fn ensure_on_instance<'a>(
    orchestrator: &Arc<Orchestrator>,
    sites: impl Iterator<Item = &'a SiteConfig>,
) -> Result<(), PreError> {
    let available: BTreeSet<String> = orchestrator.sites().await?.into_iter().collect();
    let missing = missing_on_instance(&available, sites);
    if !missing.is_empty() {
        return Err(PreError::InvalidRequest(format!(
            "the following sites are not available: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Shutting down...");
        token_int.cancel();
    });

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Shutting down...");
        token_term.cancel();
    });

    cancel_token
}

/// Setup signal handler for Windows (only SIGINT/Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Shutting down...");
        token.cancel();
    });

    cancel_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_releases_merges_and_dedupes() {
        let releases = gather_releases(
            vec!["B-GRP".to_string(), "A-GRP".to_string(), "B-GRP".to_string()],
            None,
            SortOrder::Asc,
        )
        .unwrap();
        assert_eq!(releases, vec!["A-GRP", "B-GRP"]);
    }

    #[test]
    fn test_gather_releases_descending() {
        let releases = gather_releases(
            vec!["A-GRP".to_string(), "B-GRP".to_string()],
            None,
            SortOrder::Desc,
        )
        .unwrap();
        assert_eq!(releases, vec!["B-GRP", "A-GRP"]);
    }

    #[test]
    fn test_gather_releases_empty_rejected() {
        let err = gather_releases(Vec::new(), None, SortOrder::Asc).unwrap_err();
        assert!(matches!(err, PreError::InvalidRequest(_)));
    }

    #[test]
    fn test_ensure_disjoint_rejects_overlap() {
        let err = ensure_disjoint(
            &["AL".to_string(), "BM".to_string()],
            &["BM".to_string(), "CN".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("BM"));
    }

    #[test]
    fn test_ensure_disjoint_accepts_distinct_sets() {
        assert!(ensure_disjoint(&["AL".to_string()], &["BM".to_string()]).is_ok());
    }

    #[test]
    fn test_instance_check_compares_site_ids_not_config_keys() {
        use prefleet::DirPolicy;
        use std::collections::BTreeMap;

        // Config key "alpha", cbftp site ID "AL".
        let site = SiteConfig {
            id: "AL".to_string(),
            groups_dir: "/groups".to_string(),
            pre_command: "site pre {release} {section}".to_string(),
            dir_policy: DirPolicy::MatchGroupTag { default: None },
            sections: BTreeMap::new(),
        };

        let available: BTreeSet<String> = ["AL".to_string()].into();
        assert!(missing_on_instance(&available, [&site].into_iter()).is_empty());

        let available: BTreeSet<String> = ["alpha".to_string()].into();
        assert_eq!(missing_on_instance(&available, [&site].into_iter()), vec!["AL"]);
    }
}
