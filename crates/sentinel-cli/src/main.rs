mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};

use sentinel_adapters::AdapterRegistry;
use sentinel_breaker::BreakerConfig;
use sentinel_config::{ConfigOverrides, LogVerbosity};
use sentinel_core::orchestrator::{Command as TickCommand, TickRequest};
use sentinel_core::release::{ReleaseRequest, ReleaseScope};
use sentinel_core::{Reporter, SystemClock};
use sentinel_retry::RetryStrategyConfig;

use progress::CliReporter;

#[derive(Parser, Debug)]
#[command(name = "sentinel", version)]
#[command(about = "Dead-man's-switch continuity orchestrator: renewable countdown, policy-driven escalation, signed release")]
struct Cli {
    /// Directory holding the project's state document and lock file.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Directory holding the policy TOML files.
    #[arg(long, global = true)]
    policy_dir: Option<PathBuf>,

    /// Run every adapter in mock mode regardless of policy configuration.
    #[arg(long, global = true)]
    mock: bool,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one tick against the configured state/policy directories.
    Tick,
    /// Submit a renewal, resetting the escalation stage to the lowest order.
    Renew {
        /// Renewal secret. Prefer SENTINEL_RELEASE_SECRET or a secrets file over this flag.
        #[arg(long)]
        secret: String,
    },
    /// Submit a release command, arming a delayed forced transition.
    Release {
        #[arg(long)]
        secret: String,
        /// Target stage name; must be at or beyond the current stage's order.
        #[arg(long)]
        stage: String,
        /// Delay before the release executes (e.g. "15m", "2h"). Default: immediate.
        #[arg(long)]
        delay: Option<String>,
        /// Release scope.
        #[arg(long, value_enum, default_value = "full")]
        scope: ScopeArg,
    },
    /// Print the current stage, time to deadline, and the most recent receipts.
    Status,
    /// Validate the policy snapshot and adapter configuration without mutating state.
    Doctor,
    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ScopeArg {
    Full,
    SiteOnly,
}

impl From<ScopeArg> for ReleaseScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Full => ReleaseScope::Full,
            ScopeArg::SiteOnly => ReleaseScope::SiteOnly,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut reporter = CliReporter::new(verbosity(cli.verbose));

    match run(&cli, &mut reporter) {
        Ok(code) => code,
        Err(err) => {
            reporter.error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn verbosity(level: u8) -> LogVerbosity {
    match level {
        0 => LogVerbosity::Normal,
        1 => LogVerbosity::Verbose,
        _ => LogVerbosity::Debug,
    }
}

fn run(cli: &Cli, reporter: &mut CliReporter) -> Result<ExitCode> {
    if let Commands::Completions { shell } = &cli.cmd {
        use clap::CommandFactory;
        clap_complete::generate(*shell, &mut Cli::command(), "sentinel", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let overrides = ConfigOverrides {
        state_dir: cli.state_dir.clone(),
        policy_dir: cli.policy_dir.clone(),
        mock_mode: cli.mock.then_some(true),
        log_verbosity: Some(verbosity(cli.verbose)),
        ..Default::default()
    };
    let config = sentinel_config::resolve(&std::env::current_dir().context("resolve cwd")?, &overrides)
        .context("failed to resolve configuration")?;

    match &cli.cmd {
        Commands::Tick => run_tick_command(&config, None, reporter),
        Commands::Renew { secret } => {
            run_tick_command(&config, Some(TickCommand::Renew { provided_secret: secret.clone() }), reporter)
        }
        Commands::Release { secret, stage, delay, scope } => {
            let delay = match delay {
                Some(s) => humantime::parse_duration(s).with_context(|| format!("invalid --delay: {s}"))?,
                None => StdDuration::ZERO,
            };
            let request = ReleaseRequest {
                target_stage: stage.clone(),
                delay: ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero()),
                scope: (*scope).into(),
            };
            run_tick_command(
                &config,
                Some(TickCommand::Release { provided_secret: secret.clone(), request }),
                reporter,
            )
        }
        Commands::Status => run_status(&config),
        Commands::Doctor => run_doctor(&config, reporter),
        Commands::Completions { .. } => unreachable!("handled before config resolution"),
    }
}

fn build_registry(mock_mode: bool) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(sentinel_adapters::MockAdapter::new("mock")));

    if !mock_mode {
        if let Ok(url) = std::env::var("SENTINEL_WEBHOOK_URL") {
            let webhook_config = sentinel_webhook::WebhookConfig {
                url,
                webhook_type: sentinel_webhook::WebhookType::Generic,
                secret: std::env::var("SENTINEL_WEBHOOK_SECRET").ok(),
                timeout_secs: 30,
            };
            registry.register(Box::new(sentinel_adapters::WebhookAdapter::new("webhook", webhook_config)));
        }
    }

    registry
}

fn known_adapter_names(registry: &AdapterRegistry) -> Vec<String> {
    registry.names().into_iter().map(str::to_string).collect()
}

fn run_tick_command(config: &sentinel_config::Config, command: Option<TickCommand>, reporter: &mut CliReporter) -> Result<ExitCode> {
    let registry = build_registry(config.mock_mode);
    let known_owned = known_adapter_names(&registry);
    let known: Vec<&str> = known_owned.iter().map(String::as_str).collect();

    let resolved_secret = sentinel_auth::resolve_secret(&config.state_dir).context("failed to resolve release secret")?;
    if command.is_some() && resolved_secret.secret.is_none() {
        anyhow::bail!("no release secret configured (set SENTINEL_RELEASE_SECRET or SENTINEL_RELEASE_SECRET_FILE)");
    }
    let configured_secret = resolved_secret.secret.unwrap_or_default();

    let request = TickRequest {
        state_dir: &config.state_dir,
        policy_dir: &config.policy_dir,
        known_adapters: &known,
        configured_secret: &configured_secret,
        registry: &registry,
        breaker: BreakerConfig::default(),
        retry: RetryStrategyConfig::default(),
        mock_mode: config.mock_mode,
        lock_timeout: config.lock_timeout,
        command,
        cancellation: None,
    };

    let clock = SystemClock;
    let outcome = sentinel_core::run_tick(&request, &clock, reporter)?;

    println!("tick_id: {}", outcome.tick_id);
    println!("stage: {}", outcome.stage);
    if let Some(previous) = &outcome.previous_stage {
        println!("previous_stage: {previous}");
    }
    if let Some(command_outcome) = &outcome.command_outcome {
        println!("command_outcome: {command_outcome:?}");
    }

    Ok(ExitCode::SUCCESS)
}

fn run_status(config: &sentinel_config::Config) -> Result<ExitCode> {
    let store = sentinel_state::StateStore::new(&config.state_dir);
    let state = store.load().context("failed to load state document")?;

    let now = chrono::Utc::now();
    let time = sentinel_core::facts::evaluate_time(state.timer.deadline, now);

    println!("project_id: {}", state.meta.project_id);
    println!("stage: {}", state.escalation.stage);
    println!("stage_entered_at: {}", state.escalation.stage_entered_at);
    println!("time_to_deadline_minutes: {}", time.time_to_deadline_minutes);
    println!("overdue_minutes: {}", time.overdue_minutes);
    println!("failed_renewal_attempts: {}", state.renewal.failed_attempts);
    println!("release_triggered: {}", state.release.triggered);
    println!();
    println!("most recent receipts:");
    for (key, at) in &state.actions.executed {
        println!("  {key}: {at}");
    }

    Ok(ExitCode::SUCCESS)
}

fn run_doctor(config: &sentinel_config::Config, reporter: &mut CliReporter) -> Result<ExitCode> {
    println!("state_dir: {}", config.state_dir.display());
    println!("policy_dir: {}", config.policy_dir.display());
    println!("mock_mode: {}", config.mock_mode);

    let registry = build_registry(config.mock_mode);
    let known = known_adapter_names(&registry);
    println!("known_adapters: {}", known.join(", "));

    match sentinel_policy::load_dir(&config.policy_dir, &known.iter().map(String::as_str).collect::<Vec<_>>()) {
        Ok(policy) => {
            println!("policy: OK (schema {}, {} states, {} rules)", policy.schema, policy.states.len(), policy.rules.len());
        }
        Err(err) => {
            reporter.error(&format!("policy validation failed: {err}"));
            return Ok(ExitCode::FAILURE);
        }
    }

    match sentinel_auth::resolve_secret(&config.state_dir) {
        Ok(resolved) => println!("release_secret_source: {:?}", resolved.source),
        Err(err) => reporter.warn(&format!("release secret not resolvable: {err}")),
    }

    let lock_held = sentinel_lock::LockFile::is_locked(&config.state_dir).unwrap_or(false);
    println!("lock_held: {lock_held}");

    Ok(ExitCode::SUCCESS)
}
