//! bizloop - brand-aligned business idea loop
//!
//! Command-line driver for the idea loop: initialize a base directory,
//! inspect its state, and run iterations against a local model.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use bizloop::agent::{AgentLoop, AgentStatus, IterationOutcome, IterationReport};
use bizloop::config::ConfigValidator;
use bizloop::iteration::{Decision, Mode};
use bizloop::llm::HarmonyClient;
use bizloop::{BizloopError, IntoBizloopError};

#[derive(Parser)]
#[command(name = "bizloop")]
#[command(version = "0.1.0")]
#[command(about = "Iterative business idea generation for a brand IP", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Root directory for state and storage
    #[arg(long, global = true, env = "BIZLOOP_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Directory containing ip_profile.json and project_config.json
    /// (defaults to <base-dir>/config)
    #[arg(long, global = true, env = "BIZLOOP_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize storage and seed the task queue
    Start,

    /// Show task and iteration status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the next scheduling decision without executing it
    Decide {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a placeholder iteration log for the next ready task
    RecordIteration {
        /// Iteration mode (defaults to the balancer's next mode)
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },

    /// Run iterations against the model endpoint
    Run {
        /// Maximum number of iterations
        #[arg(short = 'n', long, default_value = "1")]
        iterations: u32,

        /// OpenAI-compatible API base URL
        #[arg(long, default_value = HarmonyClient::DEFAULT_BASE_URL)]
        endpoint: String,

        /// Model id
        #[arg(long, default_value = HarmonyClient::DEFAULT_MODEL)]
        model: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = HarmonyClient::DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate configuration files
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "bizloop=debug,info"
    } else {
        "bizloop=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| cli.base_dir.join("config"));

    if let Err(e) = dispatch(&cli, &config_dir).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
    Ok(())
}

async fn dispatch(cli: &Cli, config_dir: &Path) -> bizloop::Result<()> {
    match &cli.command {
        Commands::Config {
            action: ConfigAction::Validate,
        } => {
            let report = ConfigValidator::new(config_dir).validate()?;
            println!("{}", report.verbose_report());
            if !report.is_valid() {
                std::process::exit(report.exit_code());
            }
        }

        Commands::Start => {
            std::fs::create_dir_all(&cli.base_dir).into_bizloop_config()?;
            let mut agent = AgentLoop::from_config_dir(&cli.base_dir, config_dir)?;
            let seeded = agent.initialize()?;
            println!(
                "{} Initialized agent state in {}",
                "OK".green(),
                cli.base_dir.display()
            );
            if seeded {
                println!("   Seeded task queue with the planner task");
            }
            print_status(&agent.status()?);
        }

        Commands::Status { json } => {
            let agent = AgentLoop::from_config_dir(&cli.base_dir, config_dir)?;
            let status = agent.status()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Decide { json } => {
            let agent = AgentLoop::from_config_dir(&cli.base_dir, config_dir)?;
            let decision = agent.preview_decision();
            if *json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                print_decision(&decision);
            }
        }

        Commands::RecordIteration { mode } => {
            let mut agent = AgentLoop::from_config_dir(&cli.base_dir, config_dir)?;
            agent.initialize()?;
            let task = agent.next_task()?;
            let mode = mode.unwrap_or_else(|| agent.baseline_mode());
            let path = agent.record_iteration(task.as_ref(), mode)?;
            println!("Recorded iteration at {}", path.display());
        }

        Commands::Run {
            iterations,
            endpoint,
            model,
            timeout,
        } => {
            let mut agent = AgentLoop::from_config_dir(&cli.base_dir, config_dir)?;
            agent.initialize()?;
            let client = HarmonyClient::new()
                .with_base_url(endpoint)
                .with_model(model)
                .with_timeout(*timeout);

            run_iterations(&mut agent, &client, *iterations).await?;
            print_status(&agent.status()?);
        }
    }
    Ok(())
}

async fn run_iterations(
    agent: &mut AgentLoop,
    client: &HarmonyClient,
    iterations: u32,
) -> bizloop::Result<()> {
    for i in 1..=iterations {
        println!(
            "\n{} {}/{}",
            "Iteration".cyan().bold(),
            i,
            iterations
        );
        match agent.run_next(client).await {
            Ok(IterationOutcome::Executed(report)) => print_report(&report),
            Ok(IterationOutcome::Idle { .. }) => {
                println!("{} No ready tasks, stopping", "Info:".blue());
                break;
            }
            Err(e) => {
                if let BizloopError::ModelTimeout { .. } = e {
                    eprintln!(
                        "{} Try a larger --timeout for slow models",
                        "Hint:".yellow()
                    );
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

fn print_status(status: &AgentStatus) {
    println!("\n{} Loop Status", "Status:".cyan().bold());
    println!("{}", "─".repeat(40));
    println!("   Tasks: {} ({} ready)", status.task_count, status.ready_tasks);
    println!("   Latest iteration: {}", status.latest_iteration);
    println!(
        "   Iterations: {} explore / {} deepen",
        status.explore_count, status.deepen_count
    );
    println!("   Next mode: {}", status.next_mode);
}

fn print_decision(decision: &Decision) {
    println!("{} {}", "Next mode:".cyan().bold(), decision.mode);
    println!("   Baseline: {}", decision.baseline);
    if decision.stalled {
        println!(
            "   {} recent output is repetitive; a shake-up task will be queued",
            "Stalled:".yellow()
        );
    }
}

fn print_report(report: &IterationReport) {
    let marker = if report.decision.stalled {
        format!(" {}", "(shake-up)".yellow())
    } else {
        String::new()
    };
    println!(
        "   {} {} task {}{}",
        "Ran".green(),
        report.task_type,
        report.task_id,
        marker
    );
    println!(
        "   Mode: {}  Ideas: {}  Follow-ups: {}",
        report.mode, report.ideas_added, report.follow_ups_added
    );
    println!("   Log: {}", report.log_path.display());
}
