mod commands;
mod event_sink;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "Operator CLI for the swarm coordination and workflow execution runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or validate a workflow definition
    Workflow {
        #[command(subcommand)]
        cmd: WorkflowCommands,
    },
    /// Exercise a schedule against a workflow
    Schedule {
        #[command(subcommand)]
        cmd: ScheduleCommands,
    },
    /// Run a voting round from a ballot file
    Voting {
        #[command(subcommand)]
        cmd: VotingCommands,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Replay observations through a pattern store and optionally predict
    Pattern {
        /// Path to a JSON observation/prediction description
        file: PathBuf,
    },
    /// Run a queen decision round over a scripted set of agents
    Queen {
        /// Path to a JSON topic/context/agents description
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Validate a workflow definition's graph without running it
    Validate {
        /// Path to a JSON workflow definition
        file: PathBuf,
    },
    /// Register and run a workflow definition to completion
    Run {
        /// Path to a JSON workflow definition
        file: PathBuf,

        /// Variables passed into the execution context, as KEY=VALUE
        #[arg(long = "var")]
        vars: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Create a schedule for a workflow and fire it through a number of ticks
    Demo {
        /// Path to a JSON workflow definition
        file: PathBuf,

        /// Variables passed to the workflow on every firing, as KEY=VALUE
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Fire once at this RFC 3339 timestamp
        #[arg(long, conflicts_with_all = ["interval_ms", "cron"])]
        once: Option<String>,

        /// Fire on a fixed interval, in milliseconds
        #[arg(long, conflicts_with_all = ["once", "cron"])]
        interval_ms: Option<u64>,

        /// Fire on a cron expression (5 or 6 space-separated fields)
        #[arg(long, conflicts_with_all = ["once", "interval_ms"])]
        cron: Option<String>,

        /// IANA timezone for the cron expression
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Number of ticks to simulate
        #[arg(long, default_value_t = 1)]
        ticks: u32,
    },
}

#[derive(Subcommand)]
enum VotingCommands {
    /// Open a voting round and cast every ballot in a JSON file
    Run {
        /// Path to a JSON voting round description
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration, from a file or the built-in defaults
    Show {
        #[arg(long, short = 'c')]
        path: Option<PathBuf>,
    },
    /// Write the default configuration to a file
    Init {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .rgb_colors(miette::RgbColors::Preferred)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();

    let cli = Cli::parse();

    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("hive").join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "hive-cli.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = if cli.debug {
        EnvFilter::new("hive_core=debug,hive_cli=debug")
    } else {
        EnvFilter::new("hive_core=info,hive_cli=info,warn")
    };
    let terminal_layer = fmt::layer().with_target(false).with_thread_ids(false).compact();
    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking)
        .pretty();

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(env_filter))
        .with(file_layer.with_filter(EnvFilter::new("hive_core=debug,hive_cli=debug")))
        .init();

    match cli.command {
        Commands::Workflow { cmd } => match cmd {
            WorkflowCommands::Validate { file } => commands::workflow::validate(file)?,
            WorkflowCommands::Run { file, vars } => commands::workflow::run(file, vars).await?,
        },
        Commands::Schedule { cmd } => match cmd {
            ScheduleCommands::Demo { file, vars, once, interval_ms, cron, timezone, ticks } => {
                commands::schedule::demo(file, vars, once, interval_ms, cron, timezone, ticks).await?
            }
        },
        Commands::Voting { cmd } => match cmd {
            VotingCommands::Run { file } => commands::voting::run(file)?,
        },
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show { path } => commands::config::show(path).await?,
            ConfigCommands::Init { path } => commands::config::init(path).await?,
        },
        Commands::Pattern { file } => commands::pattern::replay(file)?,
        Commands::Queen { file } => commands::queen::decide(file).await?,
    }

    Ok(())
}
