use anyhow::Result;
use clap::{Parser, Subcommand};
use qisu_plan::cli;
use qisu_plan::cli::flow_cmd::FlowAction;
use qisu_plan::config::Config;
use qisu_plan::flow::FlowStep;
use qisu_plan::logging;
use qisu_plan::render::OutputFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qisu", version)]
#[command(about = "Qisu: stream and follow personalised wellbeing plans", long_about = None)]
struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Mirror log lines to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a saved plan buffer (file or stdin) and print its sections
    Parse {
        /// Buffer to parse; `-` or omitted reads stdin
        file: Option<PathBuf>,

        /// Treat the buffer as a stream still in progress
        #[arg(long, default_value_t = false)]
        partial: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Replay a recorded event stream (or plain plan text) chunk by chunk
    Replay {
        file: PathBuf,

        /// Bytes per simulated transport chunk
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Stream an analysis of the questionnaire answers
    Analyze {
        /// Prompt to send; built from the saved answers when omitted
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Stream a multi-week treatment plan
    Treatment {
        #[arg(long)]
        prompt: Option<String>,

        /// Save the finished plan to the backend
        #[arg(long, default_value_t = false)]
        save: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show today's plan, generating it when none is saved yet
    Today {
        /// Ask for the structured practices variant
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Ignore any saved plan and generate a new one
        #[arg(long, default_value_t = false)]
        regenerate: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Inspect or edit the saved questionnaire flow
    Flow {
        #[command(subcommand)]
        action: FlowCommand,
    },
    /// Diagnose configuration and backend reachability
    Doctor,
}

#[derive(Subcommand, Debug)]
enum FlowCommand {
    /// Print the saved answers and current step
    Show,
    /// Set one answer by its backend field name
    Set { key: String, value: String },
    /// Move to the next step, or to the one given
    Step {
        #[arg(value_enum)]
        step: Option<FlowStep>,
    },
    /// Forget all answers
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = Config::load_with_path().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config, using defaults: {e:#}");
        (Config::default(), None)
    });

    let cli = Cli::parse();

    // Lightweight subcommands run without tracing.
    match &cli.cmd {
        Command::Doctor => {
            return cli::doctor::run(&config, config_path.as_deref()).await;
        }
        Command::Flow { action } => {
            let action = match action {
                FlowCommand::Show => FlowAction::Show,
                FlowCommand::Set { key, value } => FlowAction::Set {
                    key: key.clone(),
                    value: value.clone(),
                },
                FlowCommand::Step { step } => FlowAction::Step { step: *step },
                FlowCommand::Reset => FlowAction::Reset,
            };
            return cli::flow_cmd::run(action);
        }
        _ => {}
    }

    config.validate()?;

    let mut settings = logging::LoggingSettings::from_config(&config.logging, cli.verbose);
    if cli.log_level.is_some() {
        settings.level = cli.log_level.as_deref();
    }
    let log_dir = logging::setup_tracing_with_settings(settings);
    if log_dir.is_none() {
        eprintln!("Failed to initialize logging");
    }

    tracing::info!("--- qisu {} ---", env!("CARGO_PKG_VERSION"));
    match config_path.as_ref() {
        Some(path) => tracing::info!("Config File: {}", path.display()),
        None => tracing::info!("Config File: (default)"),
    }
    tracing::info!("Backend: {}", config.backend.base_url);

    match cli.cmd {
        Command::Parse {
            file,
            partial,
            format,
        } => cli::inspect::parse(file.as_deref(), partial, format)?,
        Command::Replay {
            file,
            chunk_size,
            format,
        } => cli::inspect::replay(&file, chunk_size, format)?,
        Command::Analyze { prompt } => cli::generate::analyze(&config, prompt).await?,
        Command::Treatment {
            prompt,
            save,
            format,
        } => cli::generate::treatment(&config, prompt, save, format).await?,
        Command::Today {
            json,
            regenerate,
            format,
        } => cli::generate::today(&config, json, regenerate, format).await?,

        // Already handled above
        Command::Doctor | Command::Flow { .. } => unreachable!(),
    }

    Ok(())
}
