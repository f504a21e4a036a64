use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "kennel")]
#[command(version, about = "Track dog walks across kennel cages")]
pub struct Cli {
    /// Path to kennel.toml (defaults to ./kennel.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show every cell grouped by cage
    Board {
        /// Keep the board open and redraw on every change
        #[arg(long)]
        watch: bool,
    },
    /// Advance a cell: Not yet -> Walked -> Do not walk -> Not yet
    Cycle { id: i64 },
    /// Replace a cell's notes (no text clears them)
    Notes {
        id: i64,
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Show the split/combined configuration of every cage
    Configs,
    /// Flip a cage between split and combined
    Toggle { cage: i32 },
    /// Make a cage Inner/Outer
    Split { cage: i32 },
    /// Make a cage one combined cell
    Combine { cage: i32 },
    /// Create split configurations for cages 1..=N
    Seed {
        #[arg(long)]
        count: Option<i32>,
    },
    /// Create the Inner and Outer cells of a new cage
    InitCage { cage: i32 },
    /// Print cell changes as they happen
    Watch,
    /// Print the SQL that creates the hosted tables
    SetupSql,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    kennel::logging::init(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Board { watch } => cmd::cmd_board(&cli, *watch).await?,
        Commands::Cycle { id } => cmd::cmd_cycle(&cli, *id).await?,
        Commands::Notes { id, text } => cmd::cmd_notes(&cli, *id, text).await?,
        Commands::Configs => cmd::cmd_configs(&cli).await?,
        Commands::Toggle { cage } => cmd::cmd_reshape(&cli, *cage, cmd::Reshape::Toggle).await?,
        Commands::Split { cage } => cmd::cmd_reshape(&cli, *cage, cmd::Reshape::Split).await?,
        Commands::Combine { cage } => {
            cmd::cmd_reshape(&cli, *cage, cmd::Reshape::Combine).await?
        }
        Commands::Seed { count } => cmd::cmd_seed(&cli, *count).await?,
        Commands::InitCage { cage } => cmd::cmd_init_cage(&cli, *cage).await?,
        Commands::Watch => cmd::cmd_watch(&cli).await?,
        Commands::SetupSql => cmd::cmd_setup_sql(),
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
