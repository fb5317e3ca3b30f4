use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "daybreak", version, about = "Daybreak daily engagement CLI")]
struct Cli {
    #[command(flatten)]
    user: commands::engage::UserArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show (or create) today's assignment
    Today,
    /// Replace today's assignment, once per day
    Reroll,
    /// Complete a ritual of today's assignment
    Complete {
        /// Ritual id from `today`
        ritual_id: String,
        /// Journal word count written with the ritual
        #[arg(long)]
        words: Option<u32>,
    },
    /// List earned badges
    Badges,
    /// Record a lifecycle event (check_in_completed, wall_interaction)
    Emit {
        /// Event type
        event_type: String,
        /// Event fields as a JSON object
        #[arg(long)]
        json: Option<String>,
    },
    /// Show the current streak and shields
    Streak,
    /// Show recent daily states
    History {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Inspect the ritual and badge catalogs
    Catalog {
        #[command(subcommand)]
        action: commands::catalog::CatalogAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let user = cli.user;
    let result = match cli.command {
        Commands::Today => commands::engage::today(&user),
        Commands::Reroll => commands::engage::reroll(&user),
        Commands::Complete { ritual_id, words } => {
            commands::engage::complete(&user, &ritual_id, words)
        }
        Commands::Badges => commands::engage::badges(&user),
        Commands::Emit { event_type, json } => {
            commands::engage::emit(&user, &event_type, json.as_deref())
        }
        Commands::Streak => commands::engage::streak(&user),
        Commands::History { days } => commands::engage::history(&user, days),
        Commands::Catalog { action } => commands::catalog::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
