use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;

#[derive(Parser)]
#[command(name = "focushive-cli", version)]
#[command(about = "Operator CLI for the FocusHive backend -- exercises presence, timer, auth, and partnership operations against in-memory reference implementations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus timer lifecycle demos
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Hive presence lifecycle demos
    Presence {
        #[command(subcommand)]
        action: commands::presence::PresenceAction,
    },
    /// Partnership & accountability demos
    Partnership {
        #[command(subcommand)]
        action: commands::partnership::PartnershipAction,
    },
    /// Credential verification against the auth gateway
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Generate shell completion script
    Complete {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action).await,
        Commands::Presence { action } => commands::presence::run(action).await,
        Commands::Partnership { action } => commands::partnership::run(action).await,
        Commands::Auth { action } => commands::auth::run(action).await,
        Commands::Complete { shell } => {
            print_completions(shell);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Generate shell completion script
fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = "focushive-cli";
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
