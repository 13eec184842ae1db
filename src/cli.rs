use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Solvify CRM API server and maintenance commands
#[derive(Parser)]
#[command(name = "solvify", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (defaults to PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep all data in process memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Inspect or refresh stored third-party credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Show the connection status of a user's credential
    Status {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        service: String,
    },
    /// Force a token refresh for a user's credential
    Refresh {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        service: String,
    },
}
