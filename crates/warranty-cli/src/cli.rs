use clap::{Parser, Subcommand};

/// Command-line shell for Warranty Manager.
#[derive(Debug, Parser)]
#[command(name = "warranty", version, about)]
pub struct Cli {
    /// Service base URL (overrides WARRANTY_API_URL and the config file)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Keep the session in memory only; nothing is written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Also write logs to a daily rolling file in the data directory
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account
    Register {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show who is signed in and when the session ends
    Status {
        /// Print the session state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Authenticated GET against the service, printing the JSON body
    Get {
        /// Path relative to the base URL, e.g. /products
        path: String,
    },

    /// Stay attached until the session ends or Ctrl-C
    Watch,
}
