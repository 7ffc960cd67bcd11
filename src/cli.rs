use clap::{Parser, Subcommand};

/// chatbridge: OpenAI-compatible chat completion proxy
#[derive(Parser)]
#[command(name = "chatbridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Serve {
        /// Port to bind (overrides CHATBRIDGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Backend base URL (overrides CHATBRIDGE_UPSTREAM_URL)
        #[arg(long)]
        upstream_url: Option<String>,
    },

    /// Print the client → backend model table
    Models,
}
