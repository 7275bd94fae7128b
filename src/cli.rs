use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// laundry-notify: notification client for the laundry-service platform
#[derive(Parser)]
#[command(name = "laundry-notify", version, about)]
pub struct Cli {
    /// REST API base URL (overrides LAUNDRY_API_URL)
    #[arg(long, global = true, env = "LAUNDRY_API_URL")]
    pub api_url: Option<String>,

    /// Client storage file holding the auth token (overrides LAUNDRY_STORAGE_PATH)
    #[arg(long, global = true, env = "LAUNDRY_STORAGE_PATH")]
    pub storage: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stay connected and print notifications as they arrive
    Watch,

    /// Store a bearer token in client storage
    Login {
        #[arg(long)]
        token: String,
    },

    /// Remove stored tokens
    Logout,

    /// List recent notifications
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Print the unread count
    Unread,

    /// Mark one or more notifications as read
    MarkRead {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Mark every notification as read
    MarkAllRead,
}
