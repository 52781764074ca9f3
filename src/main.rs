use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskboard::config::{DEFAULT_CONFIG_FILE, TaskboardToml};
use taskboard::models::Lane;

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Three-lane task board backed by a REST task store")]
pub struct Cli {
    /// Path to taskboard.toml
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log level or filter directives (e.g. "debug", "taskboard=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// API root for client commands, e.g. http://127.0.0.1:5000/api
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token for client commands
    #[arg(long, global = true, env = "TASKBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the task store server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Permissive CORS for a browser UI on another origin
        #[arg(long)]
        dev: bool,
    },
    /// Create the database, and taskboard.toml if it is missing
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Create an account and print its token
    Register {
        username: String,
        email: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in and print a token
    Login {
        email: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the current token
    Logout,
    /// Show the user behind the current token
    Whoami,
    /// Print the board, one lane after another
    Board,
    /// Create a task in "To Do"
    Add {
        title: String,
        #[arg(short, long)]
        description: String,
        #[arg(short, long, default_value = "")]
        assign: String,
    },
    /// Change a task's fields
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        assign: Option<String>,
    },
    /// Move a task to a lane (todo, inprogress, done)
    Move {
        id: String,
        lane: Lane,
        /// Slot in the destination lane; defaults to the end
        #[arg(long)]
        index: Option<usize>,
    },
    /// Delete a task
    Rm { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = TaskboardToml::resolve(&cli.config)?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(url) = &cli.base_url {
        config.client.base_url = url.clone();
    }
    taskboard::logging::init(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            dev,
        } => {
            let mut server = config.server;
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(db_path) = db_path {
                server.db_path = db_path;
            }
            server.cors_permissive |= dev;
            cmd::cmd_serve(server).await?;
        }
        Commands::Init { db_path } => {
            let mut full = config;
            if let Some(db_path) = db_path {
                full.server.db_path = db_path;
            }
            cmd::cmd_init(&full, &cli.config)?;
        }
        Commands::Register {
            username,
            email,
            password,
        } => cmd::cmd_register(&config.client, &username, &email, &password).await?,
        Commands::Login { email, password } => {
            cmd::cmd_login(&config.client, &email, &password).await?
        }
        Commands::Logout => cmd::cmd_logout(&config.client, cli.token).await?,
        Commands::Whoami => cmd::cmd_whoami(&config.client, cli.token).await?,
        Commands::Board => cmd::cmd_board(&config.client, cli.token).await?,
        Commands::Add {
            title,
            description,
            assign,
        } => cmd::cmd_add(&config.client, cli.token, title, description, assign).await?,
        Commands::Edit {
            id,
            title,
            description,
            assign,
        } => {
            let edit = cmd::TaskEdit {
                title,
                description,
                assigned_to: assign,
            };
            cmd::cmd_edit(&config.client, cli.token, &id, edit).await?
        }
        Commands::Move { id, lane, index } => {
            cmd::cmd_move(&config.client, cli.token, &id, lane, index).await?
        }
        Commands::Rm { id } => cmd::cmd_rm(&config.client, cli.token, &id).await?,
    }

    Ok(())
}
