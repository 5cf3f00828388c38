//! regatta — thin CLI over the coordination registry.
//!
//! ```text
//! regatta --uri doozer:?ca=127.0.0.1:8046 --root /fleet app register myapp --repo-url git://myapp --stack cedar
//! regatta rev register myapp v14 --archive-url http://artifacts/myapp-v14.img
//! regatta proc register myapp web
//! regatta scale myapp v14 web 5
//! ```
//!
//! Exit codes: 0 on success, 1 on a domain error, 2 on usage or dial
//! failure.

mod commands;

use clap::{Parser, Subcommand};
use regatta_registry::{Store, DEFAULT_ROOT, DEFAULT_URI};

#[derive(Parser)]
#[command(
    name = "regatta",
    about = "Regatta — coordination registry for an application fleet",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Registry cluster URI.
    #[arg(long, global = true, default_value = DEFAULT_URI)]
    uri: String,

    /// Registry tree prefix.
    #[arg(long, global = true, default_value = DEFAULT_ROOT)]
    root: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage apps.
    App {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Manage proc types.
    Proc {
        #[command(subcommand)]
        action: ProcAction,
    },
    /// Manage code revisions.
    Rev {
        #[command(subcommand)]
        action: RevAction,
    },
    /// Drive the live instance count of (app, rev, proc) to a target.
    Scale {
        app: String,
        rev: String,
        proc: String,
        factor: i64,
    },
    /// Bootstrap the registry tree (idempotent).
    Init,
}

#[derive(Subcommand)]
enum AppAction {
    /// Register an app.
    Register {
        name: String,
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        stack: String,
    },
    /// Unregister an app. Descendants must be cleaned up first.
    Unregister { name: String },
    /// Print an app's record and environment.
    Describe { name: String },
    /// Manage an app's environment variables.
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    Get { app: String, key: String },
    Set { app: String, key: String, value: String },
    Del { app: String, key: String },
}

#[derive(Subcommand)]
enum ProcAction {
    Register { app: String, name: String },
    Unregister { app: String, name: String },
}

#[derive(Subcommand)]
enum RevAction {
    Register {
        app: String,
        name: String,
        #[arg(long)]
        archive_url: String,
    },
    Unregister { app: String, name: String },
    /// Print a revision's record.
    Describe { app: String, name: String },
    /// Exit 0 iff the revision is registered.
    Exists { app: String, name: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regatta=warn".parse().expect("static directive")),
        )
        .init();

    let cli = Cli::parse();

    let store = match Store::dial_uri(&cli.uri, &cli.root).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error connecting to {}: {e}", cli.uri);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(store, cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(store: Store, command: Command) -> anyhow::Result<()> {
    match command {
        Command::App { action } => match action {
            AppAction::Register { name, repo_url, stack } => {
                commands::app_register(&store, &name, &repo_url, &stack).await
            }
            AppAction::Unregister { name } => commands::app_unregister(&store, &name).await,
            AppAction::Describe { name } => commands::app_describe(&store, &name).await,
            AppAction::Env { action } => match action {
                EnvAction::Get { app, key } => commands::env_get(&store, &app, &key).await,
                EnvAction::Set { app, key, value } => {
                    commands::env_set(&store, &app, &key, &value).await
                }
                EnvAction::Del { app, key } => commands::env_del(&store, &app, &key).await,
            },
        },
        Command::Proc { action } => match action {
            ProcAction::Register { app, name } => {
                commands::proc_register(&store, &app, &name).await
            }
            ProcAction::Unregister { app, name } => {
                commands::proc_unregister(&store, &app, &name).await
            }
        },
        Command::Rev { action } => match action {
            RevAction::Register { app, name, archive_url } => {
                commands::rev_register(&store, &app, &name, &archive_url).await
            }
            RevAction::Unregister { app, name } => {
                commands::rev_unregister(&store, &app, &name).await
            }
            RevAction::Describe { app, name } => commands::rev_describe(&store, &app, &name).await,
            RevAction::Exists { app, name } => commands::rev_exists(&store, &app, &name).await,
        },
        Command::Scale { app, rev, proc, factor } => {
            commands::scale(&store, &app, &rev, &proc, factor).await
        }
        Command::Init => commands::init(&store).await,
    }
}
