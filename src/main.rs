//! Command-line entry point for the portfolio site.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use portfolio::{Settings, app, mail};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "portfolio")]
#[command(version)]
#[command(about = "Personal portfolio website", long_about = None)]
struct Cli {
    /// Settings file; missing files fall back to defaults
    #[arg(short, long, global = true, default_value = "portfolio.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    #[command(alias = "s")]
    Serve {
        /// Port to listen on, overriding the settings file
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to, overriding the settings file
        #[arg(long)]
        host: Option<String>,
    },

    /// Create or update the database schema and exit
    Migrate,

    /// Send a test message through the configured mail backend
    SendTestEmail {
        /// Recipient address
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "portfolio=debug,info" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut settings = Settings::load(&cli.config)?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(host) = host {
                settings.host = host;
            }
            if settings.admin_token.is_none() {
                log::warn!("No admin token configured; the admin console is disabled");
            }
            let state = app::bootstrap(settings.clone()).await?;
            let router = app::build_router(state);
            router.run(settings).await?;
        }

        Commands::Migrate => {
            app::open_database(&settings).await?;
            println!("Database schema is up to date.");
        }

        Commands::SendTestEmail { to } => {
            let mailer = mail::build_mailer(&settings.email)?;
            let email = mail::test_email(&settings.email, &to);
            match mailer.send(&email).await {
                Ok(()) => println!("Test email sent to {}", to),
                Err(e) => {
                    log::error!("Test email to {} failed: {}", to, e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
