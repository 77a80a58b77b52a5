//! jira-create - quick JIRA issue creation from a launcher.

use std::process::ExitCode;

use clap::Parser;

use jira_quick_create::{app, cli::Cli, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init() {
        eprintln!("Warning: could not set up logging: {:#}", e);
    }

    let code = match app::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e.user_message());
            if let Some(action) = e.suggested_action() {
                eprintln!("{}", action);
            }
            if let Some(dir) = logging::log_directory() {
                eprintln!("Logs: {}", dir.display());
            }
            ExitCode::FAILURE
        }
    };

    logging::shutdown();
    code
}
