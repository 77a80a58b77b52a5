//! Top-level command handling.
//!
//! `create` (the default) loads the form metadata, shows the form through the
//! configured frontend until the user submits or cancels, and announces the
//! result. The other commands manage the cache and the stored token.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::api::auth::store_token;
use crate::api::{JiraApi, JiraClient};
use crate::cache::{now_secs, MetadataCache};
use crate::cli::{CacheAction, Cli, Command};
use crate::config::{Config, ConfigError};
use crate::create::{CreatedIssue, IssueDraft};
use crate::error::{AppError, Result};
use crate::frontend::{self, describe_error, FormFrontend, FormView};
use crate::host::{announce_created, announce_error, DesktopHost, HostEffects};
use crate::session::FormSession;

/// How a form run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    /// The issue was created.
    Created(CreatedIssue),
    /// The user closed the form.
    Cancelled,
    /// Creation failed and the user has been told why.
    Failed,
}

impl FormOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FormOutcome::Created(_) | FormOutcome::Cancelled => ExitCode::SUCCESS,
            FormOutcome::Failed => ExitCode::FAILURE,
        }
    }
}

/// Run the command selected on the command line.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command.clone().unwrap_or(Command::Create) {
        Command::Create => run_create(&cli).await,
        Command::Cache { action } => run_cache(&cli, action),
        Command::SetToken { email } => set_token(&email),
    }
}

async fn run_create(cli: &Cli) -> Result<ExitCode> {
    let host = DesktopHost;
    match create(cli, &host).await {
        Ok(outcome) => Ok(outcome.exit_code()),
        Err(e) => {
            // The form may never have been shown, so make sure the user hears about it.
            announce_error(&host, &describe_error(&e));
            Err(e)
        }
    }
}

async fn create(cli: &Cli, host: &dyn HostEffects) -> Result<FormOutcome> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.settings.backend = backend;
    }
    if let Some(project) = &cli.project {
        config.settings.default_project_key = Some(project.trim().to_uppercase());
    }
    info!(
        "Using {} backend for {}",
        config.settings.backend, config.credentials.base_url
    );

    let cache = Arc::new(match config.settings.cache_dir() {
        Some(dir) => MetadataCache::open(dir),
        None => {
            warn!("No cache directory available, caching in memory only");
            MetadataCache::in_memory()
        }
    });
    let client = JiraClient::new(&config.credentials, config.settings.client_options())?;
    let api: Arc<dyn JiraApi> = Arc::new(client);

    let mut session = FormSession::new(api, cache.clone(), &config.credentials.base_url);
    let result = drive_form(
        &mut session,
        frontend::for_backend(config.settings.backend),
        host,
        config.settings.default_project_key.as_deref(),
    )
    .await;

    session.close();
    cache.persist();
    result
}

/// Show the form until the user creates an issue or gives up.
///
/// Validation errors and rejected fields are reported and the form is shown
/// again with the draft intact. Picking another project reloads the pickers
/// before the form comes back.
pub async fn drive_form(
    session: &mut FormSession,
    mut frontend: Box<dyn FormFrontend>,
    host: &dyn HostEffects,
    default_project: Option<&str>,
) -> Result<FormOutcome> {
    session.load_projects();
    session.wait_until_loaded().await;
    check_loaded(session)?;

    let initial = default_project
        .map(str::to_string)
        .or_else(|| session.projects().first().map(|p| p.key.clone()));
    if let Some(project_key) = initial {
        session.select_project(&project_key);
        session.wait_until_loaded().await;
        check_loaded(session)?;
    }

    loop {
        let view = FormView::from_session(session);
        let (returned, answer) = blocking(
            frontend,
            move |frontend: &mut dyn FormFrontend| -> anyhow::Result<Option<IssueDraft>> {
                frontend.render_form(&view)?;
                frontend.get_draft()
            },
        )
        .await?;
        frontend = returned;

        let Some(draft) = answer.map_err(|e| AppError::frontend(format!("{:#}", e)))? else {
            info!("Form cancelled");
            return Ok(FormOutcome::Cancelled);
        };

        if session.update_draft(draft) {
            session.wait_until_loaded().await;
            check_loaded(session)?;
            continue;
        }

        session.start_submit();
        let outcome = session
            .wait_for_outcome()
            .await
            .ok_or_else(|| AppError::other("The submit was interrupted"))?;

        let result = outcome.map_err(AppError::from);
        if let Ok(issue) = &result {
            announce_created(host, issue);
        }
        let (returned, (result, reported)) = blocking(frontend, move |frontend: &mut dyn FormFrontend| {
            let reported = frontend.report_result(&result);
            (result, reported)
        })
        .await?;
        frontend = returned;
        if let Err(e) = reported {
            warn!("Could not report the result: {:#}", e);
        }

        match result {
            Ok(issue) => return Ok(FormOutcome::Created(issue)),
            Err(e) if e.is_recoverable() => {
                debug!("Showing the form again after: {}", e);
            }
            Err(e) => {
                error!("Issue creation failed: {}", e);
                return Ok(FormOutcome::Failed);
            }
        }
    }
}

/// Fail on load errors the form cannot recover from.
fn check_loaded(session: &FormSession) -> Result<()> {
    match session.last_error() {
        Some(e) if e.is_auth() => Err(AppError::Api(e.clone())),
        _ => Ok(()),
    }
}

/// Run a blocking frontend call off the async threads, handing the frontend back.
async fn blocking<T, F>(
    mut frontend: Box<dyn FormFrontend>,
    f: F,
) -> Result<(Box<dyn FormFrontend>, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn FormFrontend) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let out = f(frontend.as_mut());
        (frontend, out)
    })
    .await
    .map_err(|e| AppError::frontend(format!("form task failed: {}", e)))
}

fn run_cache(cli: &Cli, action: CacheAction) -> Result<ExitCode> {
    let settings = Config::load_settings(cli.config.as_deref())?;
    let dir = settings
        .cache_dir()
        .ok_or(AppError::Config(ConfigError::NoConfigDir))?;
    let cache = MetadataCache::open(dir);

    match action {
        CacheAction::List => write_cache_listing(&cache, &mut io::stdout().lock())?,
        CacheAction::Clear => {
            let count = cache.entries().len();
            cache.clear()?;
            info!("Cleared {} cache entries", count);
            println!("Cleared {} cache entries", count);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Print one line per cache entry and the disk usage.
pub fn write_cache_listing(cache: &MetadataCache, out: &mut impl Write) -> io::Result<()> {
    let now = now_secs();
    let entries = cache.entries();
    if entries.is_empty() {
        writeln!(out, "Cache is empty")?;
    }
    for entry in &entries {
        let age = Duration::from_secs(now.saturating_sub(entry.fetched_at));
        writeln!(
            out,
            "{:<32} {:>8} old  ttl {:>6}  {}",
            entry.key.to_string(),
            format_duration(age),
            format_duration(entry.ttl),
            if entry.valid { "valid" } else { "expired" }
        )?;
    }

    let (files, bytes) = cache.disk_usage();
    match cache.dir() {
        Some(dir) => writeln!(out, "{} files, {} bytes in {}", files, bytes, dir.display())?,
        None => writeln!(out, "Not stored on disk")?,
    }
    Ok(())
}

/// Largest whole unit, e.g. "10m" or "24h".
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}

fn set_token(email: &str) -> Result<ExitCode> {
    eprint!("API token for {}: ", email);
    io::stderr().flush()?;

    let mut token = String::new();
    io::stdin().lock().read_line(&mut token)?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::Missing("JIRA_API_TOKEN").into());
    }

    store_token(email, token)?;
    eprintln!("Token stored in the keyring.");
    Ok(ExitCode::SUCCESS)
}
