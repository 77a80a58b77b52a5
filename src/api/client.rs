//! JIRA API client implementation.
//!
//! This module provides the client for the JIRA REST API v3 endpoints the
//! issue form uses. It handles authentication, request/response processing
//! and status mapping. The only retry it performs is a single backoff after
//! an HTTP 429; everything else is surfaced to the caller.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument, warn};

use super::auth::Auth;
use super::error::{ApiError, Result};
use super::types::{
    AssigneeSummary, CreateIssueRequest, CreateMeta, CreateMetaProject, CreatedIssueResponse,
    EpicSummary, FieldSchema, IssueSearchResponse, IssueTypeSummary, ProjectSearchPage,
    ProjectSummary, User,
};
use super::JiraApi;
use crate::config::Credentials;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Default wait before the single retry after a 429, in seconds.
pub const DEFAULT_RATE_LIMIT_BACKOFF_SECS: u64 = 2;

/// Upper bound for a server-provided `Retry-After`.
const MAX_RATE_LIMIT_BACKOFF_SECS: u64 = 30;

/// Page size for paginated and capped listings.
const PAGE_SIZE: u32 = 50;

/// Tunables for the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Wait before retrying a rate-limited request when the server does not
    /// send `Retry-After`.
    pub rate_limit_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rate_limit_backoff: Duration::from_secs(DEFAULT_RATE_LIMIT_BACKOFF_SECS),
        }
    }
}

/// The JIRA API client.
#[derive(Debug, Clone)]
pub struct JiraClient {
    /// The HTTP client.
    client: Client,
    /// The base URL for the JIRA instance.
    base_url: String,
    /// Authentication credentials.
    auth: Auth,
    /// Timeout and backoff settings.
    options: ClientOptions,
}

impl JiraClient {
    /// Create a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[instrument(skip(credentials, options), fields(base_url = %credentials.base_url))]
    pub fn new(credentials: &Credentials, options: ClientOptions) -> Result<Self> {
        info!("Creating JIRA client");
        Self::with_options(
            &credentials.base_url,
            &credentials.email,
            credentials.api_token(),
            options,
        )
    }

    /// Create a new JIRA client with explicit credentials and default options.
    pub fn with_credentials(base_url: &str, email: &str, token: &str) -> Result<Self> {
        Self::with_options(base_url, email, token, ClientOptions::default())
    }

    /// Create a new JIRA client with explicit credentials and options.
    pub fn with_options(
        base_url: &str,
        email: &str,
        token: &str,
        options: ClientOptions,
    ) -> Result<Self> {
        let auth = Auth::new(email, token);
        let client = Self::build_http_client(options.timeout)?;
        let base_url = normalize_base_url(base_url);

        Ok(Self {
            client,
            base_url,
            auth,
            options,
        })
    }

    /// Build the HTTP client with appropriate settings.
    fn build_http_client(timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::from)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform a GET request with authentication and error handling.
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send_with_backoff(|| self.client.get(url)).await
    }

    /// Perform a POST request with a JSON body.
    async fn post<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_backoff(|| self.client.post(url).json(body)).await
    }

    /// Send a request, retrying exactly once if the server rate-limits it.
    ///
    /// A 429 means the request was not processed, so replaying it is safe
    /// even for issue creation.
    async fn send_with_backoff<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        match self.execute::<T>(build()).await {
            Err(ApiError::RateLimited { retry_after }) => {
                let delay = self.backoff_delay(retry_after);
                warn!("Rate limited, retrying once in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
                self.execute::<T>(build()).await
            }
            other => other,
        }
    }

    /// Execute a single request.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(header::AUTHORIZATION, self.auth.header_value())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle the HTTP response, checking for errors and parsing JSON.
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
        } else {
            let retry_after = parse_retry_after(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            debug!("Error response body: {}", error_body);

            Err(Self::error_from_response(status, &url, &error_body, retry_after))
        }
    }

    /// Create an appropriate error from an HTTP response.
    fn error_from_response(
        status: StatusCode,
        url: &str,
        body: &str,
        retry_after: Option<Duration>,
    ) -> ApiError {
        let (messages, field_errors) = parse_error_body(body);

        match status.as_u16() {
            429 => ApiError::RateLimited { retry_after },
            401 | 403 | 404 => {
                let context = if messages.is_empty() {
                    url.to_string()
                } else {
                    messages.join(", ")
                };
                ApiError::from_status(status, &context)
            }
            400..=499 if !messages.is_empty() || !field_errors.is_empty() => {
                ApiError::BadRequest {
                    messages,
                    field_errors,
                }
            }
            _ => ApiError::from_status(status, url),
        }
    }

    /// The wait before the rate-limit retry.
    fn backoff_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.options.rate_limit_backoff)
            .min(Duration::from_secs(MAX_RATE_LIMIT_BACKOFF_SECS))
    }

    /// Fetch the create metadata for one project.
    async fn create_meta(&self, project_key: &str, expand: &str) -> Result<CreateMetaProject> {
        let url = format!(
            "{}/rest/api/3/issue/createmeta?projectKeys={}&expand={}",
            self.base_url,
            urlencoding::encode(project_key),
            expand
        );

        let meta: CreateMeta = self.get(&url).await?;
        let mut projects = meta.projects;
        if projects.is_empty() {
            return Err(ApiError::NotFound(format!("project '{}'", project_key)));
        }

        let position = projects
            .iter()
            .position(|p| p.key.eq_ignore_ascii_case(project_key))
            .unwrap_or(0);
        Ok(projects.swap_remove(position))
    }
}

#[async_trait]
impl JiraApi for JiraClient {
    /// Calls `GET /rest/api/3/project/search` until the last page.
    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let mut start_at = 0u32;
        let mut projects = Vec::new();

        loop {
            let url = format!(
                "{}/rest/api/3/project/search?startAt={}&maxResults={}",
                self.base_url, start_at, PAGE_SIZE
            );
            let page: ProjectSearchPage = self.get(&url).await?;
            let fetched = page.values.len() as u32;

            projects.extend(
                page.values
                    .into_iter()
                    .filter(|p| !p.key.is_empty())
                    .map(|p| ProjectSummary {
                        key: p.key,
                        name: p.name,
                        id: p.id,
                    }),
            );

            if page.is_last || fetched == 0 {
                break;
            }
            start_at += fetched;
        }

        projects.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.name.cmp(&b.name)));
        debug!("Fetched {} projects", projects.len());
        Ok(projects)
    }

    #[instrument(skip(self))]
    async fn list_issue_types(&self, project_key: &str) -> Result<Vec<IssueTypeSummary>> {
        let project = self.create_meta(project_key, "projects.issuetypes").await?;

        let mut types: Vec<IssueTypeSummary> = project
            .issuetypes
            .into_iter()
            .filter(|t| !t.id.is_empty() && !t.subtask)
            .map(|t| IssueTypeSummary {
                id: t.id,
                name: t.name,
                project_key: project_key.to_string(),
            })
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Fetched {} issue types", types.len());
        Ok(types)
    }

    /// Calls `GET /rest/api/3/search/jql` for the project's epics.
    #[instrument(skip(self))]
    async fn search_epics(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> Result<Vec<EpicSummary>> {
        let jql = epic_jql(project_key, filter);
        let url = format!(
            "{}/rest/api/3/search/jql?jql={}&maxResults={}&fields=summary",
            self.base_url,
            urlencoding::encode(&jql),
            PAGE_SIZE
        );

        let response: IssueSearchResponse = self.get(&url).await?;
        let epics: Vec<EpicSummary> = response
            .issues
            .into_iter()
            .filter(|i| !i.key.is_empty())
            .map(|i| EpicSummary {
                key: i.key,
                summary: i.fields.summary.unwrap_or_default(),
            })
            .collect();

        debug!("Fetched {} epics", epics.len());
        Ok(epics)
    }

    /// Calls `GET /rest/api/3/user/assignable/search`.
    #[instrument(skip(self))]
    async fn search_assignable_users(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> Result<Vec<AssigneeSummary>> {
        let mut url = format!(
            "{}/rest/api/3/user/assignable/search?project={}&maxResults={}",
            self.base_url,
            urlencoding::encode(project_key),
            PAGE_SIZE
        );
        if let Some(query) = filter.map(str::trim).filter(|q| !q.is_empty()) {
            url.push_str(&format!("&query={}", urlencoding::encode(query)));
        }

        let users: Vec<User> = self.get(&url).await?;
        let mut assignees: Vec<AssigneeSummary> = users
            .into_iter()
            .filter(|u| u.active && !u.account_id.is_empty() && !u.display_name.is_empty())
            .map(|u| AssigneeSummary {
                account_id: u.account_id,
                display_name: u.display_name,
            })
            .collect();
        assignees.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        debug!("Fetched {} assignable users", assignees.len());
        Ok(assignees)
    }

    #[instrument(skip(self))]
    async fn create_field_schema(&self, project_key: &str) -> Result<Vec<FieldSchema>> {
        let project = self
            .create_meta(project_key, "projects.issuetypes.fields")
            .await?;

        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for issue_type in project.issuetypes {
            for (id, meta) in issue_type.fields {
                if seen.insert(id.clone()) {
                    fields.push(FieldSchema {
                        id,
                        name: meta.name,
                        custom_type: meta.schema.and_then(|s| s.custom),
                    });
                }
            }
        }

        debug!("Fetched {} create fields", fields.len());
        Ok(fields)
    }

    /// Calls `POST /rest/api/3/issue`.
    #[instrument(skip(self, request), fields(project = %request.fields.project.key))]
    async fn create_issue(&self, request: &CreateIssueRequest) -> Result<CreatedIssueResponse> {
        let url = format!("{}/rest/api/3/issue", self.base_url);
        let created: CreatedIssueResponse = self.post(&url, request).await?;

        if created.key.is_empty() {
            return Err(ApiError::InvalidResponse(
                "issue created but no key returned".to_string(),
            ));
        }

        info!("Created issue {}", created.key);
        Ok(created)
    }
}

/// Build the JQL for a project's epics, newest activity first.
fn epic_jql(project_key: &str, filter: Option<&str>) -> String {
    let mut jql = format!(
        "project = \"{}\" AND issuetype = Epic",
        escape_jql(project_key)
    );
    if let Some(text) = filter.map(str::trim).filter(|t| !t.is_empty()) {
        jql.push_str(&format!(" AND summary ~ \"{}*\"", escape_jql(text)));
    }
    jql.push_str(" ORDER BY updated DESC");
    jql
}

/// Escape a value for use inside a double-quoted JQL string.
fn escape_jql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract `errorMessages` and `errors` from a JIRA error body.
fn parse_error_body(body: &str) -> (Vec<String>, BTreeMap<String, String>) {
    let mut messages = Vec::new();
    let mut field_errors = BTreeMap::new();

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(arr) = json.get("errorMessages").and_then(|m| m.as_array()) {
            messages.extend(arr.iter().filter_map(|v| v.as_str()).map(str::to_string));
        }
        if let Some(obj) = json.get("errors").and_then(|e| e.as_object()) {
            for (field, message) in obj {
                let message = message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string());
                field_errors.insert(field.clone(), message);
            }
        }
    }

    (messages, field_errors)
}

/// Read a `Retry-After` header given in seconds.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Normalize the base URL by removing trailing slashes.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    // Warn if not HTTPS (but don't enforce for localhost/testing)
    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("URL does not use HTTPS: {}. This is insecure for production use.", url);
    }

    url.to_string()
}
