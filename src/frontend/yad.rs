//! YAD dialog renderer.
//!
//! The whole form is a single `yad --form` dialog. Pickers are combo boxes
//! whose items are `!`-separated and the dialog prints the chosen values
//! `|`-separated on stdout, which is parsed back into an [`IssueDraft`].

use std::io::{self, Write};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

use super::{describe_error, FormFrontend, FormView};
use crate::api::types::AssigneeSummary;
use crate::create::{CreatedIssue, IssueDraft};
use crate::error::AppError;

/// Combo box entry for "no epic".
const NO_EPIC: &str = "No Epic";

/// Combo box entry for "no assignee".
const UNASSIGNED: &str = "Unassigned";

/// Length of the account id prefix shown next to assignee names.
const ACCOUNT_PREFIX_LEN: usize = 8;

/// Errors from running YAD.
#[derive(Debug, Error)]
pub enum YadError {
    /// The `yad` binary could not be started.
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Writing to or reading from the dialog failed.
    #[error("Failed to talk to the dialog: {0}")]
    Io(#[from] io::Error),

    /// `get_draft` was called before `render_form`.
    #[error("No form has been rendered")]
    NotRendered,
}

/// Renders the form with YAD.
#[derive(Debug, Clone)]
pub struct YadFrontend {
    program: String,
    view: Option<FormView>,
}

impl Default for YadFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl YadFrontend {
    pub fn new() -> Self {
        Self::with_program("yad")
    }

    /// Use a different executable, for wrappers or testing.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            view: None,
        }
    }

    fn run(&self, args: &[String], stdin: Option<&str>) -> Result<std::process::Output, YadError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| YadError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes())?;
        }
        Ok(child.wait_with_output()?)
    }
}

impl FormFrontend for YadFrontend {
    fn render_form(&mut self, view: &FormView) -> anyhow::Result<()> {
        self.view = Some(view.clone());
        Ok(())
    }

    fn get_draft(&mut self) -> anyhow::Result<Option<IssueDraft>> {
        let view = self.view.as_ref().ok_or(YadError::NotRendered)?;
        let output = self.run(&form_args(view), None)?;
        if !output.status.success() {
            debug!("YAD form closed with {:?}", output.status.code());
            return Ok(None);
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let draft = parse_form_output(&raw, view);
        if draft.is_none() {
            warn!("Could not parse YAD output ({} bytes)", raw.len());
        }
        Ok(draft)
    }

    fn report_result(&mut self, result: &Result<CreatedIssue, AppError>) -> anyhow::Result<()> {
        // Success is announced by the host (notification, clipboard, browser).
        if let Err(error) = result {
            let title = if error.is_critical() {
                "Jira Create - Error"
            } else {
                "Jira Create - Issue not created"
            };
            let text = describe_error(error);
            self.run(&error_args(title), Some(text.as_str()))?;
        }
        Ok(())
    }
}

/// Arguments for the form dialog.
pub fn form_args(view: &FormView) -> Vec<String> {
    let draft = &view.draft;

    let mut projects: Vec<String> = view.projects.iter().map(|p| clean_item(&p.to_string())).collect();
    prefer(&mut projects, |item| {
        project_key_of(item).eq_ignore_ascii_case(&draft.project_key)
    });

    let mut issue_types: Vec<String> = view.issue_types.iter().map(|t| clean_item(&t.name)).collect();
    if let Some(selected) = view.issue_types.iter().find(|t| t.id == draft.issue_type_id) {
        let name = clean_item(&selected.name);
        prefer(&mut issue_types, |item| *item == name);
    }

    let mut epics: Vec<String> = std::iter::once(NO_EPIC.to_string())
        .chain(view.epics.iter().map(|e| clean_item(&e.to_string())))
        .collect();
    if let Some(epic_key) = draft.epic() {
        prefer(&mut epics, |item| project_key_of(item).eq_ignore_ascii_case(epic_key));
    }

    let mut assignees: Vec<String> = std::iter::once(UNASSIGNED.to_string())
        .chain(view.assignees.iter().map(assignee_item))
        .collect();
    if let Some(selected) = view.assignees.iter().find(|a| Some(a.account_id.as_str()) == draft.assignee()) {
        let item = assignee_item(selected);
        prefer(&mut assignees, |candidate| *candidate == item);
    }

    let mut text = String::new();
    for notice in &view.notices {
        text.push_str(notice);
        text.push('\n');
    }

    let mut args: Vec<String> = [
        "--form",
        "--title=Create Jira Issue",
        "--width=860",
        "--height=580",
        "--center",
        "--on-top",
        "--modal",
        "--fixed",
        "--skip-taskbar",
        "--separator=|",
        "--borders=22",
        "--button-layout=end",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if !text.is_empty() {
        args.push(format!("--text={}", text.trim_end()));
    }

    args.extend([
        "--field=Project:CB".to_string(),
        projects.join("!"),
        "--field=Issue Type:CB".to_string(),
        issue_types.join("!"),
        "--field=Summary".to_string(),
        draft.summary.clone(),
        "--field=Epic:CB".to_string(),
        epics.join("!"),
        "--field=Description:TXT".to_string(),
        draft.description.clone(),
        "--field=Assignee:CB".to_string(),
        assignees.join("!"),
        "--button=Create Issue:0".to_string(),
        "--button=Cancel:1".to_string(),
    ]);
    args
}

fn error_args(title: &str) -> Vec<String> {
    vec![
        format!("--title={}", title),
        "--width=800".to_string(),
        "--height=500".to_string(),
        "--center".to_string(),
        "--text-info".to_string(),
        "--wrap".to_string(),
        "--button=Close:0".to_string(),
    ]
}

/// Parse the dialog's stdout.
///
/// The summary and description are free text and may contain the field
/// separator, so only the combo values are used as anchors: project and issue
/// type from the left, assignee from the right, and the epic as the first
/// segment after the summary that is one of the epic combo items.
///
/// Returns `None` if the output does not have all six fields. Names that do
/// not match anything in `view` leave the corresponding draft field empty.
pub fn parse_form_output(raw: &str, view: &FormView) -> Option<IssueDraft> {
    let raw = raw.trim_end_matches(['\n', '\r']);
    let raw = raw.strip_suffix('|').unwrap_or(raw);

    let mut head = raw.splitn(3, '|');
    let project = head.next()?;
    let issue_type_name = head.next()?.trim();
    let (middle, assignee) = head.next()?.rsplit_once('|')?;
    let (summary, epic, description) = split_free_text(middle, &epic_items(view))?;

    let issue_type_id = view
        .issue_types
        .iter()
        .find(|t| clean_item(&t.name).trim().eq_ignore_ascii_case(issue_type_name))
        .map(|t| t.id.clone())
        .unwrap_or_default();

    Some(IssueDraft {
        project_key: project_key_of(project).to_uppercase(),
        issue_type_id,
        summary: summary.trim().to_string(),
        epic_key: parse_epic(epic),
        // YAD escapes newlines in text fields.
        description: description.replace("\\n", "\n"),
        assignee_id: parse_assignee(assignee, &view.assignees),
    })
}

/// Every item the epic combo box offers.
fn epic_items(view: &FormView) -> Vec<String> {
    std::iter::once(NO_EPIC.to_string())
        .chain(view.epics.iter().map(|e| clean_item(&e.to_string())))
        .collect()
}

/// Split `summary|epic|description` where the epic is one of `epic_items`.
///
/// Falls back to the first two separators when no segment is a known item.
fn split_free_text<'a>(
    middle: &'a str,
    epic_items: &[String],
) -> Option<(&'a str, &'a str, &'a str)> {
    let mut first = None;
    for (i, _) in middle.match_indices('|') {
        let Some((epic, description)) = middle[i + 1..].split_once('|') else {
            break;
        };
        let candidate = (&middle[..i], epic, description);
        if epic_items.iter().any(|item| item.trim() == epic.trim()) {
            return Some(candidate);
        }
        first.get_or_insert(candidate);
    }
    first
}

/// The key part of a "KEY - Name" item.
fn project_key_of(item: &str) -> &str {
    item.split(" - ").next().unwrap_or_default().trim()
}

fn parse_epic(item: &str) -> Option<String> {
    let item = item.trim();
    if item.is_empty() || item.to_lowercase().starts_with("no epic") {
        return None;
    }
    Some(project_key_of(item).to_uppercase())
}

fn parse_assignee(item: &str, assignees: &[AssigneeSummary]) -> Option<String> {
    let item = item.trim();
    if item.is_empty() || item.to_lowercase().starts_with("unassigned") {
        return None;
    }

    if let Some((_, rest)) = item.rsplit_once('(') {
        if let Some((prefix, _)) = rest.split_once(')') {
            let prefix = prefix.trim();
            if let Some(found) = assignees.iter().find(|a| a.account_id.starts_with(prefix)) {
                return Some(found.account_id.clone());
            }
        }
    }

    let display = item.split(" (").next().unwrap_or_default().trim();
    assignees
        .iter()
        .find(|a| a.display_name == display)
        .map(|a| a.account_id.clone())
}

fn assignee_item(assignee: &AssigneeSummary) -> String {
    let prefix: String = assignee.account_id.chars().take(ACCOUNT_PREFIX_LEN).collect();
    clean_item(&format!("{} ({})", assignee.display_name, prefix))
}

/// Strip the characters YAD uses as item and field separators.
fn clean_item(item: &str) -> String {
    item.replace(['!', '|'], " ")
}

/// Move the first item matching `pred` to the front, since YAD preselects it.
fn prefer(items: &mut [String], pred: impl Fn(&String) -> bool) {
    if let Some(pos) = items.iter().position(pred) {
        items[..=pos].rotate_right(1);
    }
}
