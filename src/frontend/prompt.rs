//! Line-based terminal renderer.
//!
//! Shows numbered lists and asks for one field at a time. Every prompt keeps
//! the current value on an empty answer; `-` clears an optional field.

use std::io::{self, BufRead, BufReader, Stderr, Stdin, Write};

use super::{describe_error, FormFrontend, FormView};
use crate::create::{CreatedIssue, IssueDraft};
use crate::error::AppError;

/// Answer that clears an optional field.
const CLEAR: &str = "-";

/// Line that ends the description.
const END_OF_TEXT: &str = ".";

/// Asks for the form fields on a terminal.
pub struct PromptFrontend<R, W> {
    input: R,
    output: W,
    view: FormView,
}

impl PromptFrontend<BufReader<Stdin>, Stderr> {
    /// Read from stdin and write to stderr, keeping stdout free.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptFrontend<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            view: FormView::default(),
        }
    }

    /// Consume the frontend and return its output.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Ask a question. `None` on end of input.
    fn ask(&mut self, question: &str, current: &str) -> io::Result<Option<String>> {
        if current.is_empty() {
            write!(self.output, "{}: ", question)?;
        } else {
            write!(self.output, "{} [{}]: ", question, current)?;
        }
        self.output.flush()?;
        self.read_line()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn ask_project(&mut self, draft: &IssueDraft) -> io::Result<Option<String>> {
        let Some(answer) = self.ask("Project", &draft.project_key)? else {
            return Ok(None);
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Some(draft.project_key.clone()));
        }
        let key = match pick(answer, &self.view.projects) {
            Some(project) => project.key.clone(),
            None => answer.to_uppercase(),
        };
        Ok(Some(key))
    }

    fn ask_issue_type(&mut self, draft: &IssueDraft) -> io::Result<Option<String>> {
        let current = self
            .view
            .issue_types
            .iter()
            .find(|t| t.id == draft.issue_type_id)
            .map(|t| t.name.clone())
            .unwrap_or_default();

        loop {
            let Some(answer) = self.ask("Issue type", &current)? else {
                return Ok(None);
            };
            let answer = answer.trim();
            if answer.is_empty() {
                return Ok(Some(draft.issue_type_id.clone()));
            }
            let found = pick(answer, &self.view.issue_types).or_else(|| {
                self.view
                    .issue_types
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(answer))
            });
            match found {
                Some(issue_type) => return Ok(Some(issue_type.id.clone())),
                None => writeln!(self.output, "Unknown issue type '{}'.", answer)?,
            }
        }
    }

    fn ask_epic(&mut self, draft: &IssueDraft) -> io::Result<Option<Option<String>>> {
        let current = draft.epic().unwrap_or_default().to_string();
        let Some(answer) = self.ask("Epic (- for none)", &current)? else {
            return Ok(None);
        };
        let answer = answer.trim();
        let epic = if answer.is_empty() {
            draft.epic_key.clone()
        } else if answer == CLEAR {
            None
        } else {
            match pick(answer, &self.view.epics) {
                Some(epic) => Some(epic.key.clone()),
                None => Some(answer.to_uppercase()),
            }
        };
        Ok(Some(epic))
    }

    fn ask_description(&mut self, draft: &IssueDraft) -> io::Result<Option<String>> {
        writeln!(
            self.output,
            "Description (end with a line containing only '{}', leave empty to keep):",
            END_OF_TEXT
        )?;
        self.output.flush()?;

        let mut lines = Vec::new();
        loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.trim() == END_OF_TEXT => break,
                Some(line) => lines.push(line),
            }
        }
        if lines.is_empty() {
            return Ok(Some(draft.description.clone()));
        }
        Ok(Some(lines.join("\n")))
    }

    fn ask_assignee(&mut self, draft: &IssueDraft) -> io::Result<Option<Option<String>>> {
        let current = self
            .view
            .assignees
            .iter()
            .find(|a| Some(a.account_id.as_str()) == draft.assignee())
            .map(|a| a.display_name.clone())
            .unwrap_or_default();

        loop {
            let Some(answer) = self.ask("Assignee (- for unassigned)", &current)? else {
                return Ok(None);
            };
            let answer = answer.trim();
            if answer.is_empty() {
                return Ok(Some(draft.assignee_id.clone()));
            }
            if answer == CLEAR {
                return Ok(Some(None));
            }
            let found = pick(answer, &self.view.assignees).or_else(|| {
                self.view
                    .assignees
                    .iter()
                    .find(|a| a.display_name.eq_ignore_ascii_case(answer))
            });
            match found {
                Some(user) => return Ok(Some(Some(user.account_id.clone()))),
                None => writeln!(self.output, "Unknown assignee '{}'.", answer)?,
            }
        }
    }

    fn confirm(&mut self) -> io::Result<bool> {
        write!(self.output, "Create issue? [Y/n]: ")?;
        self.output.flush()?;
        Ok(match self.read_line()? {
            None => false,
            Some(answer) => !answer.trim().to_lowercase().starts_with('n'),
        })
    }

    fn collect(&mut self) -> io::Result<Option<IssueDraft>> {
        let mut draft = self.view.draft.clone();

        let Some(project_key) = self.ask_project(&draft)? else {
            return Ok(None);
        };
        if !project_key.eq_ignore_ascii_case(&draft.project_key) {
            // The caller reloads the pickers for the new project and asks again.
            draft.project_key = project_key;
            return Ok(Some(draft));
        }

        let Some(issue_type_id) = self.ask_issue_type(&draft)? else {
            return Ok(None);
        };
        draft.issue_type_id = issue_type_id;

        let Some(summary) = self.ask("Summary", &draft.summary)? else {
            return Ok(None);
        };
        if !summary.trim().is_empty() {
            draft.summary = summary.trim().to_string();
        }

        let Some(epic_key) = self.ask_epic(&draft)? else {
            return Ok(None);
        };
        draft.epic_key = epic_key;

        let Some(description) = self.ask_description(&draft)? else {
            return Ok(None);
        };
        draft.description = description;

        let Some(assignee_id) = self.ask_assignee(&draft)? else {
            return Ok(None);
        };
        draft.assignee_id = assignee_id;

        if !self.confirm()? {
            return Ok(None);
        }
        Ok(Some(draft))
    }
}

impl<R, W> FormFrontend for PromptFrontend<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn render_form(&mut self, view: &FormView) -> anyhow::Result<()> {
        self.view = view.clone();
        let out = &mut self.output;

        writeln!(out)?;
        writeln!(out, "== Create Jira Issue ==")?;
        for notice in &view.notices {
            writeln!(out, "! {}", notice)?;
        }
        write_list(out, "Projects", &view.projects)?;
        write_list(out, "Issue types", &view.issue_types)?;
        write_list(out, "Epics", &view.epics)?;
        write_list(out, "Assignees", &view.assignees)?;
        out.flush()?;
        Ok(())
    }

    fn get_draft(&mut self) -> anyhow::Result<Option<IssueDraft>> {
        Ok(self.collect()?)
    }

    fn report_result(&mut self, result: &Result<CreatedIssue, AppError>) -> anyhow::Result<()> {
        match result {
            Ok(issue) => writeln!(self.output, "Created {}: {}", issue.key, issue.url)?,
            Err(error) => writeln!(self.output, "Error: {}", describe_error(error))?,
        }
        self.output.flush()?;
        Ok(())
    }
}

fn write_list<T: std::fmt::Display>(out: &mut impl Write, title: &str, items: &[T]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}:", title)?;
    for (i, item) in items.iter().enumerate() {
        writeln!(out, "  {:>2}) {}", i + 1, item)?;
    }
    Ok(())
}

/// Resolve a 1-based list number.
fn pick<'a, T>(answer: &str, items: &'a [T]) -> Option<&'a T> {
    let n: usize = answer.parse().ok()?;
    n.checked_sub(1).and_then(|i| items.get(i))
}
