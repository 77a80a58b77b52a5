//! Desktop side effects after an issue is created.
//!
//! All of these are best effort: a missing clipboard tool or notification
//! daemon is logged and otherwise ignored.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::create::CreatedIssue;

/// Things the binary asks the desktop to do.
pub trait HostEffects {
    /// Put `text` on the clipboard.
    fn copy_to_clipboard(&self, text: &str) -> io::Result<()>;

    /// Open `url` in the default browser.
    fn open_url(&self, url: &str) -> io::Result<()>;

    /// Show a desktop notification.
    fn notify(&self, title: &str, body: &str) -> io::Result<()>;
}

/// Uses `wl-copy`, `notify-send` and the platform's URL opener.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopHost;

impl HostEffects for DesktopHost {
    fn copy_to_clipboard(&self, text: &str) -> io::Result<()> {
        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }
        exit_ok("wl-copy", child.wait()?)
    }

    fn open_url(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }

    fn notify(&self, title: &str, body: &str) -> io::Result<()> {
        let status = Command::new("notify-send")
            .arg(title)
            .arg(body)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        exit_ok("notify-send", status)
    }
}

fn exit_ok(program: &str, status: std::process::ExitStatus) -> io::Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("{} exited with {}", program, status)))
    }
}

/// Copy the issue key, open the issue and tell the user.
pub fn announce_created(host: &dyn HostEffects, issue: &CreatedIssue) {
    info!("Created {} at {}", issue.key, issue.url);

    let copied = match host.copy_to_clipboard(&issue.key) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not copy {} to the clipboard: {}", issue.key, e);
            false
        }
    };
    if let Err(e) = host.open_url(&issue.url) {
        warn!("Could not open {}: {}", issue.url, e);
    }

    let body = if copied {
        format!("Created {} (copied to clipboard): {}", issue.key, issue.url)
    } else {
        format!("{} created: {}", issue.key, issue.url)
    };
    if let Err(e) = host.notify("Jira issue created", &body) {
        warn!("Could not show notification: {}", e);
    }
}

/// Notify about an error, for failures that happen before any form is shown.
pub fn announce_error(host: &dyn HostEffects, message: &str) {
    if let Err(e) = host.notify("Jira Create - Error", message) {
        warn!("Could not show notification: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        fail_clipboard: bool,
        events: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl HostEffects for RecordingHost {
        fn copy_to_clipboard(&self, text: &str) -> io::Result<()> {
            if self.fail_clipboard {
                return Err(io::Error::new(io::ErrorKind::NotFound, "wl-copy"));
            }
            self.events.lock().unwrap().push(format!("copy {}", text));
            Ok(())
        }

        fn open_url(&self, url: &str) -> io::Result<()> {
            self.events.lock().unwrap().push(format!("open {}", url));
            Ok(())
        }

        fn notify(&self, title: &str, body: &str) -> io::Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("notify {}: {}", title, body));
            Ok(())
        }
    }

    fn created() -> CreatedIssue {
        CreatedIssue {
            key: "PROJ-42".to_string(),
            url: "https://x.atlassian.net/browse/PROJ-42".to_string(),
        }
    }

    #[test]
    fn test_announce_created() {
        let host = RecordingHost::default();
        announce_created(&host, &created());
        assert_eq!(
            host.events(),
            vec![
                "copy PROJ-42",
                "open https://x.atlassian.net/browse/PROJ-42",
                "notify Jira issue created: Created PROJ-42 (copied to clipboard): https://x.atlassian.net/browse/PROJ-42",
            ]
        );
    }

    #[test]
    fn test_clipboard_failure_puts_link_in_notification() {
        let host = RecordingHost {
            fail_clipboard: true,
            ..RecordingHost::default()
        };
        announce_created(&host, &created());
        let events = host.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            "notify Jira issue created: PROJ-42 created: https://x.atlassian.net/browse/PROJ-42"
        );
    }

    #[test]
    fn test_announce_error() {
        let host = RecordingHost::default();
        announce_error(&host, "JIRA_EMAIL is not configured");
        assert_eq!(
            host.events(),
            vec!["notify Jira Create - Error: JIRA_EMAIL is not configured"]
        );
    }
}
