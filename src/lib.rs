//! jira-quick-create - create JIRA issues from a launcher with a small form.
//!
//! The form's pickers are served from [`cache::MetadataCache`], the draft
//! lives in a [`session::FormSession`], and [`create::IssueCreator`] turns a
//! finished draft into one `POST /rest/api/3/issue` call.

pub mod api;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod create;
pub mod document;
pub mod error;
pub mod frontend;
pub mod host;
pub mod logging;
pub mod resolver;
pub mod session;
