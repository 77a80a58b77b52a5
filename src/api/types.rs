//! JIRA API request and response types.
//!
//! The `*Summary` types are the trimmed-down records the form works with and
//! the cache stores. The remaining types model the REST API v3 payloads they
//! are extracted from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// A project the user can create issues in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    /// The project key (e.g., "PROJ").
    pub key: String,
    /// The project name.
    pub name: String,
    /// The project ID.
    pub id: String,
}

impl fmt::Display for ProjectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.key, self.name)
    }
}

/// An issue type available in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeSummary {
    /// The issue type ID.
    pub id: String,
    /// The issue type name (Bug, Story, Task...).
    pub name: String,
    /// The project this type was listed for.
    pub project_key: String,
}

impl fmt::Display for IssueTypeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An epic issues can be linked under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicSummary {
    /// The epic's issue key.
    pub key: String,
    /// The epic's summary line.
    pub summary: String,
}

impl fmt::Display for EpicSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.key, self.summary)
    }
}

/// A user that can be assigned issues in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeSummary {
    /// The user's account ID.
    pub account_id: String,
    /// The user's display name.
    pub display_name: String,
}

impl fmt::Display for AssigneeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

/// Identifier of the custom field holding an issue's epic (e.g. "customfield_10014").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpicLinkFieldId(pub String);

impl EpicLinkFieldId {
    /// The raw field id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EpicLinkFieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a project attaches an issue to its epic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "lowercase")]
pub enum EpicLink {
    /// The epic key goes into an instance-specific custom field.
    Field(EpicLinkFieldId),
    /// The epic is set as the issue's `parent`.
    Parent,
}

/// One page of `GET /rest/api/3/project/search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSearchPage {
    /// The projects on this page.
    #[serde(default)]
    pub values: Vec<ProjectRecord>,
    /// Whether this is the last page.
    #[serde(default = "default_true")]
    pub is_last: bool,
}

fn default_true() -> bool {
    true
}

/// A project as returned by the project search.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRecord {
    /// The project ID.
    #[serde(default)]
    pub id: String,
    /// The project key.
    #[serde(default)]
    pub key: String,
    /// The project name.
    #[serde(default)]
    pub name: String,
}

/// Response of `GET /rest/api/3/issue/createmeta`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeta {
    /// Matching projects; empty when the key is unknown or not creatable.
    #[serde(default)]
    pub projects: Vec<CreateMetaProject>,
}

/// A project entry in the create metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMetaProject {
    /// The project key.
    #[serde(default)]
    pub key: String,
    /// Issue types that can be created in the project.
    #[serde(default)]
    pub issuetypes: Vec<CreateMetaIssueType>,
}

/// An issue type entry in the create metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMetaIssueType {
    /// The issue type ID.
    #[serde(default)]
    pub id: String,
    /// The issue type name.
    #[serde(default)]
    pub name: String,
    /// Whether this is a subtask type.
    #[serde(default)]
    pub subtask: bool,
    /// Field id to field metadata; only present with `expand=...fields`.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMeta>,
}

/// Metadata of one field on the create screen.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMeta {
    /// The field's display name.
    #[serde(default)]
    pub name: String,
    /// The field's type information.
    #[serde(default)]
    pub schema: Option<FieldTypeSchema>,
}

/// Type information of a field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldTypeSchema {
    /// The JSON type (string, any, array...).
    #[serde(rename = "type", default)]
    pub field_type: String,
    /// Plugin key for custom fields.
    #[serde(default)]
    pub custom: Option<String>,
}

/// A field on a project's create screen, flattened from the create metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// The field id.
    pub id: String,
    /// The field's display name.
    pub name: String,
    /// Custom field plugin key, if any.
    pub custom_type: Option<String>,
}

/// Response of `GET /rest/api/3/search/jql`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueSearchResponse {
    /// Matching issues.
    #[serde(default)]
    pub issues: Vec<IssueRecord>,
}

/// An issue with the requested subset of fields.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRecord {
    /// The issue key.
    #[serde(default)]
    pub key: String,
    /// The requested fields.
    #[serde(default)]
    pub fields: IssueRecordFields,
}

/// Fields requested in the epic search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueRecordFields {
    /// The issue summary.
    #[serde(default)]
    pub summary: Option<String>,
}

/// A JIRA user from the assignable-user search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The user's account ID.
    #[serde(default)]
    pub account_id: String,
    /// The user's display name.
    #[serde(default)]
    pub display_name: String,
    /// Whether the user is active.
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Body of `POST /rest/api/3/issue`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIssueRequest {
    /// The issue fields.
    pub fields: CreateIssueFields,
}

/// The fields of a new issue.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIssueFields {
    /// The target project.
    pub project: KeyRef,
    /// The issue type.
    pub issuetype: IdRef,
    /// The summary line.
    pub summary: String,
    /// The description as an ADF document.
    pub description: Document,
    /// The assignee, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<AccountRef>,
    /// The parent epic, for projects that link epics through `parent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<KeyRef>,
    /// Instance-specific fields, such as the epic link custom field.
    #[serde(flatten)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// Reference to an entity by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRef {
    /// The entity key.
    pub key: String,
}

/// Reference to an entity by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdRef {
    /// The entity id.
    pub id: String,
}

/// Reference to a user by account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    /// The user's account ID.
    pub account_id: String,
}

/// Response of `POST /rest/api/3/issue`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssueResponse {
    /// The new issue's ID.
    #[serde(default)]
    pub id: String,
    /// The new issue's key.
    #[serde(default)]
    pub key: String,
    /// The REST URL of the new issue.
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_project_page() {
        let json = r#"{
            "startAt": 0,
            "maxResults": 50,
            "isLast": false,
            "values": [
                {"id": "10000", "key": "PROJ", "name": "Project", "avatarUrls": {}}
            ]
        }"#;

        let page: ProjectSearchPage = serde_json::from_str(json).unwrap();
        assert!(!page.is_last);
        assert_eq!(page.values.len(), 1);
        assert_eq!(page.values[0].key, "PROJ");
    }

    #[test]
    fn test_parse_project_page_without_is_last() {
        let page: ProjectSearchPage = serde_json::from_str(r#"{"values": []}"#).unwrap();
        assert!(page.is_last);
    }

    #[test]
    fn test_parse_createmeta_with_fields() {
        let json = r#"{
            "projects": [{
                "key": "PROJ",
                "issuetypes": [{
                    "id": "10001",
                    "name": "Bug",
                    "subtask": false,
                    "fields": {
                        "summary": {"name": "Summary", "schema": {"type": "string", "system": "summary"}},
                        "customfield_10014": {
                            "name": "Epic Link",
                            "schema": {"type": "any", "custom": "com.pyxis.greenhopper.jira:gh-epic-link", "customId": 10014}
                        }
                    }
                }]
            }]
        }"#;

        let meta: CreateMeta = serde_json::from_str(json).unwrap();
        let bug = &meta.projects[0].issuetypes[0];
        assert_eq!(bug.name, "Bug");
        let epic = &bug.fields["customfield_10014"];
        assert_eq!(epic.name, "Epic Link");
        assert_eq!(
            epic.schema.as_ref().unwrap().custom.as_deref(),
            Some("com.pyxis.greenhopper.jira:gh-epic-link")
        );
    }

    #[test]
    fn test_parse_epic_search_with_null_summary() {
        let json = r#"{"issues": [
            {"key": "PROJ-1", "fields": {"summary": "Login revamp"}},
            {"key": "PROJ-2", "fields": {"summary": null}}
        ]}"#;

        let response: IssueSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.issues[0].fields.summary.as_deref(), Some("Login revamp"));
        assert!(response.issues[1].fields.summary.is_none());
    }

    #[test]
    fn test_create_request_flattens_custom_fields() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "customfield_10014".to_string(),
            serde_json::Value::String("PROJ-1".to_string()),
        );
        let request = CreateIssueRequest {
            fields: CreateIssueFields {
                project: KeyRef {
                    key: "PROJ".to_string(),
                },
                issuetype: IdRef {
                    id: "10001".to_string(),
                },
                summary: "Fix login".to_string(),
                description: Document::default(),
                assignee: None,
                parent: None,
                custom,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        let fields = &json["fields"];
        assert_eq!(fields["project"]["key"], "PROJ");
        assert_eq!(fields["issuetype"]["id"], "10001");
        assert_eq!(fields["customfield_10014"], "PROJ-1");
        assert!(fields.get("assignee").is_none());
        assert!(fields.get("parent").is_none());
        assert_eq!(fields["description"]["type"], "doc");
    }

    #[test]
    fn test_epic_link_cached_shape() {
        let field = EpicLink::Field(EpicLinkFieldId("customfield_10014".to_string()));
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "field", "field": "customfield_10014"})
        );
        assert_eq!(serde_json::from_value::<EpicLink>(json).unwrap(), field);

        let parent = serde_json::to_value(EpicLink::Parent).unwrap();
        assert_eq!(parent, serde_json::json!({"kind": "parent"}));
        assert_eq!(
            serde_json::from_value::<EpicLink>(parent).unwrap(),
            EpicLink::Parent
        );
        // Entries written before the parent target existed are a bare id.
        assert!(serde_json::from_value::<EpicLink>(serde_json::json!("customfield_1")).is_err());
    }

    #[test]
    fn test_account_ref_serializes_camel_case() {
        let json = serde_json::to_value(AccountRef {
            account_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json["accountId"], "abc");
    }

    #[test]
    fn test_summary_display() {
        let project = ProjectSummary {
            key: "PROJ".to_string(),
            name: "Project".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(project.to_string(), "PROJ - Project");

        let epic = EpicSummary {
            key: "PROJ-1".to_string(),
            summary: "Login revamp".to_string(),
        };
        assert_eq!(epic.to_string(), "PROJ-1 - Login revamp");
    }
}
