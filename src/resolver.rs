//! Detection of how a project links issues to epics.
//!
//! Company-managed JIRA projects attach issues to epics through a custom field
//! whose id differs per instance. Team-managed projects have no such field and
//! take the epic as the issue's `parent` instead. The project's create screens
//! are scanned once and the answer is cached like any other metadata.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::api::error::Result;
use crate::api::types::{EpicLink, EpicLinkFieldId, FieldSchema};
use crate::api::{ApiError, JiraApi};
use crate::cache::{CacheKey, MetadataCache};

/// Field names recognised as the epic link, compared trimmed and lowercased.
const EPIC_LINK_NAMES: &[&str] = &[
    "epic link",
    "vínculo com épico",
    "vinculo com epico",
    "link do épico",
    "link do epico",
];

/// Custom field plugin keys of the epic link.
const EPIC_LINK_CUSTOM_TYPES: &[&str] = &["com.pyxis.greenhopper.jira:gh-epic-link", "gh-epic-link"];

/// Id of the standard parent field on create screens.
const PARENT_FIELD_ID: &str = "parent";

/// Resolves and caches a project's epic link.
#[derive(Clone)]
pub struct FieldSchemaResolver {
    api: Arc<dyn JiraApi>,
    cache: Arc<MetadataCache>,
}

impl FieldSchemaResolver {
    pub fn new(api: Arc<dyn JiraApi>, cache: Arc<MetadataCache>) -> Self {
        Self { api, cache }
    }

    /// Find how `project_key` links issues to epics.
    ///
    /// `Ok(None)` means the project offers neither an epic-link field nor a
    /// parent field. That answer is cached like a found one.
    #[instrument(skip(self))]
    pub async fn resolve_epic_link(&self, project_key: &str) -> Result<Option<EpicLink>> {
        let key = CacheKey::epic_link_field(project_key);
        self.cache
            .get(&key, || async {
                let fields = self.api.create_field_schema(project_key).await?;
                let found = find_epic_link(&fields);
                debug!(
                    "Epic link for {}: {:?} ({} fields scanned)",
                    project_key,
                    found,
                    fields.len()
                );
                Ok::<_, ApiError>(found)
            })
            .await
    }
}

/// Decide how issues are linked to epics given a create screen's fields.
///
/// An epic-link field is preferred. Without one, a `parent` field means the
/// epic is set as the parent.
pub fn find_epic_link(fields: &[FieldSchema]) -> Option<EpicLink> {
    find_epic_link_field(fields).map(EpicLink::Field).or_else(|| {
        fields
            .iter()
            .any(|field| field.id == PARENT_FIELD_ID)
            .then_some(EpicLink::Parent)
    })
}

/// Pick the epic-link field out of a field list.
///
/// A field matched by name wins over one matched only by its custom type.
pub fn find_epic_link_field(fields: &[FieldSchema]) -> Option<EpicLinkFieldId> {
    let by_name = fields.iter().find(|field| {
        let name = field.name.trim().to_lowercase();
        EPIC_LINK_NAMES.contains(&name.as_str())
    });
    let by_type = || {
        fields.iter().find(|field| {
            field
                .custom_type
                .as_deref()
                .is_some_and(|custom| EPIC_LINK_CUSTOM_TYPES.contains(&custom))
        })
    };

    by_name
        .or_else(by_type)
        .map(|field| EpicLinkFieldId(field.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{field, FakeJira};

    fn resolver(fake: Arc<FakeJira>) -> FieldSchemaResolver {
        FieldSchemaResolver::new(fake, Arc::new(MetadataCache::in_memory()))
    }

    #[test]
    fn test_find_by_name() {
        let fields = vec![
            field("summary", "Summary", None),
            field("customfield_10014", " Epic Link ", None),
        ];
        assert_eq!(
            find_epic_link_field(&fields),
            Some(EpicLinkFieldId("customfield_10014".to_string()))
        );
    }

    #[test]
    fn test_find_by_localized_name() {
        let fields = vec![field("customfield_1", "Vínculo com épico", None)];
        assert_eq!(
            find_epic_link_field(&fields).unwrap().as_str(),
            "customfield_1"
        );
    }

    #[test]
    fn test_find_by_custom_type() {
        let fields = vec![field(
            "customfield_20000",
            "Parent epic",
            Some("com.pyxis.greenhopper.jira:gh-epic-link"),
        )];
        assert_eq!(
            find_epic_link_field(&fields).unwrap().as_str(),
            "customfield_20000"
        );
    }

    #[test]
    fn test_name_match_beats_schema_match() {
        let fields = vec![
            field("customfield_1", "Something", Some("gh-epic-link")),
            field("customfield_2", "Epic Link", None),
        ];
        assert_eq!(
            find_epic_link_field(&fields).unwrap().as_str(),
            "customfield_2"
        );
    }

    #[test]
    fn test_no_match() {
        let fields = vec![
            field("customfield_3", "Epic Name", Some("gh-epic-label")),
            field("parent", "Parent", None),
        ];
        assert_eq!(find_epic_link_field(&fields), None);
    }

    #[test]
    fn test_parent_used_without_link_field() {
        let fields = vec![
            field("summary", "Summary", None),
            field("parent", "Parent", None),
        ];
        assert_eq!(find_epic_link(&fields), Some(EpicLink::Parent));
    }

    #[test]
    fn test_link_field_beats_parent() {
        let fields = vec![
            field("parent", "Parent", None),
            field("customfield_10014", "Epic Link", None),
        ];
        assert_eq!(
            find_epic_link(&fields),
            Some(EpicLink::Field(EpicLinkFieldId(
                "customfield_10014".to_string()
            )))
        );
    }

    #[test]
    fn test_parent_matched_by_id_only() {
        let fields = vec![field("customfield_4", "Parent", None)];
        assert_eq!(find_epic_link(&fields), None);
    }

    #[tokio::test]
    async fn test_parent_resolution_is_cached() {
        let mut fake = FakeJira::new();
        fake.fields = vec![field("parent", "Parent", None)];
        let fake = Arc::new(fake);
        let resolver = resolver(fake.clone());

        assert_eq!(
            resolver.resolve_epic_link("PROJ").await,
            Ok(Some(EpicLink::Parent))
        );
        assert_eq!(
            resolver.resolve_epic_link("PROJ").await,
            Ok(Some(EpicLink::Parent))
        );
        assert_eq!(fake.calls("create_field_schema"), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_cached() {
        let mut fake = FakeJira::new();
        fake.fields = vec![field("customfield_10014", "Epic Link", None)];
        let fake = Arc::new(fake);
        let resolver = resolver(fake.clone());

        let first = resolver.resolve_epic_link("PROJ").await.unwrap();
        let second = resolver.resolve_epic_link("PROJ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            Some(EpicLink::Field(EpicLinkFieldId(
                "customfield_10014".to_string()
            )))
        );
        assert_eq!(fake.calls("create_field_schema"), 1);
    }

    #[tokio::test]
    async fn test_absent_field_is_cached() {
        let fake = Arc::new(FakeJira::new());
        let resolver = resolver(fake.clone());

        assert_eq!(resolver.resolve_epic_link("PROJ").await.unwrap(), None);
        assert_eq!(resolver.resolve_epic_link("PROJ").await.unwrap(), None);
        assert_eq!(fake.calls("create_field_schema"), 1);
    }

    #[tokio::test]
    async fn test_errors_propagate_and_are_not_cached() {
        let fake = Arc::new(FakeJira::new());
        fake.fail("create_field_schema", ApiError::Forbidden);
        let resolver = resolver(fake.clone());

        assert_eq!(
            resolver.resolve_epic_link("PROJ").await,
            Err(ApiError::Forbidden)
        );

        fake.recover("create_field_schema");
        assert_eq!(resolver.resolve_epic_link("PROJ").await, Ok(None));
        assert_eq!(fake.calls("create_field_schema"), 2);
    }
}
