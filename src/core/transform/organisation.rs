//! `Admin_Organisation` -> `Organization`

use super::{
    composite_key_from, optional, record_provenance, reference, required, FailurePolicy,
    RecordOutcome, TransformContext, Transformer,
};
use crate::core::parse::dispatch::ADMIN_ORGANISATION;
use crate::core::parse::schema::columns;
use crate::core::parse::RowCursor;
use crate::domain::{CompositeKey, Resource, ResourceType, Result};
use async_trait::async_trait;
use serde_json::json;

/// Scope shared by every organisation key
pub const ORGANISATION_SCOPE: &str = "org";

/// Key of the organisation with the given vendor id
pub fn organisation_key(cursor: &dyn RowCursor, column: &str) -> Result<CompositeKey> {
    let guid = required(cursor, column)?;
    composite_key_from(cursor, column, ORGANISATION_SCOPE, guid)
}

pub struct OrganisationTransformer;

#[async_trait]
impl Transformer for OrganisationTransformer {
    fn file_type(&self) -> &'static str {
        ADMIN_ORGANISATION
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Organization
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FailFast
    }

    fn record_key(&self, cursor: &dyn RowCursor) -> Result<CompositeKey> {
        organisation_key(cursor, columns::ORGANISATION_GUID)
    }

    async fn transform_record(
        &self,
        cursor: &dyn RowCursor,
        ctx: &mut TransformContext,
    ) -> Result<RecordOutcome> {
        let key = self.record_key(cursor)?;
        let close_date = cursor.cell("CloseDate")?.as_date()?;

        let mut builder = Resource::builder(ResourceType::Organization)
            .source_key(key.clone())
            .field("name", json!(required(cursor, "Name")?))
            .field("active", json!(close_date.is_none()))
            .optional_field("odsCode", optional(cursor, "OdsCode")?)
            .optional_field("type", optional(cursor, "OrganisationType")?);

        if optional(cursor, "ParentOrganisationGuid")?.is_some() {
            let parent = organisation_key(cursor, "ParentOrganisationGuid")?;
            builder = builder.field("partOf", reference(ResourceType::Organization, &parent));
        }

        let open_date = cursor.cell("OpenDate")?.as_date()?;
        if open_date.is_some() || close_date.is_some() {
            let mut period = serde_json::Map::new();
            if let Some(start) = open_date {
                period.insert("start".to_string(), json!(start.to_string()));
            }
            if let Some(end) = close_date {
                period.insert("end".to_string(), json!(end.to_string()));
            }
            builder = builder.field("period", serde_json::Value::Object(period));
        }

        let resource = builder.build().map_err(crate::domain::TributaryError::Validation)?;
        ctx.filer
            .save_admin_resource(record_provenance(cursor)?, resource)
            .await?;
        ctx.mark_filed(ResourceType::Organization, &key);
        Ok(RecordOutcome::Saved)
    }
}
