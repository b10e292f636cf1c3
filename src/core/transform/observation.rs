//! `CareRecord_Observation` -> `Observation`

use super::{
    composite_key, composite_key_from, effective_date, optional, patient_key, record_provenance,
    reference, required, RecordOutcome, TransformContext, Transformer,
};
use crate::core::parse::dispatch::CARE_RECORD_OBSERVATION;
use crate::core::parse::schema::columns;
use crate::core::parse::RowCursor;
use crate::core::relationships::ChildReference;
use crate::domain::{CompositeKey, Resource, ResourceType, Result, TributaryError};
use async_trait::async_trait;
use serde_json::{json, Map};

/// Register a clinical child with the problem it names, if any
///
/// Returns the problem's key.
pub(crate) fn link_to_problem(
    cursor: &dyn RowCursor,
    ctx: &mut TransformContext,
    child: ChildReference,
) -> Result<Option<CompositeKey>> {
    let Some(problem_guid) = optional(cursor, columns::PROBLEM_GUID)? else {
        return Ok(None);
    };
    let patient_guid = required(cursor, columns::PATIENT_GUID)?;
    let problem = composite_key_from(cursor, columns::PROBLEM_GUID, patient_guid, problem_guid)?;
    ctx.problem_links.record_pending_child(problem.clone(), child);
    Ok(Some(problem))
}

pub struct ObservationTransformer;

#[async_trait]
impl Transformer for ObservationTransformer {
    fn file_type(&self) -> &'static str {
        CARE_RECORD_OBSERVATION
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Observation
    }

    fn record_key(&self, cursor: &dyn RowCursor) -> Result<CompositeKey> {
        composite_key(cursor, columns::PATIENT_GUID, columns::OBSERVATION_GUID)
    }

    async fn transform_record(
        &self,
        cursor: &dyn RowCursor,
        ctx: &mut TransformContext,
    ) -> Result<RecordOutcome> {
        let key = self.record_key(cursor)?;
        let patient = patient_key(cursor)?;
        let scheme = required(cursor, columns::CODE_SCHEME)?;
        let code = required(cursor, columns::CODE_ID)?;
        let term = optional(cursor, columns::TERM)?;
        let effective = effective_date(cursor, ctx)?;

        let value = cursor.cell("Value")?.as_double()?;
        let units = optional(cursor, "Units")?;
        let low = if cursor.has_column("NumericRangeLow") {
            cursor.cell("NumericRangeLow")?.as_double()?
        } else {
            None
        };
        let high = if cursor.has_column("NumericRangeHigh") {
            cursor.cell("NumericRangeHigh")?.as_double()?
        } else {
            None
        };

        let (concept, translated) = ctx.concept(scheme, code, term).await?;
        if translated.is_none() {
            tracing::warn!(
                file = %cursor.schema().file(),
                key = %key,
                scheme = %scheme,
                code = %code,
                "No standard code for observation, keeping vendor code"
            );
        }

        let mut builder = Resource::builder(ResourceType::Observation)
            .source_key(key.clone())
            .patient(patient.clone())
            .field("code", concept)
            .field("subject", reference(ResourceType::Patient, &patient))
            .optional_field("effective", effective.map(|d| d.to_json()))
            .optional_field("processingId", optional(cursor, columns::PROCESSING_ID)?);

        if let Some(value) = value {
            let mut quantity = Map::new();
            quantity.insert("value".to_string(), json!(value));
            if let Some(units) = units {
                quantity.insert("unit".to_string(), json!(units));
            }
            builder = builder.field("valueQuantity", json!(quantity));
        }
        if low.is_some() || high.is_some() {
            let mut range = Map::new();
            if let Some(low) = low {
                range.insert("low".to_string(), json!(low));
            }
            if let Some(high) = high {
                range.insert("high".to_string(), json!(high));
            }
            builder = builder.field("referenceRange", json!([range]));
        }

        let child = ChildReference::new(ResourceType::Observation, key.clone());
        if let Some(problem) = link_to_problem(cursor, ctx, child)? {
            builder = builder.field("problem", reference(ResourceType::Condition, &problem));
        }

        let resource = builder.build().map_err(TributaryError::Validation)?;
        ctx.filer
            .save_patient_resource(record_provenance(cursor)?, resource)
            .await?;
        ctx.mark_filed(ResourceType::Observation, &key);
        Ok(RecordOutcome::Saved)
    }
}
