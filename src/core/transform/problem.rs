//! `CareRecord_Problem` -> `Condition`
//!
//! Problems are the parents of linked observations and medications. When a
//! problem is filed it takes over the links it already had in the store plus
//! any children waiting for it in the relationship cache.

use super::{
    composite_key, effective_date, optional, patient_key, record_error, record_provenance,
    required, RecordOutcome, TransformContext, Transformer,
};
use crate::core::parse::dispatch::CARE_RECORD_PROBLEM;
use crate::core::parse::schema::columns;
use crate::core::parse::RowCursor;
use crate::domain::{CompositeKey, Resource, ResourceType, Result, TributaryError};
use async_trait::async_trait;
use serde_json::json;

fn clinical_status(status: &str) -> Option<&'static str> {
    match status.to_ascii_lowercase().as_str() {
        "active" => Some("active"),
        "past" | "inactive" => Some("inactive"),
        "resolved" => Some("resolved"),
        _ => None,
    }
}

pub struct ProblemTransformer;

#[async_trait]
impl Transformer for ProblemTransformer {
    fn file_type(&self) -> &'static str {
        CARE_RECORD_PROBLEM
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Condition
    }

    fn record_key(&self, cursor: &dyn RowCursor) -> Result<CompositeKey> {
        composite_key(cursor, columns::PATIENT_GUID, columns::PROBLEM_GUID)
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

        let status = match optional(cursor, "Status")? {
            Some(value) => Some(clinical_status(value).ok_or_else(|| {
                record_error(cursor, "Status", format!("unrecognised problem status '{value}'"))
            })?),
            None => None,
        };
        let onset = effective_date(cursor, ctx)?;
        let end_date = cursor.cell("EndDate")?.as_date()?;
        let last_review = if cursor.has_column("LastReviewDate") {
            cursor.cell("LastReviewDate")?.as_date()?
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
                "No standard code for problem, keeping vendor code"
            );
        }

        let mut resource = Resource::builder(ResourceType::Condition)
            .source_key(key.clone())
            .patient(patient.clone())
            .field("code", concept)
            .field("subject", super::reference(ResourceType::Patient, &patient))
            .optional_field("clinicalStatus", status)
            .optional_field("onset", onset.map(|d| d.to_json()))
            .optional_field("abatementDate", end_date.map(|d| d.to_string()))
            .optional_field("lastReviewDate", last_review.map(|d| d.to_string()))
            .optional_field("significance", optional(cursor, "Significance")?)
            .optional_field("processingId", optional(cursor, columns::PROCESSING_ID)?)
            .build()
            .map_err(TributaryError::Validation)?;

        if let Some(existing) = ctx.filer.load_resource(ResourceType::Condition, &key).await? {
            for link in existing.links {
                resource.add_link(link);
            }
        }
        if ctx.problem_links.has_pending(&key) {
            let linked = ctx
                .problem_links
                .drain_pending(&key)
                .into_iter()
                .filter(|child| resource.add_link(child.clone().into()))
                .count();
            tracing::debug!(key = %key, linked, "Linked pending children to problem");
        }

        ctx.filer
            .save_patient_resource(record_provenance(cursor)?, resource)
            .await?;
        ctx.mark_filed(ResourceType::Condition, &key);
        Ok(RecordOutcome::Saved)
    }

    async fn on_deleted(&self, key: &CompositeKey, ctx: &mut TransformContext) -> Result<()> {
        let discarded = ctx.problem_links.drain_pending(key);
        if !discarded.is_empty() {
            tracing::debug!(
                key = %key,
                children = discarded.len(),
                "Discarded pending children of deleted problem"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::{ResourceStore, StoreOperation};
    use crate::core::relationships::ChildReference;
    use crate::core::transform::run_transformer;
    use crate::core::transform::test_support::{context, csv_cursor};

    fn key(scope: &str, id: &str) -> CompositeKey {
        CompositeKey::new(scope, id).unwrap()
    }

    fn problem_row<'a>(problem: &'a str, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut row = vec![
            ("ProblemGuid", problem),
            ("PatientGuid", "P1"),
            ("OrganisationGuid", "ORG1"),
            ("CodeId", "H33.."),
            ("CodeScheme", "READ2"),
            ("Term", "Asthma"),
            ("Status", "Active"),
        ];
        row.extend_from_slice(extra);
        row
    }

    #[tokio::test]
    async fn test_problem_drains_pending_children() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, store) = context();
        ctx.problem_links.record_pending_child(
            key("P1", "PR1"),
            ChildReference::new(ResourceType::Observation, key("P1", "OBS1")),
        );
        assert!(ctx.problem_links.has_pending(&key("P1", "PR1")));

        let row = problem_row("PR1", &[("EffectiveDate", "2019-06-15"), ("EffectiveDatePrecision", "YM")]);
        let unlinked = problem_row("PR2", &[]);
        let mut cursor = csv_cursor(
            dir.path(),
            CARE_RECORD_PROBLEM,
            "5.1",
            &[row.as_slice(), unlinked.as_slice()],
        );
        let report = run_transformer(cursor.as_mut(), &ProblemTransformer, &mut ctx)
            .await
            .unwrap();
        assert_eq!(report.saved, 2);
        assert!(!ctx.problem_links.has_pending(&key("P1", "PR1")));
        assert!(ctx.problem_links.is_empty());
        ctx.filer.wait_to_finish().await.unwrap();

        let condition = store
            .get(ResourceType::Condition, &key("P1", "PR1"))
            .await
            .unwrap()
            .unwrap();
        assert!(condition.has_link(ResourceType::Observation, &key("P1", "OBS1")));
        assert_eq!(condition.field("onset"), Some(&json!("2019-06")));
        assert_eq!(condition.field("clinicalStatus"), Some(&json!("active")));
        assert_eq!(condition.patient, Some(key("ORG1", "P1")));

        let unlinked = store
            .get(ResourceType::Condition, &key("P1", "PR2"))
            .await
            .unwrap()
            .unwrap();
        assert!(unlinked.links.is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_problem_keeps_stored_links() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, store) = context();

        let first = problem_row("PR1", &[]);
        let mut cursor = csv_cursor(dir.path(), CARE_RECORD_PROBLEM, "5.3", &[first.as_slice()]);
        run_transformer(cursor.as_mut(), &ProblemTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.problem_links.record_pending_child(
            key("P1", "PR1"),
            ChildReference::new(ResourceType::MedicationStatement, key("P1", "MED1")),
        );
        ctx.problem_links
            .apply_remaining_to_store(&ctx.filer)
            .await
            .unwrap();

        let again = problem_row("PR1", &[("Status", "Resolved")]);
        let sub = tempfile::tempdir().unwrap();
        let mut cursor = csv_cursor(sub.path(), CARE_RECORD_PROBLEM, "5.3", &[again.as_slice()]);
        run_transformer(cursor.as_mut(), &ProblemTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        let condition = store
            .get(ResourceType::Condition, &key("P1", "PR1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(condition.links.len(), 1);
        assert_eq!(condition.field("clinicalStatus"), Some(&json!("resolved")));
    }

    #[tokio::test]
    async fn test_deleted_problem_is_one_delete_and_no_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, store) = context();
        ctx.problem_links.record_pending_child(
            key("P1", "PR9"),
            ChildReference::new(ResourceType::Observation, key("P1", "OBS9")),
        );

        let row = problem_row("PR9", &[("Deleted", "true")]);
        let mut cursor = csv_cursor(dir.path(), CARE_RECORD_PROBLEM, "5.3", &[row.as_slice()]);
        let report = run_transformer(cursor.as_mut(), &ProblemTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.saved, 0);
        assert_eq!(
            store.journal(),
            vec![StoreOperation::Delete(ResourceType::Condition, key("P1", "PR9"))]
        );
        assert!(ctx.problem_links.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_is_collected_record_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _store) = context();
        let bad = problem_row("PR1", &[("Status", "Sometimes")]);
        let good = problem_row("PR2", &[]);
        let mut cursor = csv_cursor(dir.path(), CARE_RECORD_PROBLEM, "5.0", &[bad.as_slice(), good.as_slice()]);

        let report = run_transformer(cursor.as_mut(), &ProblemTransformer, &mut ctx)
            .await
            .unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.errors[0].column.as_deref(), Some("Status"));
        assert!(matches!(
            report.escalate(),
            Err(TributaryError::RecordErrors { count: 1, .. })
        ));
    }
}
