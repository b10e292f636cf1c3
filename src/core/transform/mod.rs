//! Per-entity transformers
//!
//! Each vendor file type has a [`Transformer`] that maps one source record to
//! one target resource. [`run_transformer`] drives a transformer over a cursor:
//!
//! - a record whose `Deleted` indicator is set becomes a delete of its
//!   composite key, skipped when the delete pre-pass found the key was never
//!   filed
//! - any other record is handed to [`Transformer::transform_record`]
//! - record errors are collected or raised according to the transformer's
//!   [`FailurePolicy`]
//!
//! [`PIPELINE_ORDER`] fixes the order file types are processed in: admin,
//! patient, then clinical, so a child is always filed after the resources it
//! refers to.

pub mod context;
pub mod medication;
pub mod observation;
pub mod organisation;
pub mod overrides;
pub mod patient;
pub mod problem;

pub use context::TransformContext;
pub use overrides::DateOverrides;

use crate::core::parse::dispatch::{
    ADMIN_ORGANISATION, ADMIN_PATIENT, CARE_RECORD_OBSERVATION, CARE_RECORD_PROBLEM,
    PRESCRIBING_MEDICATION,
};
use crate::core::parse::schema::columns;
use crate::core::parse::{PartialDate, RowCursor};
use crate::domain::{
    CompositeKey, RecordError, RecordProvenance, ResourceType, Result, TributaryError,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

/// File types in processing order
pub const PIPELINE_ORDER: [&str; 5] = [
    ADMIN_ORGANISATION,
    ADMIN_PATIENT,
    CARE_RECORD_PROBLEM,
    CARE_RECORD_OBSERVATION,
    PRESCRIBING_MEDICATION,
];

/// How a pass reacts to a record error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, continue, and fail the pass at end-of-file
    CollectAll,
    /// Abort on the first record error
    FailFast,
}

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Saved,
    Deleted,
    Skipped,
}

/// Maps the records of one vendor file type to target resources
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Type tag of the files this transformer reads
    fn file_type(&self) -> &'static str;

    fn resource_type(&self) -> ResourceType;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::CollectAll
    }

    /// Composite key of the current record
    fn record_key(&self, cursor: &dyn RowCursor) -> Result<CompositeKey>;

    /// Build and file the resource for the current (non-deleted) record
    async fn transform_record(
        &self,
        cursor: &dyn RowCursor,
        ctx: &mut TransformContext,
    ) -> Result<RecordOutcome>;

    /// Called after the current record's resource has been queued for deletion
    async fn on_deleted(&self, _key: &CompositeKey, _ctx: &mut TransformContext) -> Result<()> {
        Ok(())
    }
}

/// Returns the transformer for a type tag
pub fn transformer_for(file_type: &str) -> Option<Box<dyn Transformer>> {
    match file_type {
        ADMIN_ORGANISATION => Some(Box::new(organisation::OrganisationTransformer)),
        ADMIN_PATIENT => Some(Box::new(patient::PatientTransformer)),
        CARE_RECORD_PROBLEM => Some(Box::new(problem::ProblemTransformer)),
        CARE_RECORD_OBSERVATION => Some(Box::new(observation::ObservationTransformer)),
        PRESCRIBING_MEDICATION => Some(Box::new(medication::MedicationTransformer)),
        _ => None,
    }
}

/// Result of one transformer pass over one file
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub file: String,
    pub file_type: String,
    pub policy: FailurePolicy,
    pub records: usize,
    pub saved: usize,
    pub deleted: usize,
    pub skipped: usize,
    #[serde(skip)]
    pub errors: Vec<RecordError>,
}

impl PassReport {
    fn new(file: &str, file_type: &str, policy: FailurePolicy) -> Self {
        Self {
            file: file.to_string(),
            file_type: file_type.to_string(),
            policy,
            records: 0,
            saved: 0,
            deleted: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Fail the pass if any record errors were collected
    ///
    /// # Errors
    ///
    /// Returns [`TributaryError::RecordErrors`] with the count and the first
    /// error's provenance.
    pub fn escalate(&self) -> Result<()> {
        match self.errors.first() {
            None => Ok(()),
            Some(first) => Err(TributaryError::RecordErrors {
                file_type: self.file_type.clone(),
                count: self.errors.len(),
                first: Box::new(first.clone()),
            }),
        }
    }
}

/// Drive a transformer over every record of a cursor
///
/// # Errors
///
/// Returns the first record error under [`FailurePolicy::FailFast`], and any
/// non-record error (cursor, filer, terminology) immediately. A row the cursor
/// cannot read is a record error like any other. Collected record
/// errors are left in the report; see [`PassReport::escalate`].
pub async fn run_transformer(
    cursor: &mut dyn RowCursor,
    transformer: &dyn Transformer,
    ctx: &mut TransformContext,
) -> Result<PassReport> {
    let policy = transformer.failure_policy();
    run_transformer_with_policy(cursor, transformer, policy, ctx).await
}

/// [`run_transformer`] with the transformer's failure policy overridden
pub async fn run_transformer_with_policy(
    cursor: &mut dyn RowCursor,
    transformer: &dyn Transformer,
    policy: FailurePolicy,
    ctx: &mut TransformContext,
) -> Result<PassReport> {
    let mut report = PassReport::new(
        cursor.schema().file(),
        transformer.file_type(),
        policy,
    );

    crate::log_pass_start!(report.file_type, report.file);

    loop {
        match cursor.next() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(TributaryError::Record(err)) => {
                report.records += 1;
                crate::log_record_error!(err);
                if policy == FailurePolicy::FailFast {
                    return Err(TributaryError::Record(err));
                }
                report.errors.push(err);
                continue;
            }
            Err(e) => return Err(e),
        }
        report.records += 1;
        let current: &dyn RowCursor = &*cursor;

        match process_record(current, transformer, ctx).await {
            Ok(RecordOutcome::Saved) => report.saved += 1,
            Ok(RecordOutcome::Deleted) => report.deleted += 1,
            Ok(RecordOutcome::Skipped) => report.skipped += 1,
            Err(TributaryError::Record(err)) => {
                let err = with_row_provenance(err, current);
                crate::log_record_error!(err);
                if policy == FailurePolicy::FailFast {
                    return Err(TributaryError::Record(err));
                }
                report.errors.push(err);
            }
            Err(e) => return Err(e),
        }
    }

    crate::log_pass_complete!(
        report.file_type,
        report.records,
        report.saved,
        report.deleted,
        report.errors.len()
    );
    Ok(report)
}

async fn process_record(
    cursor: &dyn RowCursor,
    transformer: &dyn Transformer,
    ctx: &mut TransformContext,
) -> Result<RecordOutcome> {
    if !is_deleted(cursor)? {
        return transformer.transform_record(cursor, ctx).await;
    }

    let resource_type = transformer.resource_type();
    let key = transformer.record_key(cursor)?;
    let outcome = if ctx.should_delete(resource_type, &key) {
        let provenance = record_provenance(cursor)?;
        if resource_type.is_admin() {
            ctx.filer
                .delete_admin_resource(provenance, resource_type, key.clone())
                .await?;
        } else {
            ctx.filer
                .delete_patient_resource(provenance, resource_type, key.clone())
                .await?;
        }
        ctx.mark_deleted(resource_type, &key);
        RecordOutcome::Deleted
    } else {
        tracing::debug!(
            resource_type = %resource_type,
            key = %key,
            "Skipping delete of a resource that was never filed"
        );
        RecordOutcome::Skipped
    };
    transformer.on_deleted(&key, ctx).await?;
    Ok(outcome)
}

/// Cell errors raised before a row was available carry no row number
fn with_row_provenance(mut err: RecordError, cursor: &dyn RowCursor) -> RecordError {
    if err.provenance.row == 0 {
        if let Some(provenance) = cursor.provenance() {
            err.provenance = provenance.clone();
        }
    }
    err
}

/// Value of the delete indicator; a file without the column has no deletes
pub fn is_deleted(cursor: &dyn RowCursor) -> Result<bool> {
    if !cursor.has_column(columns::DELETED) {
        return Ok(false);
    }
    Ok(cursor.cell(columns::DELETED)?.as_bool()?.unwrap_or(false))
}

/// Provenance of the current record
pub(crate) fn record_provenance(cursor: &dyn RowCursor) -> Result<RecordProvenance> {
    cursor.provenance().cloned().ok_or_else(|| {
        TributaryError::Other(format!(
            "cursor over {} is not positioned on a record",
            cursor.schema().file()
        ))
    })
}

/// A record-level error at the current record
pub(crate) fn record_error(cursor: &dyn RowCursor, column: &str, message: impl Into<String>) -> TributaryError {
    let provenance = cursor.provenance().cloned().unwrap_or_else(|| {
        RecordProvenance::new(cursor.schema().file(), cursor.schema().file_type(), 0)
    });
    TributaryError::Record(RecordError::new(provenance, message).with_column(column))
}

/// A non-empty string cell, or a record error naming the column
pub(crate) fn required<'c>(cursor: &'c dyn RowCursor, column: &str) -> Result<&'c str> {
    cursor
        .cell(column)?
        .as_string()?
        .ok_or_else(|| record_error(cursor, column, format!("{column} is required")))
}

/// An optional string cell; a column the schema version lacks reads as absent
pub(crate) fn optional<'c>(cursor: &'c dyn RowCursor, column: &str) -> Result<Option<&'c str>> {
    if !cursor.has_column(column) {
        return Ok(None);
    }
    Ok(cursor.cell(column)?.as_string()?)
}

/// The record's composite key from a scope column and a local id column
pub(crate) fn composite_key(cursor: &dyn RowCursor, scope_column: &str, id_column: &str) -> Result<CompositeKey> {
    let scope = required(cursor, scope_column)?;
    let local_id = required(cursor, id_column)?;
    composite_key_from(cursor, scope_column, scope, local_id)
}

/// A composite key from values already read, reporting failures against `column`
pub(crate) fn composite_key_from(
    cursor: &dyn RowCursor,
    column: &str,
    scope: &str,
    local_id: &str,
) -> Result<CompositeKey> {
    CompositeKey::new(scope, local_id).map_err(|e| record_error(cursor, column, e))
}

/// Key of the patient a clinical record belongs to
pub(crate) fn patient_key(cursor: &dyn RowCursor) -> Result<CompositeKey> {
    composite_key(cursor, columns::ORGANISATION_GUID, columns::PATIENT_GUID)
}

/// Effective date of a clinical record with organisation overrides applied
pub(crate) fn effective_date(cursor: &dyn RowCursor, ctx: &TransformContext) -> Result<Option<PartialDate>> {
    if !cursor.has_column(columns::EFFECTIVE_DATE) {
        return Ok(None);
    }
    let value = cursor.cell(columns::EFFECTIVE_DATE)?;
    let date = if cursor.has_column(columns::EFFECTIVE_DATE_PRECISION) {
        value.as_partial_date(&cursor.cell(columns::EFFECTIVE_DATE_PRECISION)?)?
    } else {
        value.as_date()?.map(PartialDate::Date)
    };
    let organisation = optional(cursor, columns::ORGANISATION_GUID)?.unwrap_or_default();
    Ok(ctx.date_overrides.filter(organisation, date))
}

/// Reference to another resource
pub(crate) fn reference(resource_type: ResourceType, key: &CompositeKey) -> Value {
    json!({ "reference": format!("{resource_type}/{key}") })
}


#[cfg(test)]
mod tests {
    use super::test_support::{context, csv_cursor};
    use super::*;
    use crate::adapters::store::{ResourceStore, StoreOperation};
    use std::collections::HashSet;

    #[test]
    fn test_every_pipeline_tag_has_a_transformer() {
        for tag in PIPELINE_ORDER {
            let transformer = transformer_for(tag).unwrap();
            assert_eq!(transformer.file_type(), tag);
        }
        assert!(transformer_for("Appointment_Slot").is_none());
    }

    #[test]
    fn test_admin_passes_fail_fast() {
        assert_eq!(
            transformer_for(ADMIN_ORGANISATION).unwrap().failure_policy(),
            FailurePolicy::FailFast
        );
        assert_eq!(
            transformer_for(CARE_RECORD_OBSERVATION).unwrap().failure_policy(),
            FailurePolicy::CollectAll
        );
    }

    #[test]
    fn test_escalate_reports_count_and_first_error() {
        let mut report = PassReport::new("obs.csv", CARE_RECORD_OBSERVATION, FailurePolicy::CollectAll);
        assert!(report.escalate().is_ok());

        for row in [4, 9] {
            report.errors.push(RecordError::new(
                RecordProvenance::new("obs.csv", CARE_RECORD_OBSERVATION, row),
                "bad value",
            ));
        }
        match report.escalate() {
            Err(TributaryError::RecordErrors { count, first, file_type }) => {
                assert_eq!(count, 2);
                assert_eq!(first.provenance.row, 4);
                assert_eq!(file_type, CARE_RECORD_OBSERVATION);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_is_deleted_reads_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let mut cursor = csv_cursor(
            dir.path(),
            ADMIN_PATIENT,
            "5.3",
            &[
                &[("PatientGuid", "P1"), ("OrganisationGuid", "O1"), ("Deleted", "true")],
                &[("PatientGuid", "P2"), ("OrganisationGuid", "O1")],
            ],
        );
        cursor.next().unwrap();
        assert!(is_deleted(cursor.as_ref()).unwrap());
        cursor.next().unwrap();
        assert!(!is_deleted(cursor.as_ref()).unwrap());
    }

    #[tokio::test]
    async fn test_delete_of_unfiled_key_is_skipped_after_prepass() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context();
        let mut ctx = ctx.with_filed_keys(HashSet::new());
        let mut cursor = csv_cursor(
            dir.path(),
            ADMIN_PATIENT,
            "5.3",
            &[&[("PatientGuid", "P1"), ("OrganisationGuid", "O1"), ("Deleted", "1")]],
        );

        let report = run_transformer(cursor.as_mut(), &patient::PatientTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 0);
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn test_delete_after_save_in_same_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context();
        let mut ctx = ctx.with_filed_keys(HashSet::new());
        let mut cursor = csv_cursor(
            dir.path(),
            ADMIN_PATIENT,
            "5.3",
            &[
                &[("PatientGuid", "P1"), ("OrganisationGuid", "O1"), ("FamilyName", "Hopper")],
                &[("PatientGuid", "P1"), ("OrganisationGuid", "O1"), ("Deleted", "1")],
            ],
        );

        let report = run_transformer(cursor.as_mut(), &patient::PatientTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        let key = CompositeKey::new("O1", "P1").unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(
            store.journal(),
            vec![
                StoreOperation::Upsert(ResourceType::Patient, key.clone()),
                StoreOperation::Delete(ResourceType::Patient, key.clone()),
            ]
        );
        assert!(store.get(ResourceType::Patient, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_policy_override_aborts_collecting_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _store) = context();
        let mut cursor = csv_cursor(
            dir.path(),
            CARE_RECORD_OBSERVATION,
            "5.3",
            &[
                &[
                    ("ObservationGuid", "OBS1"),
                    ("PatientGuid", "P1"),
                    ("OrganisationGuid", "O1"),
                    ("CodeId", "246B."),
                    ("CodeScheme", "READ2"),
                    ("EffectiveDate", "not a date"),
                ],
                &[
                    ("ObservationGuid", "OBS2"),
                    ("PatientGuid", "P1"),
                    ("OrganisationGuid", "O1"),
                    ("CodeId", "246B."),
                    ("CodeScheme", "READ2"),
                ],
            ],
        );

        let err = run_transformer_with_policy(
            cursor.as_mut(),
            &observation::ObservationTransformer,
            FailurePolicy::FailFast,
            &mut ctx,
        )
        .await
        .unwrap_err();
        match err {
            TributaryError::Record(record) => {
                assert_eq!(record.provenance.row, 2);
                assert_eq!(record.column.as_deref(), Some("EffectiveDate"));
            }
            other => panic!("expected record error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_short_row_is_collected_and_pass_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Admin_Patient.csv");
        std::fs::write(
            &path,
            "PatientGuid,OrganisationGuid,NhsNumber,Title,GivenName,FamilyName,Sex,DateOfBirth,DateOfDeath,DateOfRegistration,DateOfDeactivation,Deleted,ProcessingId\n\
             P1,O1,,,,Lovelace,,,,,,,\n\
             P2,O1,,\n\
             P3,O1,,,,Hopper,,,,,,,\n",
        )
        .unwrap();
        let registry = crate::core::parse::SchemaRegistry::builtin();
        let version = crate::domain::SchemaVersion::new("5.3").unwrap();
        let mut cursor =
            crate::core::parse::CsvCursor::open(&path, ADMIN_PATIENT, &version, &registry, b',', true)
                .unwrap();
        let (mut ctx, store) = context();

        let report = run_transformer_with_policy(
            &mut cursor,
            &patient::PatientTransformer,
            FailurePolicy::CollectAll,
            &mut ctx,
        )
        .await
        .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        assert_eq!(report.records, 3);
        assert_eq!(report.saved, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].provenance.row, 3);
        assert!(report.errors[0].message.contains("expected 13 fields"));
        assert_eq!(store.count(ResourceType::Patient).await.unwrap(), 2);

        match report.escalate() {
            Err(TributaryError::RecordErrors { count, first, .. }) => {
                assert_eq!(count, 1);
                assert_eq!(first.provenance.row, 3);
            }
            other => panic!("expected collected record errors, got {other:?}"),
        }
    }

    #[test]
    fn test_reference_format() {
        let key = CompositeKey::new("P1", "PR1").unwrap();
        assert_eq!(
            reference(ResourceType::Condition, &key),
            json!({"reference": "Condition/P1:PR1"})
        );
    }
}
