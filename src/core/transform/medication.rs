//! `Prescribing_Medication` -> `MedicationStatement`
//!
//! Unlike problems and observations, a medication without a standard drug code
//! is not filed: downstream dispensing checks cannot use vendor drug codes.

use super::observation::link_to_problem;
use super::{
    composite_key, effective_date, optional, patient_key, record_error, record_provenance,
    reference, required, RecordOutcome, TransformContext, Transformer,
};
use crate::core::parse::dispatch::PRESCRIBING_MEDICATION;
use crate::core::parse::schema::columns;
use crate::core::parse::RowCursor;
use crate::core::relationships::ChildReference;
use crate::domain::{CompositeKey, Resource, ResourceType, Result, TributaryError};
use async_trait::async_trait;
use serde_json::{json, Map};

const DRUG_CODE: &str = "DrugCode";
const DRUG_SCHEME: &str = "DrugScheme";

pub struct MedicationTransformer;

#[async_trait]
impl Transformer for MedicationTransformer {
    fn file_type(&self) -> &'static str {
        PRESCRIBING_MEDICATION
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::MedicationStatement
    }

    fn record_key(&self, cursor: &dyn RowCursor) -> Result<CompositeKey> {
        composite_key(cursor, columns::PATIENT_GUID, columns::MEDICATION_GUID)
    }

    async fn transform_record(
        &self,
        cursor: &dyn RowCursor,
        ctx: &mut TransformContext,
    ) -> Result<RecordOutcome> {
        let key = self.record_key(cursor)?;
        let patient = patient_key(cursor)?;
        let scheme = required(cursor, DRUG_SCHEME)?;
        let code = required(cursor, DRUG_CODE)?;
        let term = optional(cursor, columns::TERM)?;
        let effective = effective_date(cursor, ctx)?;
        let quantity = cursor.cell("Quantity")?.as_double()?;
        let quantity_unit = optional(cursor, "QuantityUnit")?;
        let dosage = optional(cursor, "DosageText")?.or(optional(cursor, "Dosage")?);
        let active = cursor.cell("IsActive")?.as_bool()?;

        let (concept, translated) = ctx.concept(scheme, code, term).await?;
        if translated.is_none() {
            return Err(record_error(
                cursor,
                DRUG_CODE,
                format!("no standard code for {scheme} drug '{code}'"),
            ));
        }

        let mut builder = Resource::builder(ResourceType::MedicationStatement)
            .source_key(key.clone())
            .patient(patient.clone())
            .field("medication", concept)
            .field("subject", reference(ResourceType::Patient, &patient))
            .optional_field(
                "status",
                active.map(|active| if active { "active" } else { "completed" }),
            )
            .optional_field("effective", effective.map(|d| d.to_json()))
            .optional_field("dosage", dosage.map(|text| json!([{ "text": text }])))
            .optional_field("processingId", optional(cursor, columns::PROCESSING_ID)?);

        if let Some(value) = quantity {
            let mut amount = Map::new();
            amount.insert("value".to_string(), json!(value));
            if let Some(unit) = quantity_unit {
                amount.insert("unit".to_string(), json!(unit));
            }
            builder = builder.field("quantity", json!(amount));
        }

        let child = ChildReference::new(ResourceType::MedicationStatement, key.clone());
        if let Some(problem) = link_to_problem(cursor, ctx, child)? {
            builder = builder.field("reasonReference", reference(ResourceType::Condition, &problem));
        }

        let resource = builder.build().map_err(TributaryError::Validation)?;
        ctx.filer
            .save_patient_resource(record_provenance(cursor)?, resource)
            .await?;
        ctx.mark_filed(ResourceType::MedicationStatement, &key);
        Ok(RecordOutcome::Saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::ResourceStore;
    use crate::core::transform::run_transformer;
    use crate::core::transform::test_support::{context, csv_cursor, SALBUTAMOL_DMD};

    fn medication_row<'a>(guid: &'a str, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut row = vec![
            ("MedicationGuid", guid),
            ("PatientGuid", "P1"),
            ("OrganisationGuid", "ORG1"),
            ("DrugCode", SALBUTAMOL_DMD),
            ("DrugScheme", "DMD"),
            ("Term", "Salbutamol 100micrograms/dose inhaler"),
        ];
        row.extend_from_slice(extra);
        row
    }

    #[tokio::test]
    async fn test_medication_mapped_with_quantity_and_problem() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, store) = context();
        let row = medication_row(
            "MED1",
            &[
                ("DosageText", "Two puffs when required"),
                ("Quantity", "1"),
                ("QuantityUnit", "inhaler"),
                ("IsActive", "1"),
                ("ProblemGuid", "PR1"),
            ],
        );
        let mut cursor = csv_cursor(dir.path(), PRESCRIBING_MEDICATION, "5.1", &[row.as_slice()]);

        let report = run_transformer(cursor.as_mut(), &MedicationTransformer, &mut ctx)
            .await
            .unwrap();
        assert_eq!(report.saved, 1);
        ctx.filer.wait_to_finish().await.unwrap();

        let statement = store
            .get(
                ResourceType::MedicationStatement,
                &CompositeKey::new("P1", "MED1").unwrap(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(statement.field("status"), Some(&json!("active")));
        assert_eq!(
            statement.field("quantity"),
            Some(&json!({"value": 1.0, "unit": "inhaler"}))
        );
        assert_eq!(
            statement.field("dosage"),
            Some(&json!([{"text": "Two puffs when required"}]))
        );
        assert_eq!(
            statement.field("medication").and_then(|m| m["coding"][0]["code"].as_str()),
            Some(SALBUTAMOL_DMD)
        );
        assert!(ctx
            .problem_links
            .has_pending(&CompositeKey::new("P1", "PR1").unwrap()));
    }

    #[tokio::test]
    async fn test_untranslated_drug_is_record_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _store) = context();
        let row = medication_row("MED2", &[("DrugCode", "999999"), ("IsActive", "0")]);
        let mut cursor = csv_cursor(dir.path(), PRESCRIBING_MEDICATION, "5.0", &[row.as_slice()]);

        let report = run_transformer(cursor.as_mut(), &MedicationTransformer, &mut ctx)
            .await
            .unwrap();
        assert_eq!(report.saved, 0);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.errors[0].column.as_deref(), Some("DrugCode"));
        assert!(ctx.problem_links.is_empty());
    }
}
