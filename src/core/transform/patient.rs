//! `Admin_Patient` -> `Patient`

use super::organisation::organisation_key;
use super::{
    optional, patient_key, record_error, record_provenance, reference, FailurePolicy,
    RecordOutcome, TransformContext, Transformer,
};
use crate::core::parse::dispatch::ADMIN_PATIENT;
use crate::core::parse::schema::columns;
use crate::core::parse::RowCursor;
use crate::domain::{CompositeKey, Resource, ResourceType, Result, TributaryError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

fn gender(sex: &str) -> Option<&'static str> {
    match sex.to_ascii_uppercase().as_str() {
        "M" | "MALE" => Some("male"),
        "F" | "FEMALE" => Some("female"),
        "I" | "O" | "OTHER" | "INDETERMINATE" => Some("other"),
        "U" | "UNKNOWN" => Some("unknown"),
        _ => None,
    }
}

pub struct PatientTransformer;

#[async_trait]
impl Transformer for PatientTransformer {
    fn file_type(&self) -> &'static str {
        ADMIN_PATIENT
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Patient
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FailFast
    }

    fn record_key(&self, cursor: &dyn RowCursor) -> Result<CompositeKey> {
        patient_key(cursor)
    }

    async fn transform_record(
        &self,
        cursor: &dyn RowCursor,
        ctx: &mut TransformContext,
    ) -> Result<RecordOutcome> {
        let key = self.record_key(cursor)?;
        let organisation = organisation_key(cursor, columns::ORGANISATION_GUID)?;

        let mut name = Map::new();
        if let Some(family) = optional(cursor, "FamilyName")?.or(optional(cursor, "Surname")?) {
            name.insert("family".to_string(), json!(family));
        }
        if let Some(given) = optional(cursor, "GivenName")? {
            name.insert(
                "given".to_string(),
                json!(given.split_whitespace().collect::<Vec<_>>()),
            );
        }
        if let Some(title) = optional(cursor, "Title")? {
            name.insert("prefix".to_string(), json!([title]));
        }

        let sex = optional(cursor, "Sex")?;
        let gender_code = match sex {
            Some(value) => Some(gender(value).ok_or_else(|| {
                record_error(cursor, "Sex", format!("unrecognised sex code '{value}'"))
            })?),
            None => None,
        };

        let date_of_death = cursor.cell("DateOfDeath")?.as_date()?;
        let registered = cursor.cell("DateOfRegistration")?.as_date()?;
        let deactivated = cursor.cell("DateOfDeactivation")?.as_date()?;

        let mut builder = Resource::builder(ResourceType::Patient)
            .source_key(key.clone())
            .patient(key.clone())
            .field(
                "managingOrganization",
                reference(ResourceType::Organization, &organisation),
            )
            .field("deceased", json!(date_of_death.is_some()))
            .field("active", json!(deactivated.is_none()))
            .optional_field("nhsNumber", optional(cursor, "NhsNumber")?)
            .optional_field("gender", gender_code)
            .optional_field(
                "birthDate",
                cursor.cell("DateOfBirth")?.as_date()?.map(|d| d.to_string()),
            )
            .optional_field("deceasedDate", date_of_death.map(|d| d.to_string()))
            .optional_field("processingId", optional(cursor, columns::PROCESSING_ID)?);

        if !name.is_empty() {
            builder = builder.field("name", json!([Value::Object(name)]));
        }

        if registered.is_some() || deactivated.is_some() {
            let mut period = Map::new();
            if let Some(start) = registered {
                period.insert("start".to_string(), json!(start.to_string()));
            }
            if let Some(end) = deactivated {
                period.insert("end".to_string(), json!(end.to_string()));
            }
            builder = builder.field("registration", json!({ "period": period }));
        }

        let resource = builder.build().map_err(TributaryError::Validation)?;
        ctx.filer
            .save_patient_resource(record_provenance(cursor)?, resource)
            .await?;
        ctx.mark_filed(ResourceType::Patient, &key);
        Ok(RecordOutcome::Saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::ResourceStore;
    use crate::core::transform::run_transformer;
    use crate::core::transform::test_support::{context, csv_cursor};
    use test_case::test_case;

    #[test_case("M", Some("male"))]
    #[test_case("f", Some("female"))]
    #[test_case("U", Some("unknown"))]
    #[test_case("X", None)]
    fn test_gender_codes(code: &str, expected: Option<&str>) {
        assert_eq!(gender(code), expected);
    }

    #[tokio::test]
    async fn test_patient_mapped_with_registration_end_and_death() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, store) = context();
        let mut cursor = csv_cursor(
            dir.path(),
            ADMIN_PATIENT,
            "5.3",
            &[&[
                ("PatientGuid", "P1"),
                ("OrganisationGuid", "ORG1"),
                ("NhsNumber", "9434765919"),
                ("Title", "Mrs"),
                ("GivenName", "Ada Mary"),
                ("FamilyName", "Lovelace"),
                ("Sex", "F"),
                ("DateOfBirth", "10/12/1915"),
                ("DateOfDeath", "2019-11-27"),
                ("DateOfRegistration", "1990-01-01"),
                ("DateOfDeactivation", "2019-11-30"),
            ]],
        );

        run_transformer(cursor.as_mut(), &PatientTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        let key = CompositeKey::new("ORG1", "P1").unwrap();
        let patient = store
            .get(ResourceType::Patient, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patient.patient, Some(key));
        assert_eq!(patient.field("gender"), Some(&json!("female")));
        assert_eq!(patient.field("birthDate"), Some(&json!("1915-12-10")));
        assert_eq!(patient.field("deceased"), Some(&json!(true)));
        assert_eq!(patient.field("active"), Some(&json!(false)));
        assert_eq!(
            patient.field("name"),
            Some(&json!([{"family": "Lovelace", "given": ["Ada", "Mary"], "prefix": ["Mrs"]}]))
        );
        assert_eq!(
            patient.field("registration"),
            Some(&json!({"period": {"start": "1990-01-01", "end": "2019-11-30"}}))
        );
    }

    #[tokio::test]
    async fn test_older_version_reads_surname() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, store) = context();
        let mut cursor = csv_cursor(
            dir.path(),
            ADMIN_PATIENT,
            "5.0",
            &[&[
                ("PatientGuid", "P2"),
                ("OrganisationGuid", "ORG1"),
                ("Surname", "Babbage"),
            ]],
        );

        run_transformer(cursor.as_mut(), &PatientTransformer, &mut ctx)
            .await
            .unwrap();
        ctx.filer.wait_to_finish().await.unwrap();

        let patient = store
            .get(ResourceType::Patient, &CompositeKey::new("ORG1", "P2").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patient.field("name"), Some(&json!([{"family": "Babbage"}])));
        assert_eq!(patient.field("nhsNumber"), None);
        assert_eq!(patient.field("deceased"), Some(&json!(false)));
    }
}
