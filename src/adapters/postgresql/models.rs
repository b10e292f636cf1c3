//! PostgreSQL row models
//!
//! This module defines the row structure used when storing resources in
//! PostgreSQL.

use crate::domain::{CompositeKey, Resource, ResourceLink, ResourceType, Result, TributaryError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;
use uuid::Uuid;

/// Resource row for PostgreSQL storage
///
/// This structure maps to the `resources` table.
#[derive(Debug, Clone)]
pub struct PostgreSQLResource {
    pub resource_type: String,
    pub source_key: String,
    pub id: Uuid,
    pub patient_key: Option<String>,
    pub body: Value,
    pub links: Value,
    pub last_updated: DateTime<Utc>,
    /// Version of Tributary that wrote the row
    pub tool_version: String,
}

impl PostgreSQLResource {
    /// Convert from a domain resource, stamping identity and write time
    pub fn from_domain(resource: &Resource, id: Uuid, last_updated: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            resource_type: resource.resource_type.to_string(),
            source_key: resource.source_key.to_string(),
            id,
            patient_key: resource.patient.as_ref().map(|p| p.to_string()),
            body: Value::Object(resource.body.clone()),
            links: serde_json::to_value(&resource.links)?,
            last_updated,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Read a row returned by a `SELECT` over the `resources` columns
    pub fn from_row(row: &Row) -> Self {
        Self {
            resource_type: row.get("resource_type"),
            source_key: row.get("source_key"),
            id: row.get("id"),
            patient_key: row.get("patient_key"),
            body: row.get("body"),
            links: row.get("links"),
            last_updated: row.get("last_updated"),
            tool_version: row.get("tool_version"),
        }
    }

    /// Convert to a domain resource
    pub fn to_domain(&self) -> Result<Resource> {
        let resource_type: ResourceType = self
            .resource_type
            .parse()
            .map_err(TributaryError::Validation)?;
        let source_key: CompositeKey = self
            .source_key
            .parse()
            .map_err(TributaryError::Validation)?;
        let patient = self
            .patient_key
            .as_deref()
            .map(str::parse::<CompositeKey>)
            .transpose()
            .map_err(TributaryError::Validation)?;
        let body = match &self.body {
            Value::Object(map) => map.clone(),
            other => {
                return Err(TributaryError::Serialization(format!(
                    "resource body for {} {} is not an object: {}",
                    self.resource_type, self.source_key, other
                )))
            }
        };
        let links: Vec<ResourceLink> = serde_json::from_value(self.links.clone())?;

        Ok(Resource {
            resource_type,
            source_key,
            id: Some(self.id),
            patient,
            last_updated: Some(self.last_updated),
            body,
            links,
        })
    }
}
