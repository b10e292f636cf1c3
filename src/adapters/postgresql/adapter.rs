//! PostgreSQL adapter implementing the resource store trait

use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::PostgreSQLResource;
use crate::adapters::store::traits::ResourceStore;
use crate::domain::{CompositeKey, Resource, ResourceType, Result, TributaryError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const RESOURCE_COLUMNS: &str =
    "resource_type, source_key, id, patient_key, body, links, last_updated, tool_version";

/// PostgreSQL implementation of [`ResourceStore`]
///
/// Identities live in `resource_identities` and survive deletes from `resources`.
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a new PostgreSQL adapter with an Arc-wrapped client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    /// Returns the stable identity for a key, allocating one on first use
    async fn identity_for(&self, resource_type: &str, source_key: &str) -> Result<Uuid> {
        let query = r#"
            WITH inserted AS (
                INSERT INTO resource_identities (resource_type, source_key, id)
                VALUES ($1, $2, $3)
                ON CONFLICT (resource_type, source_key) DO NOTHING
                RETURNING id
            )
            SELECT id FROM inserted
            UNION ALL
            SELECT id FROM resource_identities WHERE resource_type = $1 AND source_key = $2
            LIMIT 1
        "#;

        let candidate = Uuid::new_v4();
        let rows = self
            .client
            .query(query, &[&resource_type, &source_key, &candidate])
            .await?;
        rows.first().map(|row| row.get::<_, Uuid>("id")).ok_or_else(|| {
            TributaryError::Database(format!(
                "no identity allocated for {resource_type} {source_key}"
            ))
        })
    }
}

#[async_trait]
impl ResourceStore for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }

    async fn upsert(&self, resource: Resource) -> Result<Resource> {
        let resource_type = resource.resource_type.to_string();
        let source_key = resource.source_key.to_string();
        let id = self.identity_for(&resource_type, &source_key).await?;
        let row = PostgreSQLResource::from_domain(&resource, id, Utc::now())?;

        let upsert_query = r#"
            INSERT INTO resources (
                resource_type, source_key, id, patient_key, body, links, last_updated, tool_version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (resource_type, source_key) DO UPDATE SET
                patient_key = EXCLUDED.patient_key,
                body = EXCLUDED.body,
                links = EXCLUDED.links,
                last_updated = EXCLUDED.last_updated,
                tool_version = EXCLUDED.tool_version
        "#;

        self.client
            .execute(
                upsert_query,
                &[
                    &row.resource_type,
                    &row.source_key,
                    &row.id,
                    &row.patient_key,
                    &row.body,
                    &row.links,
                    &row.last_updated,
                    &row.tool_version,
                ],
            )
            .await?;

        tracing::debug!(
            resource_type = %resource.resource_type,
            key = %resource.source_key,
            id = %id,
            "Upserted resource"
        );

        let mut stored = resource;
        stored.id = Some(id);
        stored.last_updated = Some(row.last_updated);
        Ok(stored)
    }

    async fn delete(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        let affected = self
            .client
            .execute(
                "DELETE FROM resources WHERE resource_type = $1 AND source_key = $2",
                &[&resource_type.as_str(), &key.to_string()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn get(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<Option<Resource>> {
        let query = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE resource_type = $1 AND source_key = $2"
        );
        let rows = self
            .client
            .query(&query, &[&resource_type.as_str(), &key.to_string()])
            .await?;

        rows.first()
            .map(|row| PostgreSQLResource::from_row(row).to_domain())
            .transpose()
    }

    async fn exists(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        let rows = self
            .client
            .query(
                "SELECT EXISTS(SELECT 1 FROM resources WHERE resource_type = $1 AND source_key = $2)",
                &[&resource_type.as_str(), &key.to_string()],
            )
            .await?;
        Ok(rows.first().map(|row| row.get::<_, bool>(0)).unwrap_or(false))
    }

    async fn count(&self, resource_type: ResourceType) -> Result<usize> {
        let rows = self
            .client
            .query(
                "SELECT COUNT(*) FROM resources WHERE resource_type = $1",
                &[&resource_type.as_str()],
            )
            .await?;
        let count: i64 = rows.first().map(|row| row.get(0)).unwrap_or(0);
        Ok(count.max(0) as usize)
    }

    fn store_name(&self) -> &str {
        "postgresql"
    }
}
