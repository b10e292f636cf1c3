//! Terminology integration
//!
//! Vendor extracts code clinical concepts in vendor schemes; resources carry
//! codes in a single target system. A [`TerminologyService`] translates one
//! (scheme, code) pair at a time.
//!
//! - [`StaticTerminology`] - mappings listed in `[terminology]` configuration
//! - [`FhirTerminologyClient`] - a FHIR terminology server's `ConceptMap/$translate`

pub mod fhir;
pub mod static_map;

pub use fhir::FhirTerminologyClient;
pub use static_map::StaticTerminology;

use crate::config::schema::{TerminologyConfig, TerminologyMode};
use crate::domain::{Coding, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Code translation service
#[async_trait]
pub trait TerminologyService: Send + Sync {
    /// Translate a vendor code into the target system
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the service has no translation for the code.
    ///
    /// # Errors
    ///
    /// Returns a terminology error if the service cannot be queried.
    async fn translate(&self, scheme: &str, code: &str) -> Result<Option<Coding>>;

    /// Get the service name
    fn name(&self) -> &str;
}

/// Create the terminology service selected by `terminology.mode`
pub fn create_terminology(
    config: &TerminologyConfig,
) -> Result<Arc<dyn TerminologyService + Send + Sync>> {
    match config.mode {
        TerminologyMode::Static => {
            tracing::info!(mappings = config.mappings.len(), "Using static terminology mappings");
            Ok(Arc::new(StaticTerminology::from_config(config)))
        }
        TerminologyMode::Fhir => {
            let client = FhirTerminologyClient::new(config)?;
            tracing::info!(base_url = %client.base_url(), "Using FHIR terminology server");
            Ok(Arc::new(client))
        }
    }
}

/// Codes whose scheme already maps to the target system need no lookup
pub(crate) fn passthrough(
    scheme_systems: &HashMap<String, String>,
    target_system: &str,
    scheme: &str,
    code: &str,
) -> Option<Coding> {
    scheme_systems
        .get(scheme)
        .filter(|system| system.as_str() == target_system)
        .map(|system| Coding::new(system.clone(), code))
}
