//! Static terminology mappings from configuration

use super::{passthrough, TerminologyService};
use crate::config::schema::TerminologyConfig;
use crate::domain::{Coding, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Terminology service backed by a fixed (scheme, code) table
#[derive(Debug, Clone, Default)]
pub struct StaticTerminology {
    target_system: String,
    scheme_systems: HashMap<String, String>,
    mappings: HashMap<(String, String), Coding>,
}

impl StaticTerminology {
    pub fn new(target_system: impl Into<String>) -> Self {
        Self {
            target_system: target_system.into(),
            ..Self::default()
        }
    }

    /// Build the table from `[terminology]` configuration
    pub fn from_config(config: &TerminologyConfig) -> Self {
        let mut service = Self::new(config.target_system.clone());
        service.scheme_systems = config.scheme_systems.clone();
        for mapping in &config.mappings {
            let system = mapping
                .target_system
                .clone()
                .unwrap_or_else(|| config.target_system.clone());
            let mut coding = Coding::new(system, mapping.target_code.clone());
            if let Some(display) = &mapping.display {
                coding = coding.with_display(display.clone());
            }
            service.insert(&mapping.scheme, &mapping.code, coding);
        }
        service
    }

    /// Add or replace one mapping
    pub fn insert(&mut self, scheme: &str, code: &str, coding: Coding) {
        self.mappings
            .insert((scheme.to_string(), code.trim().to_string()), coding);
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[async_trait]
impl TerminologyService for StaticTerminology {
    async fn translate(&self, scheme: &str, code: &str) -> Result<Option<Coding>> {
        let code = code.trim();
        if let Some(coding) = self.mappings.get(&(scheme.to_string(), code.to_string())) {
            return Ok(Some(coding.clone()));
        }
        Ok(passthrough(
            &self.scheme_systems,
            &self.target_system,
            scheme,
            code,
        ))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::CodeMappingConfig;

    fn config() -> TerminologyConfig {
        TerminologyConfig {
            mappings: vec![
                CodeMappingConfig {
                    scheme: "READ2".to_string(),
                    code: "H33..".to_string(),
                    target_system: None,
                    target_code: "195967001".to_string(),
                    display: Some("Asthma".to_string()),
                },
                CodeMappingConfig {
                    scheme: "DMD".to_string(),
                    code: "39113611000001102".to_string(),
                    target_system: Some("https://dmd.nhs.uk".to_string()),
                    target_code: "39113611000001102".to_string(),
                    display: None,
                },
            ],
            ..TerminologyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_configured_mapping_translates() {
        let service = StaticTerminology::from_config(&config());
        assert_eq!(service.len(), 2);

        let coding = service.translate("READ2", " H33.. ").await.unwrap().unwrap();
        assert_eq!(coding.system, "http://snomed.info/sct");
        assert_eq!(coding.code, "195967001");
        assert_eq!(coding.display.as_deref(), Some("Asthma"));

        let dmd = service
            .translate("DMD", "39113611000001102")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dmd.system, "https://dmd.nhs.uk");
    }

    #[tokio::test]
    async fn test_unmapped_code_is_none() {
        let service = StaticTerminology::from_config(&config());
        assert!(service.translate("READ2", "ZZZZ.").await.unwrap().is_none());
        assert!(service.translate("EMIS", "H33..").await.unwrap().is_none());
    }
}
