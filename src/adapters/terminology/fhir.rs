//! FHIR terminology server client
//!
//! Translates codes with the `ConceptMap/$translate` operation. Results,
//! including "no translation", are cached for the life of the client.

use super::{passthrough, TerminologyService};
use crate::config::schema::TerminologyConfig;
use crate::domain::{Coding, Result, TributaryError};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

type CacheKey = (String, String);

/// `$translate` client
pub struct FhirTerminologyClient {
    base_url: String,
    target_system: String,
    scheme_systems: HashMap<String, String>,
    client: Client,
    cache: Mutex<HashMap<CacheKey, Option<Coding>>>,
}

#[derive(Debug, Deserialize)]
struct Parameters {
    #[serde(default)]
    parameter: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Parameter {
    name: String,
    #[serde(default)]
    value_boolean: Option<bool>,
    #[serde(default)]
    value_coding: Option<ValueCoding>,
    #[serde(default)]
    part: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
struct ValueCoding {
    system: Option<String>,
    code: Option<String>,
    display: Option<String>,
}

impl FhirTerminologyClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no base URL is configured or the HTTP
    /// client cannot be built.
    pub fn new(config: &TerminologyConfig) -> Result<Self> {
        let base_url = config
            .fhir_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                TributaryError::Configuration(
                    "terminology.fhir_base_url is required for the FHIR terminology client"
                        .to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();

        let mut client_builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));

        if !config.tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder.build().map_err(|e| {
            TributaryError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            base_url,
            target_system: config.target_system.clone(),
            scheme_systems: config.scheme_systems.clone(),
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of cached translations
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn source_system<'a>(&'a self, scheme: &'a str) -> &'a str {
        self.scheme_systems
            .get(scheme)
            .map(String::as_str)
            .unwrap_or(scheme)
    }

    async fn request_translation(&self, scheme: &str, code: &str) -> Result<Option<Coding>> {
        let url = format!("{}/ConceptMap/$translate", self.base_url);
        let system = self.source_system(scheme);

        tracing::debug!(system = %system, code = %code, "Requesting terminology translation");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("system", system),
                ("code", code),
                ("targetsystem", self.target_system.as_str()),
            ])
            .header("Accept", "application/fhir+json")
            .send()
            .await
            .map_err(|e| TributaryError::Terminology(format!("translate request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TributaryError::Terminology(format!(
                "translate of {scheme} {code} failed with status {status}: {body}"
            )));
        }

        let parameters: Parameters = response.json().await.map_err(|e| {
            TributaryError::Terminology(format!("invalid translate response: {e}"))
        })?;

        Ok(first_match(&parameters, &self.target_system))
    }
}

/// First `match.concept` of a positive `$translate` result
fn first_match(parameters: &Parameters, target_system: &str) -> Option<Coding> {
    let result = parameters
        .parameter
        .iter()
        .find(|p| p.name == "result")
        .and_then(|p| p.value_boolean)
        .unwrap_or(false);
    if !result {
        return None;
    }

    parameters
        .parameter
        .iter()
        .filter(|p| p.name == "match")
        .flat_map(|p| p.part.iter())
        .filter(|part| part.name == "concept")
        .filter_map(|part| part.value_coding.as_ref())
        .find_map(|vc| {
            let code = vc.code.as_ref()?;
            let system = vc.system.clone().unwrap_or_else(|| target_system.to_string());
            let coding = Coding::new(system, code.clone());
            Some(match &vc.display {
                Some(display) => coding.with_display(display.clone()),
                None => coding,
            })
        })
}

#[async_trait]
impl TerminologyService for FhirTerminologyClient {
    async fn translate(&self, scheme: &str, code: &str) -> Result<Option<Coding>> {
        let code = code.trim();
        if let Some(coding) = passthrough(&self.scheme_systems, &self.target_system, scheme, code)
        {
            return Ok(Some(coding));
        }

        let key = (scheme.to_string(), code.to_string());
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        let translated = self.request_translation(scheme, code).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, translated.clone());
        }
        Ok(translated)
    }

    fn name(&self) -> &str {
        "fhir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TerminologyMode;
    use mockito::Matcher;

    fn config(base_url: String) -> TerminologyConfig {
        let mut scheme_systems = HashMap::new();
        scheme_systems.insert("READ2".to_string(), "http://read.info/readv2".to_string());
        TerminologyConfig {
            mode: TerminologyMode::Fhir,
            fhir_base_url: Some(base_url),
            timeout_seconds: 5,
            scheme_systems,
            ..TerminologyConfig::default()
        }
    }

    const MATCH_BODY: &str = r#"{
        "resourceType": "Parameters",
        "parameter": [
            {"name": "result", "valueBoolean": true},
            {"name": "match", "part": [
                {"name": "equivalence", "valueCode": "equivalent"},
                {"name": "concept", "valueCoding": {
                    "system": "http://snomed.info/sct",
                    "code": "195967001",
                    "display": "Asthma"
                }}
            ]}
        ]
    }"#;

    #[tokio::test]
    async fn test_translate_parses_match_and_caches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ConceptMap/$translate")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("system".into(), "http://read.info/readv2".into()),
                Matcher::UrlEncoded("code".into(), "H33..".into()),
                Matcher::UrlEncoded("targetsystem".into(), "http://snomed.info/sct".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/fhir+json")
            .with_body(MATCH_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = FhirTerminologyClient::new(&config(server.url())).unwrap();
        let coding = client.translate("READ2", "H33..").await.unwrap().unwrap();
        assert_eq!(coding.code, "195967001");
        assert_eq!(coding.display.as_deref(), Some("Asthma"));

        let again = client.translate("READ2", "H33..").await.unwrap();
        assert_eq!(again, Some(coding));
        assert_eq!(client.cached(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_negative_result_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ConceptMap/$translate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"resourceType":"Parameters","parameter":[{"name":"result","valueBoolean":false}]}"#)
            .create_async()
            .await;

        let client = FhirTerminologyClient::new(&config(server.url())).unwrap();
        assert!(client.translate("READ2", "ZZZZ.").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_terminology_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ConceptMap/$translate")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let client = FhirTerminologyClient::new(&config(server.url())).unwrap();
        let result = client.translate("READ2", "H33..").await;
        assert!(matches!(result, Err(TributaryError::Terminology(_))));
        assert_eq!(client.cached(), 0);
    }

    #[test]
    fn test_missing_base_url_rejected() {
        let mut cfg = config(String::new());
        cfg.fhir_base_url = None;
        assert!(matches!(
            FhirTerminologyClient::new(&cfg),
            Err(TributaryError::Configuration(_))
        ));
    }
}
