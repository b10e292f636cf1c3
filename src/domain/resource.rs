//! Target resource domain model
//!
//! A [`Resource`] is the durable output record for one source entity. The core
//! constructs and updates resources and hands them to the resource filer, which
//! owns their lifecycle from then on.

use super::ids::{CompositeKey, ResourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A coded value in some coding system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    /// Coding system URI or vendor scheme name
    pub system: String,

    /// Code within the system
    pub code: String,

    /// Optional human readable display term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    /// Creates a new coding
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            display: None,
        }
    }

    /// Sets the display term
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// Reference from an owner resource to one of its linked child resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLink {
    /// Type of the linked resource
    pub resource_type: ResourceType,

    /// Composite key of the linked resource
    pub key: CompositeKey,
}

impl ResourceLink {
    /// Creates a new resource link
    pub fn new(resource_type: ResourceType, key: CompositeKey) -> Self {
        Self { resource_type, key }
    }
}

/// A target resource
///
/// # Examples
///
/// ```
/// use tributary::domain::resource::ResourceBuilder;
/// use tributary::domain::ids::{CompositeKey, ResourceType};
/// use serde_json::json;
///
/// let resource = ResourceBuilder::new(ResourceType::Condition)
///     .source_key(CompositeKey::new("P1", "PROB1").unwrap())
///     .patient(CompositeKey::new("ORG1", "P1").unwrap())
///     .field("clinicalStatus", json!("active"))
///     .build()
///     .unwrap();
///
/// assert_eq!(resource.field("clinicalStatus"), Some(&json!("active")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type
    pub resource_type: ResourceType,

    /// Composite key of the source entity this resource was built from
    pub source_key: CompositeKey,

    /// Store-assigned identity (set by the store's identity mapping)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Owning patient, for patient-scoped resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<CompositeKey>,

    /// Last write time as recorded by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Mapped fields
    #[serde(default)]
    pub body: Map<String, Value>,

    /// Linked child resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<ResourceLink>,
}

impl Resource {
    /// Creates a new builder for constructing a Resource
    pub fn builder(resource_type: ResourceType) -> ResourceBuilder {
        ResourceBuilder::new(resource_type)
    }

    /// Returns a mapped field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Sets a mapped field
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.body.insert(name.into(), value);
    }

    /// Adds a link to a child resource
    ///
    /// Returns false if an identical link was already present.
    pub fn add_link(&mut self, link: ResourceLink) -> bool {
        if self.links.contains(&link) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Returns true if the resource already links to the given child
    pub fn has_link(&self, resource_type: ResourceType, key: &CompositeKey) -> bool {
        self.links
            .iter()
            .any(|l| l.resource_type == resource_type && &l.key == key)
    }
}

/// Builder for constructing Resource instances
#[derive(Debug)]
pub struct ResourceBuilder {
    resource_type: ResourceType,
    source_key: Option<CompositeKey>,
    patient: Option<CompositeKey>,
    body: Map<String, Value>,
    links: Vec<ResourceLink>,
}

impl ResourceBuilder {
    /// Creates a new ResourceBuilder
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            source_key: None,
            patient: None,
            body: Map::new(),
            links: Vec::new(),
        }
    }

    /// Sets the source composite key
    pub fn source_key(mut self, key: CompositeKey) -> Self {
        self.source_key = Some(key);
        self
    }

    /// Sets the owning patient
    pub fn patient(mut self, patient: CompositeKey) -> Self {
        self.patient = Some(patient);
        self
    }

    /// Sets a mapped field
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.body.insert(name.into(), value);
        self
    }

    /// Sets a mapped field only if a value is present
    pub fn optional_field<T: Into<Value>>(mut self, name: impl Into<String>, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.body.insert(name.into(), value.into());
        }
        self
    }

    /// Adds a child link
    pub fn link(mut self, link: ResourceLink) -> Self {
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        self
    }

    /// Builds the Resource
    ///
    /// # Errors
    ///
    /// Returns an error if the source key is missing, or if a patient-scoped
    /// resource type has no owning patient
    pub fn build(self) -> Result<Resource, String> {
        let source_key = self.source_key.ok_or("source_key is required")?;
        if !self.resource_type.is_admin()
            && self.resource_type != ResourceType::Patient
            && self.patient.is_none()
        {
            return Err(format!(
                "patient is required for {} resources",
                self.resource_type
            ));
        }
        Ok(Resource {
            resource_type: self.resource_type,
            source_key,
            id: None,
            patient: self.patient,
            last_updated: None,
            body: self.body,
            links: self.links,
        })
    }
}
