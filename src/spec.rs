//! Spec documents: the versioned column schemas datasets are validated
//! against, and the predicted specs graded by [`crate::scoring`].

use std::{collections::HashSet, fmt, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io_utils;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("Spec field name cannot be empty")]
    EmptyFieldName,
    #[error("Duplicate field name '{0}' in spec")]
    DuplicateField(String),
    #[error("Key '{0}' does not name a declared field")]
    UnknownKeyField(String),
    #[error("Relation source '{0}' does not name a declared field")]
    UnknownRelationField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "number", "boolean", "date", "datetime"]
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "datetime" | "date-time" | "timestamp" => Ok(FieldType::DateTime),
            _ => Err(anyhow!(
                "Unknown field type '{value}'. Supported types: {}",
                FieldType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Finance,
    Healthcare,
    Ecommerce,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default = "FieldSpec::default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_vals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            unit: None,
            enum_vals: Vec::new(),
            regex: None,
            is_primary: false,
            description: None,
        }
    }

    pub const fn default_nullable() -> bool {
        true
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_vals = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    /// Non-empty `enumVals` make the field a constrained string.
    pub fn is_enum(&self) -> bool {
        !self.enum_vals.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecKeys {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: String,
    pub to_spec: String,
    pub to_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDoc {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<SpecKeys>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SpecDoc {
    pub fn new(name: impl Into<String>, version: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            domain: None,
            fields,
            keys: None,
            relations: Vec::new(),
            examples: Vec::new(),
            notes: None,
        }
    }

    /// Structural checks a persisted spec must satisfy: unique non-empty
    /// field names, and keys/relations that refer to declared fields.
    pub fn check(&self) -> Result<(), SpecError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SpecError::EmptyFieldName);
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SpecError::DuplicateField(field.name.clone()));
            }
        }
        if let Some(keys) = &self.keys {
            for name in keys.primary.iter().chain(keys.unique.iter().flatten()) {
                if !seen.contains(name.as_str()) {
                    return Err(SpecError::UnknownKeyField(name.clone()));
                }
            }
        }
        for relation in &self.relations {
            if !seen.contains(relation.from.as_str()) {
                return Err(SpecError::UnknownRelationField(relation.from.clone()));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let spec: SpecDoc = io_utils::read_document(path)
            .with_context(|| format!("Loading spec from {path:?}"))?;
        spec.check()
            .with_context(|| format!("Checking spec {:?} v{}", spec.name, spec.version))?;
        Ok(spec)
    }
}

/// A spec proposed by a language model. Shaped like [`SpecDoc`] but with
/// everything except the field list optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "PredictedSpec::default_version")]
    pub version: String,
    pub fields: Vec<FieldSpec>,
}

impl PredictedSpec {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            title: None,
            version: Self::default_version(),
            fields,
        }
    }

    fn default_version() -> String {
        "predicted".to_string()
    }

    pub fn load(path: &Path) -> Result<Self> {
        io_utils::read_document(path).with_context(|| format!("Loading prediction from {path:?}"))
    }
}

impl From<SpecDoc> for PredictedSpec {
    fn from(spec: SpecDoc) -> Self {
        Self {
            title: Some(spec.name),
            version: spec.version,
            fields: spec.fields,
        }
    }
}
