//! Compiles a [`SpecDoc`] into a row-level validator.
//!
//! Each declared field becomes a [`FieldRule`]: one [`FieldCheck`] plus the
//! nullable flag and an optional pattern. A [`CompiledSpec`] is immutable and
//! can be shared across threads; validating a record never panics and
//! reports every failing field rather than stopping at the first.

use std::collections::HashSet;

use log::{debug, warn};
use regex::Regex;

use crate::{
    data::{DateCoercion, RawValue, Value, coerce_boolean, coerce_date, coerce_number},
    spec::{FieldSpec, FieldType, SpecDoc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Strip unit text trailing a number before parsing it.
    pub unit_tool: bool,
    /// Reject record keys the spec does not declare.
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            unit_tool: false,
            strict: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldCheck {
    Number { unit_tool: bool },
    Boolean,
    Date,
    String,
    Enum(Vec<String>),
}

impl FieldCheck {
    fn for_field(field: &FieldSpec, options: CompileOptions) -> Self {
        if field.is_enum() {
            return FieldCheck::Enum(field.enum_vals.clone());
        }
        match field.field_type {
            FieldType::Number => FieldCheck::Number {
                unit_tool: options.unit_tool,
            },
            FieldType::Boolean => FieldCheck::Boolean,
            FieldType::Date => FieldCheck::Date,
            FieldType::String | FieldType::DateTime => FieldCheck::String,
        }
    }

    pub fn expected(&self) -> String {
        match self {
            FieldCheck::Number { .. } => "number".to_string(),
            FieldCheck::Boolean => "boolean".to_string(),
            FieldCheck::Date => "date".to_string(),
            FieldCheck::String => "string".to_string(),
            FieldCheck::Enum(values) => values.join(" | "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Required,
    InvalidType,
    InvalidEnum,
    PatternMismatch,
    UnrecognizedKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
    pub value: Option<String>,
    pub expected: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub check: FieldCheck,
    pub nullable: bool,
    pattern: Option<Regex>,
}

impl FieldRule {
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    fn violation(&self, kind: ViolationKind, message: String, raw: &RawValue) -> FieldViolation {
        FieldViolation {
            field: self.name.clone(),
            kind,
            message,
            value: (!matches!(raw, RawValue::Null)).then(|| raw.as_text()),
            expected: Some(self.check.expected()),
        }
    }

    /// Coerces and checks one raw value. An empty string is a present value
    /// for string fields; every other check needs more than that.
    pub fn apply(&self, raw: &RawValue) -> Result<Value, FieldViolation> {
        if raw.is_empty() {
            if self.nullable {
                return Ok(Value::Null);
            }
            let empty_string =
                self.check == FieldCheck::String && matches!(raw, RawValue::Text(_));
            if !empty_string {
                return Err(self.violation(ViolationKind::Required, "Required".to_string(), raw));
            }
        }

        let value = match &self.check {
            FieldCheck::Number { unit_tool } => match coerce_number(raw, *unit_tool) {
                RawValue::Number(n) if n.is_finite() => Value::Number(n),
                RawValue::Null if self.nullable => Value::Null,
                other => {
                    return Err(self.violation(
                        ViolationKind::InvalidType,
                        format!("Expected number, received {}", received(&other)),
                        raw,
                    ));
                }
            },
            FieldCheck::Boolean => match coerce_boolean(raw) {
                RawValue::Boolean(b) => Value::Boolean(b),
                other => {
                    return Err(self.violation(
                        ViolationKind::InvalidType,
                        format!("Expected boolean, received {}", other.type_name()),
                        raw,
                    ));
                }
            },
            FieldCheck::Date => match coerce_date(raw) {
                DateCoercion::Valid(parsed) => Value::Date(parsed),
                DateCoercion::Empty if self.nullable => Value::Null,
                DateCoercion::Empty | DateCoercion::Invalid => {
                    return Err(self.violation(
                        ViolationKind::InvalidType,
                        "Invalid date".to_string(),
                        raw,
                    ));
                }
            },
            FieldCheck::String => match raw {
                RawValue::Text(text) => Value::Text(text.clone()),
                other => {
                    return Err(self.violation(
                        ViolationKind::InvalidType,
                        format!("Expected string, received {}", other.type_name()),
                        raw,
                    ));
                }
            },
            FieldCheck::Enum(values) => {
                let text = raw.as_text();
                if !values.iter().any(|v| *v == text) {
                    let expected = values
                        .iter()
                        .map(|v| format!("'{v}'"))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    return Err(self.violation(
                        ViolationKind::InvalidEnum,
                        format!("Invalid enum value. Expected {expected}, received '{text}'"),
                        raw,
                    ));
                }
                Value::Text(text)
            }
        };

        if let (Some(pattern), Value::Text(text)) = (&self.pattern, &value)
            && !pattern.is_match(text)
        {
            return Err(self.violation(
                ViolationKind::PatternMismatch,
                "String does not match required pattern".to_string(),
                raw,
            ));
        }
        Ok(value)
    }
}

fn received(value: &RawValue) -> &'static str {
    match value {
        RawValue::Number(n) if !n.is_finite() => "non-finite number",
        other => other.type_name(),
    }
}

/// Ordered, named raw values for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    entries: Vec<(String, RawValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawRecord
where
    K: Into<String>,
    V: Into<RawValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RawRecord::new();
        for (key, value) in iter {
            record.insert(key, value.into());
        }
        record
    }
}

/// A record whose every declared field passed its check, in spec order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRecord {
    pub values: Vec<(String, Value)>,
}

impl TypedRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledSpec {
    rules: Vec<FieldRule>,
    declared: HashSet<String>,
    strict: bool,
    diagnostics: Vec<String>,
}

/// Builds the validator for `spec`. Never fails: a regex that does not
/// compile is dropped and reported through [`CompiledSpec::diagnostics`].
pub fn compile(spec: &SpecDoc, options: CompileOptions) -> CompiledSpec {
    let mut diagnostics = Vec::new();
    let rules = spec
        .fields
        .iter()
        .map(|field| {
            let check = FieldCheck::for_field(field, options);
            let applies_pattern = field.field_type == FieldType::String || field.is_enum();
            let pattern = match field.regex.as_deref() {
                Some(raw) if applies_pattern => match Regex::new(raw) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        warn!("Ignoring invalid pattern on field '{}': {err}", field.name);
                        diagnostics.push(format!(
                            "Field '{}' has an invalid regex '{raw}': {err}",
                            field.name
                        ));
                        None
                    }
                },
                _ => None,
            };
            FieldRule {
                name: field.name.clone(),
                check,
                nullable: field.nullable,
                pattern,
            }
        })
        .collect::<Vec<_>>();
    let declared = rules.iter().map(|r| r.name.clone()).collect();
    debug!(
        "Compiled spec '{}' v{} into {} field rule(s) (unit_tool={}, strict={})",
        spec.name,
        spec.version,
        rules.len(),
        options.unit_tool,
        options.strict
    );
    CompiledSpec {
        rules,
        declared,
        strict: options.strict,
        diagnostics,
    }
}

impl CompiledSpec {
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn recognizes(&self, key: &str) -> bool {
        self.declared.contains(key)
    }

    /// Checks one record. Declared fields missing from the record are treated
    /// as absent values; in strict mode undeclared keys are violations too.
    pub fn validate(&self, record: &RawRecord) -> Result<TypedRecord, Vec<FieldViolation>> {
        let mut values = Vec::with_capacity(self.rules.len());
        let mut violations = Vec::new();
        for rule in &self.rules {
            let raw = record.get(&rule.name).unwrap_or(&RawValue::Null);
            match rule.apply(raw) {
                Ok(value) => values.push((rule.name.clone(), value)),
                Err(violation) => violations.push(violation),
            }
        }
        if self.strict {
            violations.extend(
                record
                    .keys()
                    .filter(|key| !self.recognizes(key))
                    .map(|key| FieldViolation {
                        field: key.to_string(),
                        kind: ViolationKind::UnrecognizedKey,
                        message: format!("Unrecognized key '{key}'"),
                        value: record.get(key).map(RawValue::as_text),
                        expected: None,
                    }),
            );
        }
        if violations.is_empty() {
            Ok(TypedRecord { values })
        } else {
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FieldSpec;

    fn spec(fields: Vec<FieldSpec>) -> SpecDoc {
        SpecDoc::new("test", "1", fields)
    }

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn number_field_coerces_grouped_values() {
        let compiled = compile(
            &spec(vec![FieldSpec::new("amount", FieldType::Number).required()]),
            CompileOptions::default(),
        );
        let typed = compiled
            .validate(&record(&[("amount", "1,200.50")]))
            .expect("valid row");
        assert_eq!(typed.get("amount"), Some(&Value::Number(1200.5)));

        let errors = compiled.validate(&record(&[("amount", "")])).unwrap_err();
        assert_eq!(errors[0].kind, ViolationKind::Required);

        let errors = compiled.validate(&record(&[("amount", "abc")])).unwrap_err();
        assert_eq!(errors[0].kind, ViolationKind::InvalidType);
        assert_eq!(errors[0].value.as_deref(), Some("abc"));
    }

    #[test]
    fn nullable_number_accepts_empty_and_unparsable_as_null() {
        let compiled = compile(
            &spec(vec![FieldSpec::new("amount", FieldType::Number)]),
            CompileOptions::default(),
        );
        let typed = compiled.validate(&record(&[("amount", "")])).unwrap();
        assert!(typed.get("amount").unwrap().is_null());
        let typed = compiled.validate(&record(&[("amount", "n/a")])).unwrap();
        assert!(typed.get("amount").unwrap().is_null());
        assert!(compiled.validate(&record(&[("amount", "1e400")])).is_err());
    }

    #[test]
    fn unit_tool_strips_trailing_units() {
        let fields = vec![FieldSpec::new("weight", FieldType::Number).required()];
        let plain = compile(&spec(fields.clone()), CompileOptions::default());
        let with_units = compile(
            &spec(fields),
            CompileOptions {
                unit_tool: true,
                ..CompileOptions::default()
            },
        );
        let row = record(&[("weight", "12.5 kg")]);
        assert!(plain.validate(&row).is_err());
        assert_eq!(
            with_units.validate(&row).unwrap().get("weight"),
            Some(&Value::Number(12.5))
        );
    }

    #[test]
    fn boolean_and_date_checks_reject_unknown_spellings() {
        let compiled = compile(
            &spec(vec![
                FieldSpec::new("active", FieldType::Boolean).required(),
                FieldSpec::new("joined", FieldType::Date).required(),
            ]),
            CompileOptions::default(),
        );
        assert!(
            compiled
                .validate(&record(&[("active", "Yes"), ("joined", "2024-01-31")]))
                .is_ok()
        );
        let errors = compiled
            .validate(&record(&[("active", "maybe"), ("joined", "31st Jan")]))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "active");
        assert_eq!(errors[1].message, "Invalid date");
    }

    #[test]
    fn enum_takes_precedence_over_declared_type() {
        let compiled = compile(
            &spec(vec![
                FieldSpec::new("size", FieldType::Number)
                    .required()
                    .with_enum(["1", "2", "3"]),
            ]),
            CompileOptions::default(),
        );
        assert_eq!(
            compiled
                .validate(&RawRecord::from_iter([("size", RawValue::Number(2.0))]))
                .unwrap()
                .get("size"),
            Some(&Value::Text("2".into()))
        );
        let errors = compiled.validate(&record(&[("size", "4")])).unwrap_err();
        assert_eq!(errors[0].kind, ViolationKind::InvalidEnum);
    }

    #[test]
    fn datetime_fields_are_checked_as_strings() {
        let compiled = compile(
            &spec(vec![FieldSpec::new("ts", FieldType::DateTime).required()]),
            CompileOptions::default(),
        );
        assert_eq!(compiled.rules()[0].check, FieldCheck::String);
        for stamp in ["2024-01-01 10:00 UTC+8", "soon"] {
            let typed = compiled
                .validate(&record(&[("ts", stamp)]))
                .expect("any text is a datetime");
            assert_eq!(typed.get("ts"), Some(&Value::Text(stamp.to_string())));
        }
        let errors = compiled.validate(&RawRecord::new()).unwrap_err();
        assert_eq!(errors[0].kind, ViolationKind::Required);
    }

    #[test]
    fn empty_string_is_present_for_required_string_fields() {
        let compiled = compile(
            &spec(vec![
                FieldSpec::new("name", FieldType::String).required(),
                FieldSpec::new("status", FieldType::String)
                    .required()
                    .with_enum(["open"]),
            ]),
            CompileOptions::default(),
        );
        let errors = compiled
            .validate(&record(&[("name", ""), ("status", "")]))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "status");
        assert_eq!(errors[0].kind, ViolationKind::Required);

        let errors = compiled
            .validate(&RawRecord::from_iter([
                ("name", RawValue::Null),
                ("status", RawValue::from("open")),
            ]))
            .unwrap_err();
        assert_eq!(errors[0].field, "name");
        assert_eq!(errors[0].kind, ViolationKind::Required);
    }

    #[test]
    fn whitespace_only_is_a_value_not_a_null() {
        let compiled = compile(
            &spec(vec![
                FieldSpec::new("amount", FieldType::Number),
                FieldSpec::new("active", FieldType::Boolean),
                FieldSpec::new("joined", FieldType::Date),
            ]),
            CompileOptions::default(),
        );
        let errors = compiled
            .validate(&record(&[("amount", "  "), ("active", " "), ("joined", " ")]))
            .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.kind == ViolationKind::InvalidType));
        assert!(
            compiled
                .validate(&record(&[("amount", ""), ("active", ""), ("joined", "")]))
                .is_ok()
        );
    }

    #[test]
    fn regex_also_constrains_enum_values() {
        let compiled = compile(
            &spec(vec![
                FieldSpec::new("code", FieldType::String)
                    .required()
                    .with_enum(["AB", "cd"])
                    .with_regex("^[A-Z]+$"),
            ]),
            CompileOptions::default(),
        );
        assert!(compiled.validate(&record(&[("code", "AB")])).is_ok());
        let errors = compiled.validate(&record(&[("code", "cd")])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::PatternMismatch);
        assert_eq!(errors[0].value.as_deref(), Some("cd"));
    }

    #[test]
    fn regex_applies_to_string_fields_only() {
        let compiled = compile(
            &spec(vec![
                FieldSpec::new("sku", FieldType::String).with_regex("^[A-Z]{3}-[0-9]+$"),
                FieldSpec::new("qty", FieldType::Number).with_regex("^never$"),
            ]),
            CompileOptions::default(),
        );
        assert!(compiled.rules()[1].pattern().is_none());
        assert!(
            compiled
                .validate(&record(&[("sku", "ABC-12"), ("qty", "3")]))
                .is_ok()
        );
        let errors = compiled.validate(&record(&[("sku", "abc-12")])).unwrap_err();
        assert_eq!(errors[0].kind, ViolationKind::PatternMismatch);
    }

    #[test]
    fn invalid_regex_is_reported_not_fatal() {
        let compiled = compile(
            &spec(vec![FieldSpec::new("code", FieldType::String).with_regex("([a-z")]),
            CompileOptions::default(),
        );
        assert_eq!(compiled.diagnostics().len(), 1);
        assert!(compiled.validate(&record(&[("code", "x")])).is_ok());
    }

    #[test]
    fn strict_mode_rejects_undeclared_keys() {
        let fields = vec![FieldSpec::new("id", FieldType::Number)];
        let strict = compile(&spec(fields.clone()), CompileOptions::default());
        let lenient = compile(
            &spec(fields),
            CompileOptions {
                strict: false,
                ..CompileOptions::default()
            },
        );
        let row = record(&[("id", "1"), ("total", "9")]);
        let errors = strict.validate(&row).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::UnrecognizedKey);
        assert_eq!(errors[0].field, "total");
        assert!(lenient.validate(&row).is_ok());
    }

    #[test]
    fn string_field_rejects_native_numbers() {
        let compiled = compile(
            &spec(vec![FieldSpec::new("name", FieldType::String)]),
            CompileOptions::default(),
        );
        let errors = compiled
            .validate(&RawRecord::from_iter([("name", RawValue::Number(3.0))]))
            .unwrap_err();
        assert_eq!(errors[0].message, "Expected string, received number");
    }
}
