//! Record schema and in-memory row representation.
//!
//! # Responsibility
//! - Declare the field set, required fields and defaults of one record kind.
//! - Turn a record into storage-ready attribute maps for insert and update.
//!
//! # Invariants
//! - A record only ever holds declared fields.
//! - A record built from caller attributes requires declared defaults; a blank
//!   record does not.
//! - `prepare_for_update` never emits empty values except the integer zero.
//! - `prepare_for_insert` always emits every declared default.

use crate::db::is_valid_identifier;
use crate::error::ConfigError;
use crate::model::value::FieldValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Column name to value map used for records, conditions and result rows.
pub type Attributes = BTreeMap<String, FieldValue>;

/// Builds an [`Attributes`] map from `(field, value)` pairs.
pub fn attributes<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Static description of one record kind.
///
/// Built once per entity type and shared behind `Arc` by every record and
/// repository bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    kind: String,
    fields: Vec<String>,
    required: Vec<String>,
    defaults: Attributes,
}

impl RecordSchema {
    /// Starts a schema declaration for the given record kind.
    pub fn builder(kind: impl Into<String>) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            kind: kind.into(),
            fields: Vec::new(),
            required: Vec::new(),
            defaults: Attributes::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn defaults(&self) -> &Attributes {
        &self.defaults
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|declared| declared == field)
    }

    pub(crate) fn ensure_field(&self, field: &str) -> Result<(), ConfigError> {
        if self.has_field(field) {
            return Ok(());
        }
        Err(ConfigError::UnknownField {
            scope: self.kind.clone(),
            field: field.to_string(),
        })
    }
}

/// Builder for [`RecordSchema`]; all checks run in [`RecordSchemaBuilder::build`].
#[derive(Debug, Clone)]
pub struct RecordSchemaBuilder {
    kind: String,
    fields: Vec<String>,
    required: Vec<String>,
    defaults: Attributes,
}

impl RecordSchemaBuilder {
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }

    pub fn defaults(mut self, defaults: Attributes) -> Self {
        self.defaults.extend(defaults);
        self
    }

    /// Validates the declaration and freezes it.
    ///
    /// # Errors
    /// - `EmptyRecordKind` / `EmptyFieldSet` for missing declarations.
    /// - `InvalidIdentifier` / `DuplicateField` for unusable field names.
    /// - `UnknownField` when `required` or `defaults` name undeclared fields.
    pub fn build(self) -> Result<RecordSchema, ConfigError> {
        let kind = self.kind.trim().to_string();
        if kind.is_empty() {
            return Err(ConfigError::EmptyRecordKind);
        }
        if self.fields.is_empty() {
            return Err(ConfigError::EmptyFieldSet { record: kind });
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !is_valid_identifier(field) {
                return Err(ConfigError::InvalidIdentifier(field.clone()));
            }
            if !seen.insert(field.as_str()) {
                return Err(ConfigError::DuplicateField {
                    record: kind,
                    field: field.clone(),
                });
            }
        }

        let schema = RecordSchema {
            kind,
            fields: self.fields,
            required: Vec::new(),
            defaults: Attributes::new(),
        };
        for field in self.required.iter().chain(self.defaults.keys()) {
            schema.ensure_field(field)?;
        }

        let mut listed = BTreeSet::new();
        let mut required = self.required;
        required.retain(|field| listed.insert(field.clone()));
        Ok(RecordSchema {
            required,
            defaults: self.defaults,
            ..schema
        })
    }
}

/// One table row held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<RecordSchema>,
    attributes: Attributes,
}

impl Record {
    /// Builds a record from caller-supplied attributes.
    ///
    /// Empty `attributes` yield a blank record that is later filled by
    /// defaults on insert.
    ///
    /// # Errors
    /// - `MissingDefaults` when attributes are supplied but the schema
    ///   declares no defaults.
    /// - `UnknownField` when a key is not a declared field.
    pub fn new(schema: Arc<RecordSchema>, attributes: Attributes) -> Result<Self, ConfigError> {
        if attributes.is_empty() {
            return Ok(Self::blank(schema));
        }
        if schema.defaults.is_empty() {
            return Err(ConfigError::MissingDefaults {
                record: schema.kind.clone(),
            });
        }
        for key in attributes.keys() {
            schema.ensure_field(key)?;
        }
        Ok(Self { schema, attributes })
    }

    /// Returns a record with every field unset.
    pub fn blank(schema: Arc<RecordSchema>) -> Self {
        Self {
            schema,
            attributes: Attributes::new(),
        }
    }

    /// Wraps a row read back from storage. Column names are checked by the
    /// caller.
    pub(crate) fn from_storage(schema: Arc<RecordSchema>, attributes: Attributes) -> Self {
        Self { schema, attributes }
    }

    pub fn kind(&self) -> &str {
        self.schema.kind()
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.attributes.get(field)
    }

    /// Assigns one declared field and returns its previous value.
    pub fn set(
        &mut self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Option<FieldValue>, ConfigError> {
        self.schema.ensure_field(field)?;
        Ok(self.attributes.insert(field.to_string(), value.into()))
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }

    pub fn is_blank(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns whether `field` holds a non-empty value.
    pub fn has_value(&self, field: &str) -> bool {
        self.get(field).is_some_and(|value| !value.is_empty())
    }

    /// Returns whether this record was built from `schema`.
    pub fn is_kind_of(&self, schema: &Arc<RecordSchema>) -> bool {
        Arc::ptr_eq(&self.schema, schema) || *self.schema == **schema
    }

    /// Attribute map for partial updates.
    ///
    /// Keeps non-empty values and the integer zero, so untouched fields are
    /// never overwritten with empties.
    pub fn prepare_for_update(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(_, value)| !value.is_empty() || value.is_exact_zero())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Attribute map for inserts.
    ///
    /// Keeps non-empty values, then adds every declared default whose key is
    /// still absent.
    ///
    /// # Errors
    /// - `MissingRequiredField` when a required field is absent afterwards.
    pub fn prepare_for_insert(&self) -> Result<Attributes, ConfigError> {
        let mut values: Attributes = self
            .attributes
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        for (key, value) in &self.schema.defaults {
            values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        if let Some(missing) = self
            .schema
            .required
            .iter()
            .find(|field| !values.contains_key(field.as_str()))
        {
            return Err(ConfigError::MissingRequiredField {
                record: self.schema.kind.clone(),
                field: missing.clone(),
            });
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::{attributes, Record, RecordSchema};
    use crate::error::ConfigError;
    use crate::model::value::FieldValue;
    use std::sync::Arc;

    fn user_schema() -> Arc<RecordSchema> {
        Arc::new(
            RecordSchema::builder("user")
                .fields(["id", "name", "email", "karma"])
                .required(["name"])
                .default_value("email", "nobody@example.com")
                .default_value("karma", 0)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn build_rejects_undeclared_required_field() {
        let err = RecordSchema::builder("user")
            .fields(["id"])
            .required(["name"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownField {
                scope: "user".to_string(),
                field: "name".to_string()
            }
        );
    }

    #[test]
    fn build_rejects_duplicate_and_invalid_fields() {
        let duplicate = RecordSchema::builder("user")
            .fields(["id", "id"])
            .build()
            .unwrap_err();
        assert!(matches!(duplicate, ConfigError::DuplicateField { .. }));

        let invalid = RecordSchema::builder("user")
            .fields(["id", "users.name"])
            .build()
            .unwrap_err();
        assert_eq!(invalid, ConfigError::InvalidIdentifier("users.name".to_string()));

        let empty = RecordSchema::builder("  ").fields(["id"]).build().unwrap_err();
        assert_eq!(empty, ConfigError::EmptyRecordKind);
    }

    #[test]
    fn required_fields_are_listed_once_in_declaration_order() {
        let schema = RecordSchema::builder("user")
            .fields(["id", "name", "email"])
            .required(["name", "email", "name"])
            .build()
            .unwrap();
        assert_eq!(schema.required(), ["name", "email"]);
    }

    #[test]
    fn attributes_require_declared_defaults() {
        let schema = Arc::new(
            RecordSchema::builder("tag")
                .fields(["id", "label"])
                .build()
                .unwrap(),
        );

        assert!(Record::new(schema.clone(), attributes::<_, &str, FieldValue>([])).is_ok());
        let err = Record::new(schema, attributes([("label", "rust")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingDefaults {
                record: "tag".to_string()
            }
        );
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let err = Record::new(user_schema(), attributes([("nickname", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { field, .. } if field == "nickname"));
    }

    #[test]
    fn blank_record_inserts_exactly_the_defaults() {
        let schema = Arc::new(
            RecordSchema::builder("setting")
                .fields(["id", "theme", "volume"])
                .default_value("theme", "dark")
                .default_value("volume", 0)
                .build()
                .unwrap(),
        );
        let record = Record::blank(schema.clone());
        assert_eq!(record.prepare_for_insert().unwrap(), *schema.defaults());
    }

    #[test]
    fn insert_map_requires_required_fields() {
        let err = Record::blank(user_schema()).prepare_for_insert().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequiredField { field, .. } if field == "name"));
    }

    #[test]
    fn insert_map_fills_defaults_for_empty_values() {
        let record = Record::new(
            user_schema(),
            attributes([
                ("name", FieldValue::from("A")),
                ("email", FieldValue::from("")),
            ]),
        )
        .unwrap();

        let values = record.prepare_for_insert().unwrap();
        assert_eq!(
            values,
            attributes([
                ("email", FieldValue::from("nobody@example.com")),
                ("karma", FieldValue::from(0)),
                ("name", FieldValue::from("A")),
            ])
        );
    }

    #[test]
    fn update_map_keeps_integer_zero_only() {
        let record = Record::new(
            user_schema(),
            attributes([
                ("id", FieldValue::from(4)),
                ("name", FieldValue::from("")),
                ("email", FieldValue::from("0")),
                ("karma", FieldValue::from(0)),
            ]),
        )
        .unwrap();

        let values = record.prepare_for_update();
        assert_eq!(
            values,
            attributes([("id", FieldValue::from(4)), ("karma", FieldValue::from(0))])
        );
    }

    #[test]
    fn set_validates_field_and_returns_previous_value() {
        let mut record = Record::blank(user_schema());
        assert_eq!(record.set("name", "A").unwrap(), None);
        assert_eq!(
            record.set("name", "B").unwrap(),
            Some(FieldValue::from("A"))
        );
        assert!(record.set("unknown", 1).is_err());
        assert!(record.has_value("name"));
        assert!(!record.has_value("email"));
    }

    #[test]
    fn kind_check_compares_schema_contents() {
        let schema = user_schema();
        let record = Record::blank(schema.clone());
        assert!(record.is_kind_of(&schema));
        assert!(record.is_kind_of(&user_schema()));

        let other = Arc::new(
            RecordSchema::builder("role")
                .fields(["id"])
                .build()
                .unwrap(),
        );
        assert!(!record.is_kind_of(&other));
    }
}
