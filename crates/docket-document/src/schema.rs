//! The evolving collection schema.
//!
//! A [`Schema`] describes every field ever seen in a collection. It is never
//! declared upfront: the document mapper grows it as documents arrive, and
//! growth is strictly additive. Concurrent writers extend it through
//! per-entry atomic inserts; readers clone snapshots when they need a
//! consistent view.
//!
//! A field's data type is fixed by the first non-null value observed for it
//! ([`SchemaField::observe`]); later values of a different type are rejected
//! without touching the schema.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use serde::{Deserialize, Serialize};

use crate::document::{CREATED_FIELD, FULL_TEXT_FIELD, ID_FIELD, MODIFIED_FIELD, is_metadata_field};

/// The data type tag of a schema field or value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    /// No type observed yet (or an explicit null value).
    #[default]
    Null,
    /// Guid.
    Guid,
    /// Free text.
    Text,
    /// IEEE-754 double.
    Number,
    /// Boolean.
    Boolean,
    /// UTC timestamp.
    DateTime,
    /// Homogeneous list.
    Array,
    /// Nested object.
    Object,
}

impl DataType {
    /// Returns true for the scalar types that can back a sort column.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::Guid | Self::Text | Self::Number | Self::Boolean | Self::DateTime
        )
    }
}

/// Outcome of checking an observed value type against a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheck {
    /// The field had no type yet and adopted the observed one.
    Adopted,
    /// The observed type matches (or the value was null).
    Matched,
    /// The observed type conflicts with the fixed one; drop the value.
    Conflict,
}

/// Facet configuration for a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetSettings {
    /// Name the facet is exposed under. Defaults to the field name.
    pub facet_name: String,
    /// Whether formatted values split into a hierarchy path.
    #[serde(default)]
    pub is_hierarchical: bool,
    /// Separator for hierarchical values. `\` escapes a literal separator.
    #[serde(default = "default_separator")]
    pub hierarchy_separator: String,
    /// Render pattern for datetime (and numeric) values, e.g. `yyyy/MMM/dd`.
    #[serde(default)]
    pub format_string: Option<String>,
}

/// Default hierarchy separator.
fn default_separator() -> String {
    "/".to_string()
}

/// Default facet render pattern for datetime fields.
pub(crate) const DEFAULT_DATE_FACET_FORMAT: &str = "yyyy/MMM/dd";

impl FacetSettings {
    /// Creates settings for a flat facet named after the field.
    pub fn new(facet_name: impl Into<String>) -> Self {
        Self {
            facet_name: facet_name.into(),
            is_hierarchical: false,
            hierarchy_separator: default_separator(),
            format_string: None,
        }
    }

    /// Creates hierarchical settings with the default `/` separator.
    pub fn hierarchical(facet_name: impl Into<String>) -> Self {
        Self {
            is_hierarchical: true,
            ..Self::new(facet_name)
        }
    }
}

/// One field of a collection schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    /// Full dotted name (`root.child.leaf`).
    pub name: String,
    /// Fixed data type, `Null` until the first non-null value arrives.
    #[serde(default)]
    pub data_type: DataType,
    /// Element type for `Array` fields, `Null` until the first element.
    #[serde(default)]
    pub array_element_data_type: DataType,
    /// True when this field describes the elements of an array.
    #[serde(default)]
    pub is_array_element: bool,
    /// True for `Text` fields: values go through the full-text analyzer.
    #[serde(default)]
    pub is_tokenized: bool,
    /// Nested schema for `Object` fields (and arrays of objects).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_schema: Option<Box<Schema>>,
    /// Facet configuration, when this field is a facet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_settings: Option<FacetSettings>,
}

impl SchemaField {
    /// Creates an untyped field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Null,
            array_element_data_type: DataType::Null,
            is_array_element: false,
            is_tokenized: false,
            object_schema: None,
            facet_settings: None,
        }
    }

    /// Creates a field with a fixed data type.
    pub fn with_type(name: impl Into<String>, data_type: DataType) -> Self {
        let mut field = Self::new(name);
        field.data_type = data_type;
        field.is_tokenized = data_type == DataType::Text;
        field
    }

    /// True when the field sits at the top of the document (no dot in the
    /// name, not an array element).
    pub fn is_top_level(&self) -> bool {
        !self.is_array_element && !self.name.contains('.')
    }

    /// True when the field can back a sort column: top level and scalar.
    pub fn is_sortable(&self) -> bool {
        self.is_top_level() && !matches!(self.data_type, DataType::Array | DataType::Object)
    }

    /// Checks an observed value type against this field, adopting it when
    /// the field is still untyped.
    ///
    /// Adoption also fixes `is_tokenized` and, for datetime fields that are
    /// facets, upgrades the facet to the hierarchical date default.
    pub fn observe(&mut self, observed: DataType) -> TypeCheck {
        if observed == DataType::Null {
            return TypeCheck::Matched;
        }
        if self.data_type == DataType::Null {
            self.data_type = observed;
            self.is_tokenized = observed == DataType::Text;
            if observed == DataType::DateTime {
                if let Some(facet) = self.facet_settings.as_mut() {
                    facet.is_hierarchical = true;
                    facet
                        .format_string
                        .get_or_insert_with(|| DEFAULT_DATE_FACET_FORMAT.to_string());
                }
            }
            return TypeCheck::Adopted;
        }
        if self.data_type == observed {
            TypeCheck::Matched
        } else {
            TypeCheck::Conflict
        }
    }

    /// Checks an observed array element type against the fixed element slot.
    pub fn observe_element(&mut self, observed: DataType) -> TypeCheck {
        if observed == DataType::Null {
            return TypeCheck::Matched;
        }
        if self.array_element_data_type == DataType::Null {
            self.array_element_data_type = observed;
            if self.is_tokenized || observed == DataType::Text {
                self.is_tokenized = observed == DataType::Text;
            }
            return TypeCheck::Adopted;
        }
        if self.array_element_data_type == observed {
            TypeCheck::Matched
        } else {
            TypeCheck::Conflict
        }
    }

    /// Returns the nested schema, creating an empty one on first use.
    pub fn child_schema(&mut self, auto_facet: bool) -> &Schema {
        self.object_schema
            .get_or_insert_with(|| Box::new(Schema::new(self.name.clone(), auto_facet)))
    }
}

/// The live schema of one collection.
///
/// Fields are keyed by full dotted name. Nested schemas are owned by their
/// parent field and hold their own maps, so extending a child never blocks
/// unrelated writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Collection (or parent field) name.
    pub name: String,
    /// When set, every new non-metadata field is facet-enabled on creation.
    #[serde(skip)]
    auto_facet: bool,
    /// Fields keyed by full dotted name.
    fields: DashMap<String, SchemaField>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>, auto_facet: bool) -> Self {
        Self {
            name: name.into(),
            auto_facet,
            fields: DashMap::new(),
        }
    }

    /// Creates the default schema a collection opens with: the three
    /// reserved metadata fields plus the synthesized full-text field.
    pub fn with_defaults(name: impl Into<String>, auto_facet: bool) -> Self {
        let schema = Self::new(name, auto_facet);
        schema.try_add(SchemaField::with_type(ID_FIELD, DataType::Guid));
        schema.try_add(SchemaField::with_type(CREATED_FIELD, DataType::DateTime));
        schema.try_add(SchemaField::with_type(MODIFIED_FIELD, DataType::DateTime));
        schema.try_add(SchemaField::with_type(FULL_TEXT_FIELD, DataType::Text));
        schema
    }

    /// Re-arms the auto-facet flag after deserialization (the flag is
    /// process configuration, not persisted state).
    pub fn set_auto_facet(&mut self, auto_facet: bool) {
        self.auto_facet = auto_facet;
    }

    /// Returns an existing field, or installs a fresh untyped one.
    ///
    /// New non-metadata fields are facet-enabled when auto-faceting is on.
    /// The insert is atomic per entry: under concurrent writers the first
    /// one wins and everyone sees the same field.
    pub fn get_or_create(&self, name: &str) -> RefMut<'_, String, SchemaField> {
        self.fields.entry(name.to_string()).or_insert_with(|| {
            let mut field = SchemaField::new(name);
            if self.auto_facet && !is_metadata_field(name) {
                field.facet_settings = Some(FacetSettings::new(name));
            }
            field
        })
    }

    /// Adds a field if no field of that name exists yet.
    ///
    /// Returns false (leaving the existing entry untouched) when the name
    /// is taken. This is the only write primitive besides
    /// [`Schema::get_or_create`]; fields are never removed.
    pub fn try_add(&self, field: SchemaField) -> bool {
        match self.fields.entry(field.name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(field);
                true
            }
        }
    }

    /// Looks up a directly held field.
    pub fn get(&self, name: &str) -> Option<Ref<'_, String, SchemaField>> {
        self.fields.get(name)
    }

    /// Installs or replaces the facet settings of a field, creating the
    /// field when it does not exist yet.
    pub fn configure_facet(&self, name: &str, settings: FacetSettings) {
        let mut field = self.get_or_create(name);
        field.facet_settings = Some(settings);
    }

    /// Finds a field by full dotted name, descending into the child schemas
    /// of object (and array-of-object) fields.
    pub fn find_field(&self, name: &str) -> Option<SchemaField> {
        if let Some(field) = self.fields.get(name) {
            return Some(field.clone());
        }
        for entry in self.fields.iter() {
            if let Some(child) = entry.value().object_schema.as_deref() {
                if name.starts_with(entry.key().as_str())
                    && name[entry.key().len()..].starts_with('.')
                {
                    if let Some(found) = child.find_field(name) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Clones a consistent snapshot of every field, recursion included.
    pub fn snapshot(&self) -> Vec<SchemaField> {
        let mut fields: Vec<SchemaField> = self.fields.iter().map(|e| e.value().clone()).collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        fields
    }

    /// Collects every facet-enabled field, nested schemas included.
    pub fn facet_fields(&self) -> Vec<SchemaField> {
        let mut out = Vec::new();
        self.collect_facets(&mut out);
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Recursive worker for [`Schema::facet_fields`].
    fn collect_facets(&self, out: &mut Vec<SchemaField>) {
        for entry in self.fields.iter() {
            if entry.value().facet_settings.is_some() {
                out.push(entry.value().clone());
            }
            if let Some(child) = entry.value().object_schema.as_deref() {
                child.collect_facets(out);
            }
        }
    }

    /// Finds the facet settings exposed under `facet_name`.
    pub fn find_facet(&self, facet_name: &str) -> Option<(SchemaField, FacetSettings)> {
        self.facet_fields().into_iter().find_map(|field| {
            let settings = field.facet_settings.clone()?;
            (settings.facet_name == facet_name).then(|| (field, settings))
        })
    }

    /// Number of directly held fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the schema holds no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
