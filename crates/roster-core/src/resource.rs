//! Resource registry: one schema per managed REST collection.
//!
//! Every management table is described by a [`ResourceSchema`] (fields,
//! labels, validators) and handled by the same generic code paths.

use crate::types::Record;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("unknown resource: {0} (run `roster resources` for the list)")]
    UnknownResource(String),
    #[error("{resource} has no field named {field}")]
    UnknownField { resource: &'static str, field: String },
    #[error("expected field=value, got {0:?}")]
    InvalidAssignment(String),
    #[error("{resource} is read-only")]
    ReadOnly { resource: &'static str },
    #[error("validation failed: {}", join_errors(.0))]
    Invalid(Vec<FieldError>),
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One failed field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub label: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.message)
    }
}

/// Which configured API host serves a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiBase {
    Main,
    District,
    LocalCongregation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Departments,
    Sections,
    Subsections,
    Designations,
    Districts,
    LocalCongregations,
    Citizenships,
    Nationalities,
    Languages,
    Locations,
    PhoneDirectory,
    PhoneLocations,
    Housing,
    GovernmentIssuedIds,
    ContactTypeInfo,
    ApplicationTypes,
    PermissionCategories,
    Permissions,
    Groups,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 19] = [
        Self::Departments,
        Self::Sections,
        Self::Subsections,
        Self::Designations,
        Self::Districts,
        Self::LocalCongregations,
        Self::Citizenships,
        Self::Nationalities,
        Self::Languages,
        Self::Locations,
        Self::PhoneDirectory,
        Self::PhoneLocations,
        Self::Housing,
        Self::GovernmentIssuedIds,
        Self::ContactTypeInfo,
        Self::ApplicationTypes,
        Self::PermissionCategories,
        Self::Permissions,
        Self::Groups,
    ];

    /// REST collection path below `/api/`.
    pub fn path(self) -> &'static str {
        match self {
            Self::Departments => "departments",
            Self::Sections => "sections",
            Self::Subsections => "subsections",
            Self::Designations => "designations",
            Self::Districts => "districts",
            Self::LocalCongregations => "local-congregations",
            Self::Citizenships => "citizenships",
            Self::Nationalities => "nationalities",
            Self::Languages => "languages",
            Self::Locations => "locations",
            Self::PhoneDirectory => "phone-directory",
            Self::PhoneLocations => "phone-locations",
            Self::Housing => "housing",
            Self::GovernmentIssuedIds => "government-issued-ids",
            Self::ContactTypeInfo => "contact-type-info",
            Self::ApplicationTypes => "application-types",
            Self::PermissionCategories => "permission-categories",
            Self::Permissions => "permissions",
            Self::Groups => "groups",
        }
    }

    pub fn api_base(self) -> ApiBase {
        match self {
            Self::Districts => ApiBase::District,
            Self::LocalCongregations => ApiBase::LocalCongregation,
            _ => ApiBase::Main,
        }
    }

    /// Lookup tables owned by another system.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::LocalCongregations)
    }

    pub fn schema(self) -> ResourceSchema {
        use FieldSpec as F;
        let b = ResourceSchema::builder(self);
        let builder = match self {
            Self::Departments => b
                .title("Departments", "department")
                .field(F::text("name", "Department Name").required().max_len(100))
                .field(F::long_text("description", "Description")),
            Self::Sections => b
                .title("Sections", "section")
                .field(F::text("name", "Section Name").required().max_len(100))
                .field(F::reference("department_id", "Department", Self::Departments).required())
                .field(F::long_text("description", "Description")),
            Self::Subsections => b
                .title("Subsections", "subsection")
                .field(F::text("name", "Subsection Name").required().max_len(100))
                .field(F::reference("section_id", "Section", Self::Sections).required())
                .field(F::long_text("description", "Description")),
            Self::Designations => b
                .title("Designations", "designation")
                .field(F::text("name", "Designation").required().max_len(100))
                .field(F::reference("section_id", "Section", Self::Sections))
                .field(F::reference("subsection_id", "Subsection", Self::Subsections))
                .field(F::long_text("description", "Description")),
            Self::Districts => b
                .title("Districts", "district")
                .field(F::text("name", "District Name").required().max_len(100))
                .field(F::text("code", "District Code").max_len(20)),
            Self::LocalCongregations => b
                .title("Local Congregations", "local congregation")
                .field(F::text("name", "Local Congregation").required())
                .field(F::reference("district_id", "District", Self::Districts)),
            Self::Citizenships => b
                .title("Citizenships", "citizenship")
                .field(F::text("citizenship", "Citizenship").required().max_len(100))
                .field(F::text("country_name", "Country").required().max_len(100)),
            Self::Nationalities => b
                .title("Nationalities", "nationality")
                .field(F::text("name", "Nationality").required().max_len(100))
                .field(F::long_text("description", "Description")),
            Self::Languages => b
                .title("Languages", "language")
                .field(F::text("name", "Language").required().max_len(100))
                .field(F::text("code", "Code").max_len(10)),
            Self::Locations => b
                .title("Locations", "location")
                .field(F::text("name", "Location").required().max_len(150))
                .field(F::long_text("description", "Description")),
            Self::PhoneDirectory => b
                .title("Phone Directory", "phone entry")
                .field(F::text("name", "Name").required().max_len(150))
                .field(F::reference("phone_location_id", "Phone Location", Self::PhoneLocations))
                .field(F::text("prefix", "Prefix").max_len(10))
                .field(F::text("extension", "Extension").required().max_len(20))
                .field(F::text("dect_number", "DECT Number").max_len(20)),
            Self::PhoneLocations => b
                .title("Phone Locations", "phone location")
                .field(F::text("name", "Phone Location").required().max_len(150)),
            Self::Housing => b
                .title("Housing", "housing")
                .field(F::text("building_name", "Building").required().max_len(150))
                .field(F::text("address", "Address").max_len(255))
                .field(F::reference("location_id", "Location", Self::Locations))
                .field(F::long_text("description", "Description")),
            Self::GovernmentIssuedIds => b
                .title("Government Issued IDs", "government issued ID")
                .field(F::text("id_type", "ID Type").required().max_len(100))
                .field(F::long_text("description", "Description")),
            Self::ContactTypeInfo => b
                .title("Contact Types", "contact type")
                .field(F::text("contact_type", "Contact Type").required().max_len(100))
                .field(F::long_text("description", "Description")),
            Self::ApplicationTypes => b
                .title("Application Types", "application type")
                .field(F::text("name", "Application Type").required().max_len(100))
                .field(F::long_text("description", "Description")),
            Self::PermissionCategories => b
                .title("Permission Categories", "permission category")
                .field(F::text("name", "Category").required().max_len(100))
                .field(F::long_text("description", "Description")),
            Self::Permissions => b
                .title("Permissions", "permission")
                .field(F::text("name", "Permission").required().max_len(100))
                .field(
                    F::reference("category_id", "Category", Self::PermissionCategories).required(),
                )
                .field(F::long_text("description", "Description")),
            Self::Groups => b
                .title("Groups", "group")
                .field(F::text("name", "Group Name").required().max_len(100))
                .field(F::long_text("description", "Description"))
                .field(F::boolean("is_active", "Active")),
        };
        builder.build()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for ResourceKind {
    type Err = SchemaError;

    /// Accepts the REST path, with underscores or a trailing plural `s` dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| {
                let path = kind.path();
                path == wanted || path.strip_suffix('s') == Some(wanted.as_str())
            })
            .ok_or_else(|| SchemaError::UnknownResource(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    LongText,
    Boolean,
    /// Foreign key into another resource.
    Reference(ResourceKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub max_len: Option<usize>,
}

impl FieldSpec {
    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            max_len: None,
        }
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn long_text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::LongText)
    }

    pub fn boolean(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Boolean)
    }

    pub fn reference(name: &'static str, label: &'static str, target: ResourceKind) -> Self {
        Self::new(name, label, FieldKind::Reference(target))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    /// Convert command-line text into the JSON value the API expects.
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();
        match self.kind {
            FieldKind::Text | FieldKind::LongText => Ok(Value::String(raw.to_string())),
            FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(Value::Bool(true)),
                "false" | "no" | "0" | "off" => Ok(Value::Bool(false)),
                _ => Err(format!("must be true or false, got {raw:?}")),
            },
            FieldKind::Reference(_) => Ok(match raw.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(raw.to_string()),
            }),
        }
    }

    fn check(&self, value: Option<&Value>) -> Option<String> {
        let value = match value {
            None | Some(Value::Null) => {
                return self.required.then(|| "is required".to_string());
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return self.required.then(|| "is required".to_string());
            }
            Some(v) => v,
        };

        match (self.kind, value) {
            (FieldKind::Text | FieldKind::LongText, Value::String(s)) => match self.max_len {
                Some(max) if s.chars().count() > max => {
                    Some(format!("must be at most {max} characters"))
                }
                _ => None,
            },
            (FieldKind::Text | FieldKind::LongText, _) => Some("must be text".to_string()),
            (FieldKind::Boolean, Value::Bool(_)) => None,
            (FieldKind::Boolean, _) => Some("must be true or false".to_string()),
            (FieldKind::Reference(_), Value::Number(_) | Value::String(_)) => None,
            (FieldKind::Reference(_), _) => Some("must be an id".to_string()),
        }
    }
}

/// Field list, labels and validators for one resource.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub kind: ResourceKind,
    pub title: &'static str,
    pub singular: &'static str,
    pub fields: Vec<FieldSpec>,
}

pub struct SchemaBuilder {
    kind: ResourceKind,
    title: &'static str,
    singular: &'static str,
    fields: Vec<FieldSpec>,
}

impl SchemaBuilder {
    pub fn title(mut self, title: &'static str, singular: &'static str) -> Self {
        self.title = title;
        self.singular = singular;
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> ResourceSchema {
        ResourceSchema {
            kind: self.kind,
            title: self.title,
            singular: self.singular,
            fields: self.fields,
        }
    }
}

impl ResourceSchema {
    pub fn builder(kind: ResourceKind) -> SchemaBuilder {
        SchemaBuilder {
            kind,
            title: kind.path(),
            singular: kind.path(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Build a record from `field=value` arguments, coercing each value by
    /// its field kind. All problems are reported together.
    pub fn parse_assignments<'a, I>(&self, pairs: I) -> Result<Record, SchemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut record = Record::new();
        let mut errors = Vec::new();

        for pair in pairs {
            let (name, raw) = pair
                .split_once('=')
                .ok_or_else(|| SchemaError::InvalidAssignment(pair.to_string()))?;
            let spec = self.field(name.trim()).ok_or_else(|| SchemaError::UnknownField {
                resource: self.kind.path(),
                field: name.trim().to_string(),
            })?;
            match spec.coerce(raw) {
                Ok(value) => {
                    record.insert(spec.name.to_string(), value);
                }
                Err(message) => errors.push(FieldError {
                    field: spec.name,
                    label: spec.label,
                    message,
                }),
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(SchemaError::Invalid(errors))
        }
    }

    /// Validate a record. With `partial`, absent fields are not checked
    /// (edits send only what changed).
    pub fn validate(&self, record: &Record, partial: bool) -> Result<(), SchemaError> {
        let errors: Vec<FieldError> = self
            .fields
            .iter()
            .filter(|spec| !partial || record.contains_key(spec.name))
            .filter_map(|spec| {
                spec.check(record.get(spec.name)).map(|message| FieldError {
                    field: spec.name,
                    label: spec.label,
                    message,
                })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(errors))
        }
    }

    /// Refuse writes to read-only lookups.
    pub fn ensure_writable(&self) -> Result<(), SchemaError> {
        if self.kind.is_read_only() {
            Err(SchemaError::ReadOnly {
                resource: self.kind.path(),
            })
        } else {
            Ok(())
        }
    }
}
