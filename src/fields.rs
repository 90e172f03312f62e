// 🏛️ Field Registry - The incoming row schema, declared as data
// Each CSV column has one definition; the validator walks this registry

use crate::normalize::{
    normalize_flag, normalize_gender, normalize_year_level, parse_date, sanitize_text,
};
use crate::student::RawStudentRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    StudentCode,
    FirstName,
    MiddleName,
    Surname,
    Gender,
    DateOfBirth,
    Lbote,
    Atsi,
    DisabilityStatus,
    Ema,
    Esl,
    HomeGroup,
    YearLevel,
}

impl Field {
    /// All fields in CSV column order
    pub const ALL: [Field; 13] = [
        Field::StudentCode,
        Field::FirstName,
        Field::MiddleName,
        Field::Surname,
        Field::Gender,
        Field::DateOfBirth,
        Field::Lbote,
        Field::Atsi,
        Field::DisabilityStatus,
        Field::Ema,
        Field::Esl,
        Field::HomeGroup,
        Field::YearLevel,
    ];

    /// CSV header name
    pub fn column(&self) -> &'static str {
        match self {
            Field::StudentCode => "student_code",
            Field::FirstName => "first_name",
            Field::MiddleName => "middle_name",
            Field::Surname => "surname",
            Field::Gender => "gender",
            Field::DateOfBirth => "date_of_birth",
            Field::Lbote => "LBOTE",
            Field::Atsi => "ATSI",
            Field::DisabilityStatus => "disability_status",
            Field::Ema => "EMA",
            Field::Esl => "ESL",
            Field::HomeGroup => "home_group",
            Field::YearLevel => "year_level",
        }
    }

    /// Raw value of this field on a row
    pub fn value<'a>(&self, record: &'a RawStudentRecord) -> &'a str {
        match self {
            Field::StudentCode => &record.student_code,
            Field::FirstName => &record.first_name,
            Field::MiddleName => &record.middle_name,
            Field::Surname => &record.surname,
            Field::Gender => &record.gender,
            Field::DateOfBirth => &record.date_of_birth,
            Field::Lbote => &record.lbote,
            Field::Atsi => &record.atsi,
            Field::DisabilityStatus => &record.disability_status,
            Field::Ema => &record.ema,
            Field::Esl => &record.esl,
            Field::HomeGroup => &record.home_group,
            Field::YearLevel => &record.year_level,
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Closed token vocabularies a field may draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenSet {
    Gender,
    Boolean,
    YearLevel,
}

impl TokenSet {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            TokenSet::Gender => normalize_gender(value).is_some(),
            TokenSet::Boolean => normalize_flag(value).is_some(),
            TokenSet::YearLevel => normalize_year_level(value).is_some(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TokenSet::Gender => "M, MALE, F, FEMAL or FEMALE",
            TokenSet::Boolean => "0, 1, Y, Yes, T, True, N, No, F or False",
            TokenSet::YearLevel => "0-12, F, P or UG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRule {
    /// Must be non-empty after trimming
    Required,
    /// Text that sanitization must not reduce to nothing
    Printable,
    /// At most this many characters after trimming
    MaxLength(usize),
    /// Must belong to a token vocabulary
    OneOf(TokenSet),
    /// Must parse under one of the accepted date formats
    Date,
}

// ============================================================================
// FIELD DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub field: Field,
    pub description: String,
    pub rules: Vec<FieldRule>,
    pub examples: Vec<String>,
}

impl FieldDefinition {
    pub fn new(field: Field) -> Self {
        FieldDefinition {
            field,
            description: String::new(),
            rules: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add a rule
    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Builder: add example
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.contains(&FieldRule::Required)
    }
}

// ============================================================================
// FIELD REGISTRY
// ============================================================================

/// Catalog of every incoming column and the rules it must satisfy
pub struct FieldRegistry {
    definitions: Vec<FieldDefinition>,
}

impl FieldRegistry {
    /// Registry for the student extract
    pub fn new() -> Self {
        let mut registry = FieldRegistry {
            definitions: Vec::new(),
        };

        registry.register_student_fields();
        registry
    }

    fn register_student_fields(&mut self) {
        // ====================================================================
        // IDENTITY
        // ====================================================================

        self.register(
            FieldDefinition::new(Field::StudentCode)
                .with_description("External student identifier, stable across syncs")
                .with_rule(FieldRule::Required)
                .with_rule(FieldRule::MaxLength(20))
                .with_example("ABC0001"),
        );

        self.register(
            FieldDefinition::new(Field::FirstName)
                .with_description("Given name")
                .with_rule(FieldRule::Required)
                .with_rule(FieldRule::Printable)
                .with_rule(FieldRule::MaxLength(40))
                .with_example("Ada"),
        );

        self.register(
            FieldDefinition::new(Field::MiddleName)
                .with_description("Middle name, may be blank")
                .with_rule(FieldRule::MaxLength(40)),
        );

        self.register(
            FieldDefinition::new(Field::Surname)
                .with_description("Family name")
                .with_rule(FieldRule::Required)
                .with_rule(FieldRule::Printable)
                .with_rule(FieldRule::MaxLength(40))
                .with_example("Lovelace"),
        );

        self.register(
            FieldDefinition::new(Field::Gender)
                .with_rule(FieldRule::OneOf(TokenSet::Gender))
                .with_example("M")
                .with_example("FEMALE"),
        );

        self.register(
            FieldDefinition::new(Field::DateOfBirth)
                .with_description("Birth date as D/MM/YYYY or MMM D YYYY")
                .with_rule(FieldRule::Date)
                .with_example("1/01/2017")
                .with_example("Jan 1 2017"),
        );

        // ====================================================================
        // FLAGS
        // ====================================================================

        for field in [
            Field::Lbote,
            Field::Atsi,
            Field::DisabilityStatus,
            Field::Ema,
            Field::Esl,
        ] {
            self.register(
                FieldDefinition::new(field)
                    .with_rule(FieldRule::OneOf(TokenSet::Boolean))
                    .with_example("0")
                    .with_example("Yes"),
            );
        }

        // ====================================================================
        // PLACEMENT
        // ====================================================================

        self.register(
            FieldDefinition::new(Field::HomeGroup)
                .with_description("Home/roll group, may be blank")
                .with_rule(FieldRule::MaxLength(40))
                .with_example("7B"),
        );

        self.register(
            FieldDefinition::new(Field::YearLevel)
                .with_rule(FieldRule::OneOf(TokenSet::YearLevel))
                .with_example("1")
                .with_example("P")
                .with_example("UG"),
        );
    }

    /// Register (or replace) the definition for a field
    pub fn register(&mut self, definition: FieldDefinition) {
        match self
            .definitions
            .iter_mut()
            .find(|existing| existing.field == definition.field)
        {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
    }

    pub fn get(&self, field: Field) -> Option<&FieldDefinition> {
        self.definitions.iter().find(|def| def.field == field)
    }

    /// Definitions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.definitions.iter()
    }

    pub fn count(&self) -> usize {
        self.definitions.len()
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check one value against one rule; `None` means the rule holds
pub fn check_rule(rule: &FieldRule, value: &str) -> Option<String> {
    let trimmed = value.trim();

    match rule {
        FieldRule::Required if trimmed.is_empty() => Some("Required field is empty".to_string()),
        FieldRule::Printable if !trimmed.is_empty() && sanitize_text(trimmed).is_empty() => {
            Some(format!("'{}' has no letters or digits", trimmed))
        }
        FieldRule::MaxLength(max) => {
            let len = trimmed.chars().count();
            (len > *max).then(|| format!("Length {} exceeds maximum of {}", len, max))
        }
        FieldRule::OneOf(tokens) if !tokens.accepts(trimmed) => Some(format!(
            "'{}' is not one of {}",
            trimmed,
            tokens.describe()
        )),
        FieldRule::Date if parse_date(trimmed).is_none() => Some(format!(
            "'{}' is not a date in D/MM/YYYY or MMM D YYYY form",
            trimmed
        )),
        _ => None,
    }
}
