// 📐 Shape Layer - Field Validation
// Checks a raw row against the field registry, collecting every violation

use crate::error::{ValidationError, ValidationResult};
use crate::fields::{check_rule, FieldRegistry};
use crate::student::RawStudentRecord;

// ============================================================================
// FIELD VALIDATOR
// ============================================================================

pub struct FieldValidator {
    registry: FieldRegistry,
}

impl FieldValidator {
    pub fn new() -> Self {
        FieldValidator {
            registry: FieldRegistry::new(),
        }
    }

    /// Validate one raw row
    ///
    /// Never stops at the first failure: the error list names every field
    /// and rule that did not hold.
    pub fn validate(&self, record: &RawStudentRecord) -> ValidationResult {
        let mut errors = Vec::new();

        for definition in self.registry.iter() {
            let value = definition.field.value(record);

            for rule in &definition.rules {
                if let Some(message) = check_rule(rule, value) {
                    errors.push(ValidationError::new(definition.field.column(), message));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
