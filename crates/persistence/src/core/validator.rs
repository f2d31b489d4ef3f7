//! Object validation before writes.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{RESERVED_ATTRIBUTES, StorableObject};

/// Validates objects before they are written.
pub trait ObjectValidator: Send + Sync {
    /// Returns an error if the object must not be written.
    fn validate(&self, object: &StorableObject) -> Result<(), ValidationError>;

    /// Validates a partial update, which may carry only the changed attributes.
    fn validate_update(&self, object: &StorableObject) -> Result<(), ValidationError> {
        self.validate(object)
    }
}

/// Maximum object id length in bytes.
pub const MAX_ID_LENGTH: usize = 512;

/// Object ids: word characters plus `- . : ~ @`.
static DEFAULT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.:~@]+$").expect("valid id pattern"));

/// Validator checking ids, reserved attribute names and per-type required attributes.
///
/// # Examples
///
/// ```
/// use stratus_persistence::core::{BasicValidator, ObjectValidator};
/// use stratus_persistence::types::StorableObject;
/// use serde_json::json;
///
/// let validator = BasicValidator::new().require("user", "email");
///
/// let missing = StorableObject::new("user", "u1");
/// assert!(validator.validate(&missing).is_err());
///
/// let ok = StorableObject::new("user", "u1").with_attribute("email", json!("a@b.c"));
/// assert!(validator.validate(&ok).is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BasicValidator {
    id_pattern: Regex,
    required: HashMap<String, Vec<String>>,
}

impl Default for BasicValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicValidator {
    /// Creates a validator with the default id pattern and no required attributes.
    pub fn new() -> Self {
        Self {
            id_pattern: DEFAULT_ID_PATTERN.clone(),
            required: HashMap::new(),
        }
    }

    /// Replaces the id pattern.
    pub fn with_id_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.id_pattern = Regex::new(pattern)?;
        Ok(self)
    }

    /// Requires a non-blank attribute on every object of the given type.
    pub fn require(mut self, object_type: &str, attribute: impl Into<String>) -> Self {
        self.required
            .entry(object_type.trim().to_lowercase())
            .or_default()
            .push(attribute.into());
        self
    }
}

impl BasicValidator {
    fn check_identity(&self, object: &StorableObject) -> Result<(), ValidationError> {
        if object.id().trim().is_empty() {
            return Err(ValidationError::MissingId);
        }
        if object.id().len() > MAX_ID_LENGTH {
            return Err(ValidationError::InvalidId {
                id: object.id().to_string(),
                message: format!("longer than {} bytes", MAX_ID_LENGTH),
            });
        }
        if !self.id_pattern.is_match(object.id()) {
            return Err(ValidationError::InvalidId {
                id: object.id().to_string(),
                message: "only letters, digits and - _ . : ~ @ are allowed".to_string(),
            });
        }

        if let Some(name) = object
            .attributes()
            .keys()
            .find(|name| RESERVED_ATTRIBUTES.contains(&name.as_str()))
        {
            return Err(ValidationError::ReservedAttribute { name: name.clone() });
        }
        Ok(())
    }

    fn check_required(&self, object: &StorableObject) -> Result<(), ValidationError> {
        let object_type = object.object_type().trim().to_lowercase();
        if let Some(required) = self.required.get(&object_type) {
            for name in required {
                let present = match object.attribute(name) {
                    None | Some(Value::Null) => false,
                    Some(Value::String(s)) => !s.trim().is_empty(),
                    Some(_) => true,
                };
                if !present {
                    return Err(ValidationError::MissingAttribute {
                        object_type,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl ObjectValidator for BasicValidator {
    fn validate(&self, object: &StorableObject) -> Result<(), ValidationError> {
        self.check_identity(object)?;
        self.check_required(object)
    }

    fn validate_update(&self, object: &StorableObject) -> Result<(), ValidationError> {
        self.check_identity(object)
    }
}
