//! Field bounds and pre-flight validation
//!
//! Every write is checked here before anything crosses the native boundary.
//! String lengths are counted in UTF-16 code units, the unit the vault uses.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::types::{CredentialRecord, CredentialType, WriteMode};

/// `CRED_MAX_CREDENTIAL_BLOB_SIZE`
pub const CRED_MAX_CREDENTIAL_BLOB_SIZE: usize = 512;
/// `CRED_MAX_ATTRIBUTES`
pub const CRED_MAX_ATTRIBUTES: usize = 64;
/// `CRED_MAX_STRING_LENGTH`: comment, target alias, attribute keyword.
pub const CRED_MAX_STRING_LENGTH: usize = 256;
/// `CRED_MAX_USERNAME_LENGTH`
pub const CRED_MAX_USERNAME_LENGTH: usize = 513;
/// `CRED_MAX_VALUE_SIZE`
pub const CRED_MAX_VALUE_SIZE: usize = 256;
/// `CRED_MAX_GENERIC_TARGET_NAME_LENGTH`
pub const CRED_MAX_GENERIC_TARGET_NAME_LENGTH: usize = 32767;
/// `CRED_MAX_DOMAIN_TARGET_NAME_LENGTH`
pub const CRED_MAX_DOMAIN_TARGET_NAME_LENGTH: usize = 337;

/// Bounds enforced before a write. Defaults are the platform maxima;
/// configuration may only tighten them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Limits {
    pub max_blob_size: usize,
    pub max_attributes: usize,
    pub max_string_length: usize,
    pub max_username_length: usize,
    pub max_attribute_value_size: usize,
    pub max_generic_target_length: usize,
    pub max_domain_target_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_blob_size: CRED_MAX_CREDENTIAL_BLOB_SIZE,
            max_attributes: CRED_MAX_ATTRIBUTES,
            max_string_length: CRED_MAX_STRING_LENGTH,
            max_username_length: CRED_MAX_USERNAME_LENGTH,
            max_attribute_value_size: CRED_MAX_VALUE_SIZE,
            max_generic_target_length: CRED_MAX_GENERIC_TARGET_NAME_LENGTH,
            max_domain_target_length: CRED_MAX_DOMAIN_TARGET_NAME_LENGTH,
        }
    }
}

impl Limits {
    /// Check that no limit exceeds what the platform accepts.
    pub fn check(&self) -> Result<(), String> {
        let pairs = [
            ("maxBlobSize", self.max_blob_size, CRED_MAX_CREDENTIAL_BLOB_SIZE),
            ("maxAttributes", self.max_attributes, CRED_MAX_ATTRIBUTES),
            ("maxStringLength", self.max_string_length, CRED_MAX_STRING_LENGTH),
            (
                "maxUsernameLength",
                self.max_username_length,
                CRED_MAX_USERNAME_LENGTH,
            ),
            (
                "maxAttributeValueSize",
                self.max_attribute_value_size,
                CRED_MAX_VALUE_SIZE,
            ),
            (
                "maxGenericTargetLength",
                self.max_generic_target_length,
                CRED_MAX_GENERIC_TARGET_NAME_LENGTH,
            ),
            (
                "maxDomainTargetLength",
                self.max_domain_target_length,
                CRED_MAX_DOMAIN_TARGET_NAME_LENGTH,
            ),
        ];
        for (name, value, max) in pairs {
            if value > max {
                return Err(format!("{name} = {value} exceeds platform maximum {max}"));
            }
        }
        if self.max_generic_target_length == 0 || self.max_domain_target_length == 0 {
            return Err("target name limits must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn max_target_length(&self, cred_type: CredentialType) -> usize {
        if cred_type.is_generic() {
            self.max_generic_target_length
        } else {
            self.max_domain_target_length
        }
    }

    /// Validate the (name, type) pair used by read and delete.
    pub fn validate_target(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<(), ValidationError> {
        if target_name.is_empty() {
            return Err(ValidationError::EmptyTargetName);
        }
        check_string(
            "target name",
            target_name,
            self.max_target_length(cred_type),
        )
    }

    /// Validate a record for writing in `mode`.
    pub fn validate_record(
        &self,
        record: &CredentialRecord,
        mode: WriteMode,
    ) -> Result<(), ValidationError> {
        self.validate_target(&record.target_name, record.cred_type)?;

        if mode == WriteMode::PreserveBlob && !record.secret_blob.is_empty() {
            return Err(ValidationError::PreserveWithBlob);
        }
        if record.secret_blob.len() > self.max_blob_size {
            return Err(ValidationError::BlobTooLarge {
                size: record.secret_blob.len(),
                max: self.max_blob_size,
            });
        }

        check_optional("comment", &record.comment, self.max_string_length)?;
        check_optional("target alias", &record.target_alias, self.max_string_length)?;
        check_optional("user name", &record.user_name, self.max_username_length)?;

        if record.attributes.len() > self.max_attributes {
            return Err(ValidationError::TooManyAttributes {
                count: record.attributes.len(),
                max: self.max_attributes,
            });
        }
        for (index, attribute) in record.attributes.iter().enumerate() {
            check_string(
                "attribute keyword",
                &attribute.keyword,
                self.max_string_length,
            )?;
            if attribute.value.len() > self.max_attribute_value_size {
                return Err(ValidationError::AttributeValueTooLarge {
                    index,
                    size: attribute.value.len(),
                    max: self.max_attribute_value_size,
                });
            }
        }
        Ok(())
    }
}

fn check_optional(
    field: &'static str,
    value: &Option<String>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(value) => check_string(field, value, max),
        None => Ok(()),
    }
}

fn check_string(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(ValidationError::InteriorNul { field });
    }
    let len = value.encode_utf16().count();
    if len > max {
        return Err(ValidationError::StringTooLong { field, len, max });
    }
    Ok(())
}
