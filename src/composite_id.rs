//! `||`-delimited composite resource ids.
//!
//! Ids are the natural key fields joined with [`SEPARATOR`] and lowercased.
//! There is no escaping; resources reject key fields containing the separator
//! at validation time so that parsing stays positional and unambiguous.

use thiserror::Error;

/// Separator between the fields of a composite id.
pub const SEPARATOR: &str = "||";

/// Errors produced when parsing a composite id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeIdError {
    /// The id did not split into the expected number of fields.
    #[error("expected {expected} fields separated by '||' in \"{id}\", found {found}")]
    WrongFieldCount {
        /// The id as given.
        id: String,
        /// Number of fields the resource expects.
        expected: usize,
        /// Number of fields found.
        found: usize,
    },

    /// One of the fields was empty.
    #[error("field {index} of \"{id}\" is empty")]
    EmptyField {
        /// The id as given.
        id: String,
        /// Zero-based position of the empty field.
        index: usize,
    },
}

/// Join key fields into a lowercased composite id.
pub fn join(fields: &[&str]) -> String {
    fields.join(SEPARATOR).to_lowercase()
}

/// Split a composite id into exactly `N` non-empty fields.
///
/// Field case is preserved; only [`join`] lowercases.
pub fn split<const N: usize>(id: &str) -> Result<[&str; N], CompositeIdError> {
    let fields: Vec<&str> = id.split(SEPARATOR).collect();
    let found = fields.len();

    let fields: [&str; N] = fields
        .try_into()
        .map_err(|_| CompositeIdError::WrongFieldCount {
            id: id.to_string(),
            expected: N,
            found,
        })?;

    if let Some(index) = fields.iter().position(|f| f.is_empty()) {
        return Err(CompositeIdError::EmptyField {
            id: id.to_string(),
            index,
        });
    }

    Ok(fields)
}

/// Whether a key field would corrupt a composite id.
pub fn contains_separator(field: &str) -> bool {
    field.contains(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_lowercases() {
        assert_eq!(join(&["Acme", "3A1B2C3D4E5F6071"]), "acme||3a1b2c3d4e5f6071");
        assert_eq!(join(&["hashicorp", "aws", "public"]), "hashicorp||aws||public");
    }

    #[test]
    fn test_split_two_fields() {
        let [namespace, key_id] = split::<2>("acme||3A1B2C3D4E5F6071").unwrap();
        assert_eq!(namespace, "acme");
        assert_eq!(key_id, "3A1B2C3D4E5F6071");
    }

    #[test]
    fn test_split_wrong_field_count() {
        let err = split::<3>("hashicorp||aws").unwrap_err();
        assert_eq!(
            err,
            CompositeIdError::WrongFieldCount {
                id: "hashicorp||aws".to_string(),
                expected: 3,
                found: 2,
            }
        );

        assert!(split::<2>("acme").is_err());
        assert!(split::<2>("a||b||c").is_err());
    }

    #[test]
    fn test_split_empty_field() {
        let err = split::<2>("acme||").unwrap_err();
        assert_eq!(
            err,
            CompositeIdError::EmptyField {
                id: "acme||".to_string(),
                index: 1,
            }
        );
    }

    #[test]
    fn test_contains_separator() {
        assert!(contains_separator("ac||me"));
        assert!(!contains_separator("ac|me"));
    }
}
