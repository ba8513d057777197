//! The `default` object key encoding.

use std::borrow::Cow;

use itertools::Itertools;
use stepstore_storage::ObjectKey;

use super::{ObjectKeyDecodeError, ObjectKeyEncodingTraits, ObjectKeyParts, ObjectKeySeparator};

/// The number of fields in a key besides the offsets.
const FIXED_FIELDS: usize = 6;

/// A `default` object key encoding.
///
/// The key of an object is formed by joining, with the separator character:
/// - the job identifier,
/// - the experiment name,
/// - the ASCII decimal timestep,
/// - the variable name,
/// - the ASCII decimal variable version,
/// - the ASCII decimal offset of each axis, and
/// - the ASCII decimal rank.
///
/// String fields are percent-encoded, with `.` and the separator character always escaped,
/// and an empty string is written as a lone `%`.
/// No encoded field can contain the separator, so distinct parts always produce distinct keys.
#[derive(Debug, Clone, Default)]
pub struct DefaultObjectKeyEncoding {
    separator: ObjectKeySeparator,
}

impl DefaultObjectKeyEncoding {
    /// Create a new `default` object key encoding with separator `separator`.
    #[must_use]
    pub const fn new(separator: ObjectKeySeparator) -> Self {
        Self { separator }
    }

    /// Create a new `default` object key encoding with separator `/`.
    #[must_use]
    pub const fn new_slash() -> Self {
        Self::new(ObjectKeySeparator::Slash)
    }

    /// Create a new `default` object key encoding with separator `.`.
    #[must_use]
    pub const fn new_dot() -> Self {
        Self::new(ObjectKeySeparator::Dot)
    }

    /// Returns the separator.
    #[must_use]
    pub const fn separator(&self) -> ObjectKeySeparator {
        self.separator
    }

    fn encode_str(&self, field: &str) -> String {
        if field.is_empty() {
            return "%".to_string();
        }
        let separator: char = self.separator.into();
        let mut encoded = String::with_capacity(field.len());
        for c in urlencoding::encode(field).chars() {
            match c {
                '.' => encoded.push_str("%2E"),
                '_' if separator == '_' => encoded.push_str("%5F"),
                c => encoded.push(c),
            }
        }
        encoded
    }

    fn decode_str<'a>(
        key: &ObjectKey,
        field: &'static str,
        encoded: &'a str,
    ) -> Result<Cow<'a, str>, ObjectKeyDecodeError> {
        if encoded == "%" {
            return Ok(Cow::Borrowed(""));
        }
        urlencoding::decode(encoded)
            .map_err(|_| ObjectKeyDecodeError::InvalidField(key.clone(), field))
    }

    fn decode_u64(
        key: &ObjectKey,
        field: &'static str,
        encoded: &str,
    ) -> Result<u64, ObjectKeyDecodeError> {
        if encoded.is_empty() || !encoded.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObjectKeyDecodeError::InvalidField(key.clone(), field));
        }
        encoded
            .parse()
            .map_err(|_| ObjectKeyDecodeError::InvalidField(key.clone(), field))
    }
}

impl ObjectKeyEncodingTraits for DefaultObjectKeyEncoding {
    fn encode(&self, parts: &ObjectKeyParts) -> ObjectKey {
        // Avoid a heap allocation of the separator
        let mut separator_str: [u8; 4] = [0; 4];
        let separator_char: char = self.separator.into();
        let separator_str: &str = separator_char.encode_utf8(&mut separator_str);

        let mut timestep = itoa::Buffer::new();
        let mut variable_version = itoa::Buffer::new();
        let mut rank = itoa::Buffer::new();
        let mut offsets = vec![itoa::Buffer::new(); parts.offsets.len()];
        let job_id = self.encode_str(&parts.job_id);
        let experiment_name = self.encode_str(&parts.experiment_name);
        let variable_name = self.encode_str(&parts.variable_name);

        let key = [
            job_id.as_str(),
            experiment_name.as_str(),
            timestep.format(parts.timestep),
            variable_name.as_str(),
            variable_version.format(parts.variable_version),
        ]
        .into_iter()
        .chain(
            parts
                .offsets
                .iter()
                .zip(&mut offsets)
                .map(|(&offset, buffer)| &*buffer.format(offset)),
        )
        .chain(std::iter::once(&*rank.format(parts.rank)))
        .join(separator_str);

        // SAFETY: every field is non-empty and free of `/`, `.` and `..` segments
        unsafe { ObjectKey::new_unchecked(key) }
    }

    fn decode(&self, key: &ObjectKey) -> Result<ObjectKeyParts, ObjectKeyDecodeError> {
        let separator: char = self.separator.into();
        let fields: Vec<&str> = key.as_str().split(separator).collect();
        if fields.len() < FIXED_FIELDS {
            return Err(ObjectKeyDecodeError::FieldCount(key.clone(), fields.len()));
        }
        let (rank, fields) = fields
            .split_last()
            .ok_or_else(|| ObjectKeyDecodeError::FieldCount(key.clone(), 0))?;
        let offsets = fields[FIXED_FIELDS - 1..]
            .iter()
            .map(|offset| Self::decode_u64(key, "offset", offset))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ObjectKeyParts {
            job_id: Self::decode_str(key, "job_id", fields[0])?.into_owned(),
            experiment_name: Self::decode_str(key, "experiment_name", fields[1])?.into_owned(),
            timestep: Self::decode_u64(key, "timestep", fields[2])?,
            variable_name: Self::decode_str(key, "variable_name", fields[3])?.into_owned(),
            variable_version: Self::decode_u64(key, "variable_version", fields[4])?,
            offsets,
            rank: Self::decode_u64(key, "rank", rank)?,
        })
    }
}
