use derive_more::Display;
use thiserror::Error;

/// The separator placed between the fields of an object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum ObjectKeySeparator {
    /// `/`, so every field becomes a path segment.
    #[default]
    #[display("/")]
    Slash,
    /// `.`
    #[display(".")]
    Dot,
    /// `_`
    #[display("_")]
    Underscore,
}

/// An unsupported object key separator.
#[derive(Clone, Debug, Error)]
#[error("unsupported object key separator {_0:?}, expected one of '/', '.' or '_'")]
pub struct ObjectKeySeparatorError(String);

impl From<ObjectKeySeparator> for char {
    fn from(separator: ObjectKeySeparator) -> Self {
        match separator {
            ObjectKeySeparator::Slash => '/',
            ObjectKeySeparator::Dot => '.',
            ObjectKeySeparator::Underscore => '_',
        }
    }
}

impl TryFrom<char> for ObjectKeySeparator {
    type Error = ObjectKeySeparatorError;

    fn try_from(separator: char) -> Result<Self, Self::Error> {
        match separator {
            '/' => Ok(Self::Slash),
            '.' => Ok(Self::Dot),
            '_' => Ok(Self::Underscore),
            _ => Err(ObjectKeySeparatorError(separator.to_string())),
        }
    }
}

impl std::str::FromStr for ObjectKeySeparator {
    type Err = ObjectKeySeparatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(separator), None) => Self::try_from(separator),
            _ => Err(ObjectKeySeparatorError(s.to_string())),
        }
    }
}
