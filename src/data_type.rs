use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};
use crate::value::Value;

/// Represents the supported column types of a table schema.
///
/// Every type has a one-character code used in its on-disk token. Text is
/// the only parametric type: it carries a maximum length in bytes, written in
/// front of the code (`Text(Some(50))` has the token `"50s"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    /// A 32-bit signed integer.
    Int32,
    /// A 64-bit signed integer.
    Int64,
    /// A 32-bit floating-point number.
    Float32,
    /// A 64-bit floating-point number.
    Float64,
    /// A boolean value (true or false).
    Bool,
    /// A single ASCII character.
    Char,
    /// A UTF-8 string bounded to a maximum byte length.
    /// `None` is the bare base type, which cannot be stored.
    Text(Option<usize>),
}

impl DataType {
    /// The unparametrized text type, to be refined with [DataType::subtype].
    pub const TEXT: DataType = DataType::Text(None);

    /// Largest declared text length, in bytes.
    pub const MAX_TEXT_LEN: usize = 1 << 20;

    const ALL_BASES: [DataType; 7] = [
        DataType::Int32,
        DataType::Int64,
        DataType::Float32,
        DataType::Float64,
        DataType::Bool,
        DataType::Char,
        DataType::TEXT,
    ];

    /// Shorthand for `DataType::TEXT.subtype(max_len)`.
    pub fn text(max_len: i64) -> Result<Self> {
        Self::TEXT.subtype(max_len)
    }

    /// Encoding code of the base type.
    pub fn code(&self) -> char {
        match self {
            Self::Int32 => 'i',
            Self::Int64 => 'l',
            Self::Float32 => 'f',
            Self::Float64 => 'd',
            Self::Bool => '?',
            Self::Char => 'c',
            Self::Text(_) => 's',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Self::ALL_BASES.into_iter().find(|t| t.code() == code)
    }

    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Bool => "Bool",
            Self::Char => "Char",
            Self::Text(_) => "Text",
        }
    }

    /// Display name, `"Base[N]"` for a parametrized type.
    pub fn name(&self) -> String {
        match self {
            Self::Text(Some(n)) => format!("{}[{n}]", self.base_name()),
            _ => self.base_name().to_string(),
        }
    }

    /// Whether a length parameter may be attached to this type.
    pub fn is_parametric(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn max_len(&self) -> Option<usize> {
        match self {
            Self::Text(n) => *n,
            _ => None,
        }
    }

    /// Derives a parametrized type bounded to `n`.
    ///
    /// # Errors
    /// Returns [DbError::Schema] if `n` is not positive, if the type is
    /// already parametrized, or if the type takes no parameter at all.
    ///
    /// # Example
    /// ```
    /// # use flatdb::DataType;
    /// let t = DataType::TEXT.subtype(50).unwrap();
    /// assert_eq!(t.name(), "Text[50]");
    /// assert_eq!(t.token(), "50s");
    /// assert!(DataType::TEXT.subtype(0).is_err());
    /// assert!(t.subtype(10).is_err());
    /// ```
    pub fn subtype(&self, n: i64) -> Result<Self> {
        if n <= 0 {
            return Err(DbError::schema(format!(
                "length of {} must be positive, got {n}",
                self.base_name()
            )));
        }
        match self {
            Self::Text(None) => {
                let n = usize::try_from(n)
                    .ok()
                    .filter(|&n| n <= Self::MAX_TEXT_LEN)
                    .ok_or_else(|| {
                        DbError::schema(format!(
                            "text length {n} exceeds the maximum of {} bytes",
                            Self::MAX_TEXT_LEN
                        ))
                    })?;
                Ok(Self::Text(Some(n)))
            }
            Self::Text(Some(_)) => Err(DbError::schema(format!(
                "{} is already parametrized",
                self.name()
            ))),
            _ => Err(DbError::schema(format!(
                "{} does not take a length parameter",
                self.name()
            ))),
        }
    }

    /// The on-disk token: the code, prefixed by the length when parametrized.
    pub fn token(&self) -> String {
        match self {
            Self::Text(Some(n)) => format!("{n}{}", self.code()),
            _ => self.code().to_string(),
        }
    }

    /// Parses a token produced by [DataType::token].
    ///
    /// # Errors
    /// Returns [DbError::Schema] when the part after the numeric prefix is
    /// not exactly one known code, when the prefix is not a positive integer,
    /// or when a prefix is put in front of a non-parametric code.
    pub fn from_token(token: &str) -> Result<Self> {
        let split = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (prefix, residue) = token.split_at(split);

        let mut chars = residue.chars();
        let base = match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_code(code),
            _ => None,
        }
        .ok_or_else(|| DbError::schema(format!("invalid type token {token:?}")))?;

        if prefix.is_empty() {
            return Ok(base);
        }
        let n: i64 = prefix
            .parse()
            .map_err(|_| DbError::schema(format!("invalid length in type token {token:?}")))?;
        base.subtype(n)
    }

    /// Number of bytes a value of this type occupies in a row, or `None` for
    /// unparametrized text.
    pub fn width(&self) -> Option<usize> {
        match self {
            Self::Int32 | Self::Float32 => Some(4),
            Self::Int64 | Self::Float64 => Some(8),
            Self::Bool | Self::Char => Some(1),
            Self::Text(n) => *n,
        }
    }

    /// Placeholder written in place of a null field.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Int32 => Value::Int32(0),
            Self::Int64 => Value::Int64(0),
            Self::Float32 => Value::Float32(0.0),
            Self::Float64 => Value::Float64(0.0),
            Self::Bool => Value::Bool(false),
            Self::Char => Value::Char('\0'),
            Self::Text(_) => Value::Text("".into()),
        }
    }

    /// Checks that `value` can be stored in a column of this type.
    ///
    /// `Null` is always accepted. Text must fit the declared length in bytes
    /// and must not contain NUL, which is reserved for padding.
    pub fn validate(&self, value: &Value) -> Result<()> {
        match (self, value) {
            (_, Value::Null)
            | (Self::Int32, Value::Int32(_))
            | (Self::Int64, Value::Int64(_))
            | (Self::Float32, Value::Float32(_))
            | (Self::Float64, Value::Float64(_))
            | (Self::Bool, Value::Bool(_)) => Ok(()),
            (Self::Char, Value::Char(c)) => {
                if c.is_ascii() {
                    Ok(())
                } else {
                    Err(DbError::schema(format!(
                        "character {c:?} does not fit in a single byte"
                    )))
                }
            }
            (Self::Text(max_len), Value::Text(s)) => {
                if s.contains('\0') {
                    return Err(DbError::schema(format!(
                        "text {s:?} contains a NUL character"
                    )));
                }
                match max_len {
                    Some(max) if s.len() > *max => Err(DbError::schema(format!(
                        "text of {} bytes exceeds {}",
                        s.len(),
                        self.name()
                    ))),
                    _ => Ok(()),
                }
            }
            _ => Err(DbError::schema(format!(
                "value {value:?} has type {:?} while column type is {}",
                value.data_type().map(|t| t.name()),
                self.name()
            ))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for DataType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_token(s)
    }
}

impl TryFrom<String> for DataType {
    type Error = DbError;

    fn try_from(token: String) -> Result<Self> {
        Self::from_token(&token)
    }
}

impl From<DataType> for String {
    fn from(t: DataType) -> Self {
        t.token()
    }
}
