use crate::error::{DbError, Result};
use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use std::str::FromStr;

/// Width of the length prefix stored in front of every text field.
const TEXT_LEN_PREFIX: usize = 4;

/// Column types supported by the record model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer.
    Int,
    /// Text of at most the given number of bytes, padded to that width on disk.
    Text(usize),
}

impl FieldType {
    /// Number of bytes a field of this type occupies inside a slot.
    pub fn byte_len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text(width) => TEXT_LEN_PREFIX + width,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Text(width) => write!(f, "text:{}", width),
        }
    }
}

impl FromStr for FieldType {
    type Err = DbError;

    /// Parses `int` or `text:<width>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("int") {
            return Ok(FieldType::Int);
        }
        match s.split_once(':') {
            Some((kind, width)) if kind.eq_ignore_ascii_case("text") => width
                .parse::<usize>()
                .map(FieldType::Text)
                .map_err(|_| DbError::InvalidArgument(format!("bad text width in '{}'", s))),
            _ => Err(DbError::InvalidArgument(format!("unknown field type '{}'", s))),
        }
    }
}

/// One typed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    /// Checks whether this value can be stored in a column of `field_type`.
    pub fn conforms_to(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (Field::Int(_), FieldType::Int) => true,
            (Field::Text(s), FieldType::Text(width)) => s.len() <= width,
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            Field::Int(_) => None,
        }
    }

    /// Writes the fixed-width encoding into `buf`, which must be exactly
    /// `field_type.byte_len()` bytes long.
    pub fn encode_into(&self, field_type: FieldType, buf: &mut [u8]) -> Result<()> {
        if buf.len() != field_type.byte_len() {
            return Err(DbError::SchemaMismatch(format!(
                "buffer of {} bytes for {} field",
                buf.len(),
                field_type
            )));
        }

        match (self, field_type) {
            (Field::Int(v), FieldType::Int) => BigEndian::write_i32(buf, *v),
            (Field::Text(s), FieldType::Text(width)) => {
                let bytes = s.as_bytes();
                if bytes.len() > width {
                    return Err(DbError::SchemaMismatch(format!(
                        "text of {} bytes exceeds declared width {}",
                        bytes.len(),
                        width
                    )));
                }
                BigEndian::write_u32(&mut buf[..TEXT_LEN_PREFIX], bytes.len() as u32);
                buf[TEXT_LEN_PREFIX..TEXT_LEN_PREFIX + bytes.len()].copy_from_slice(bytes);
                buf[TEXT_LEN_PREFIX + bytes.len()..].fill(0);
            }
            (value, expected) => {
                return Err(DbError::SchemaMismatch(format!(
                    "value {} does not match type {}",
                    value, expected
                )));
            }
        }
        Ok(())
    }

    /// Reads a field back from its fixed-width encoding. Errors are plain
    /// descriptions; the page codec turns them into `CorruptPage`.
    pub fn decode(field_type: FieldType, buf: &[u8]) -> std::result::Result<Field, String> {
        if buf.len() != field_type.byte_len() {
            return Err(format!(
                "field needs {} bytes, got {}",
                field_type.byte_len(),
                buf.len()
            ));
        }

        match field_type {
            FieldType::Int => Ok(Field::Int(BigEndian::read_i32(buf))),
            FieldType::Text(width) => {
                let len = BigEndian::read_u32(&buf[..TEXT_LEN_PREFIX]) as usize;
                if len > width {
                    return Err(format!("text length {} exceeds width {}", len, width));
                }
                let bytes = &buf[TEXT_LEN_PREFIX..TEXT_LEN_PREFIX + len];
                String::from_utf8(bytes.to_vec())
                    .map(Field::Text)
                    .map_err(|_| "text field is not valid UTF-8".to_string())
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Text(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Text(s)
    }
}
