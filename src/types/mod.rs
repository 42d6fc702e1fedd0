//! Column type tags for HiveServer2 result schemas.
//!
//! The server describes each result column with a primitive type id; this
//! module maps those ids to the crate's type tags and records which wire
//! value family carries each type.

use std::fmt;

/// Column type tags as reported in a result-set description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiveType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    String,
    Varchar,
    Char,
    Timestamp,
    Date,
    Binary,
    Array,
    Map,
    Struct,
    Union,
    Decimal,
}

/// The wire value family a column type arrives in.
///
/// Hive sends `FLOAT` columns in the double vector and the whole string
/// family (including complex types and `DECIMAL`) as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFamily {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
}

impl HiveType {
    /// Map a wire `TTypeId` to a column tag. Ids without a tag in this
    /// driver (interval, user-defined, null) return `None`.
    pub fn from_type_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(HiveType::Boolean),
            1 => Some(HiveType::TinyInt),
            2 => Some(HiveType::SmallInt),
            3 => Some(HiveType::Int),
            4 => Some(HiveType::BigInt),
            5 => Some(HiveType::Float),
            6 => Some(HiveType::Double),
            7 => Some(HiveType::String),
            8 => Some(HiveType::Timestamp),
            9 => Some(HiveType::Binary),
            10 => Some(HiveType::Array),
            11 => Some(HiveType::Map),
            12 => Some(HiveType::Struct),
            13 => Some(HiveType::Union),
            15 => Some(HiveType::Decimal),
            17 => Some(HiveType::Date),
            18 => Some(HiveType::Varchar),
            19 => Some(HiveType::Char),
            _ => None,
        }
    }

    /// Which value vector this type is delivered in.
    pub fn value_family(&self) -> ValueFamily {
        match self {
            HiveType::Boolean => ValueFamily::Bool,
            HiveType::TinyInt => ValueFamily::Byte,
            HiveType::SmallInt => ValueFamily::I16,
            HiveType::Int => ValueFamily::I32,
            HiveType::BigInt => ValueFamily::I64,
            // Float columns arrive as doubles
            HiveType::Float | HiveType::Double => ValueFamily::Double,
            HiveType::Binary => ValueFamily::Binary,
            HiveType::String
            | HiveType::Varchar
            | HiveType::Char
            | HiveType::Timestamp
            | HiveType::Date
            | HiveType::Array
            | HiveType::Map
            | HiveType::Struct
            | HiveType::Union
            | HiveType::Decimal => ValueFamily::String,
        }
    }

    /// True for types whose raw server encoding is a string.
    pub fn is_string_backed(&self) -> bool {
        self.value_family() == ValueFamily::String
    }
}

impl fmt::Display for HiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HiveType::Boolean => "BOOLEAN",
            HiveType::TinyInt => "TINYINT",
            HiveType::SmallInt => "SMALLINT",
            HiveType::Int => "INT",
            HiveType::BigInt => "BIGINT",
            HiveType::Float => "FLOAT",
            HiveType::Double => "DOUBLE",
            HiveType::String => "STRING",
            HiveType::Varchar => "VARCHAR",
            HiveType::Char => "CHAR",
            HiveType::Timestamp => "TIMESTAMP",
            HiveType::Date => "DATE",
            HiveType::Binary => "BINARY",
            HiveType::Array => "ARRAY",
            HiveType::Map => "MAP",
            HiveType::Struct => "STRUCT",
            HiveType::Union => "UNION",
            HiveType::Decimal => "DECIMAL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_mapping() {
        assert_eq!(HiveType::from_type_id(0), Some(HiveType::Boolean));
        assert_eq!(HiveType::from_type_id(3), Some(HiveType::Int));
        assert_eq!(HiveType::from_type_id(7), Some(HiveType::String));
        assert_eq!(HiveType::from_type_id(15), Some(HiveType::Decimal));
        assert_eq!(HiveType::from_type_id(19), Some(HiveType::Char));
        // INTERVAL_YEAR_MONTH has no tag here
        assert_eq!(HiveType::from_type_id(20), None);
    }

    #[test]
    fn test_float_arrives_as_double() {
        assert_eq!(HiveType::Float.value_family(), ValueFamily::Double);
        assert_eq!(HiveType::Double.value_family(), ValueFamily::Double);
    }

    #[test]
    fn test_string_family() {
        for t in [
            HiveType::String,
            HiveType::Varchar,
            HiveType::Char,
            HiveType::Timestamp,
            HiveType::Date,
            HiveType::Array,
            HiveType::Map,
            HiveType::Struct,
            HiveType::Union,
            HiveType::Decimal,
        ] {
            assert!(t.is_string_backed(), "{t} should be string-backed");
        }
        assert!(!HiveType::Binary.is_string_backed());
        assert!(!HiveType::Int.is_string_backed());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(HiveType::TinyInt.to_string(), "TINYINT");
        assert_eq!(HiveType::Decimal.to_string(), "DECIMAL");
    }
}
