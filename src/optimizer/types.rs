//! Type families and implicit widening between them.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::DataType;

static TYPE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(.*\)[A-Za-z ]*)?$").expect("valid type name pattern")
});

/// Type family, ignoring parameters such as lengths and precisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Int256,
    UInt256,
    Char,
    Varchar,
    Varbinary,
    Date,
    Time,
    Timestamp,
    Interval,
    Json,
    Array,
    Map,
    Other,
}

impl TypeKind {
    /// Family of a written type name: `double`, `varchar(3)`,
    /// `array(varchar)`, `timestamp(3) with time zone`. `None` when the text
    /// is not shaped like a type at all.
    pub fn from_sql(text: &str) -> Option<Self> {
        let text = text.trim();
        if !TYPE_TEXT.is_match(text) {
            return None;
        }
        let base = text
            .split('(')
            .next()
            .unwrap_or_default()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        Some(match base.as_str() {
            "BOOLEAN" | "BOOL" => TypeKind::Boolean,
            "TINYINT" | "BYTE" => TypeKind::TinyInt,
            "SMALLINT" | "INT2" => TypeKind::SmallInt,
            "INTEGER" | "INT" | "INT4" => TypeKind::Integer,
            "BIGINT" | "INT8" | "LONG" => TypeKind::BigInt,
            "DECIMAL" | "NUMERIC" | "DEC" => TypeKind::Decimal,
            "REAL" | "FLOAT" | "FLOAT4" => TypeKind::Real,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" | "FLOAT64" => TypeKind::Double,
            "INT256" => TypeKind::Int256,
            "UINT256" => TypeKind::UInt256,
            "CHAR" | "CHARACTER" | "BPCHAR" => TypeKind::Char,
            "VARCHAR" | "CHARACTER VARYING" | "TEXT" | "STRING" => TypeKind::Varchar,
            "VARBINARY" | "BYTEA" | "BINARY" => TypeKind::Varbinary,
            "DATE" => TypeKind::Date,
            "INTERVAL" => TypeKind::Interval,
            "JSON" | "JSONB" => TypeKind::Json,
            "ARRAY" => TypeKind::Array,
            "MAP" => TypeKind::Map,
            b if b.starts_with("TIMESTAMP") || b == "DATETIME" => TypeKind::Timestamp,
            b if b.starts_with("TIME") => TypeKind::Time,
            _ => TypeKind::Other,
        })
    }

    pub fn of(ty: &DataType) -> Self {
        match ty {
            DataType::Array(_) => TypeKind::Array,
            DataType::Map(..) => TypeKind::Map,
            other => Self::from_sql(&other.to_string()).unwrap_or(TypeKind::Other),
        }
    }

    /// DuneSQL name to cast to, for kinds a comparison can widen into.
    pub fn sql_name(self) -> Option<&'static str> {
        Some(match self {
            TypeKind::Boolean => "BOOLEAN",
            TypeKind::TinyInt => "TINYINT",
            TypeKind::SmallInt => "SMALLINT",
            TypeKind::Integer => "INTEGER",
            TypeKind::BigInt => "BIGINT",
            TypeKind::Decimal => "DECIMAL",
            TypeKind::Real => "REAL",
            TypeKind::Double => "DOUBLE",
            TypeKind::Int256 => "INT256",
            TypeKind::UInt256 => "UINT256",
            TypeKind::Char => "CHAR",
            TypeKind::Varchar => "VARCHAR",
            TypeKind::Varbinary => "VARBINARY",
            TypeKind::Date => "DATE",
            TypeKind::Time => "TIME",
            TypeKind::Timestamp => "TIMESTAMP",
            TypeKind::Json => "JSON",
            TypeKind::Interval | TypeKind::Array | TypeKind::Map | TypeKind::Other => return None,
        })
    }

    /// Position on the numeric chain, narrowest first.
    fn numeric_rank(self) -> Option<u8> {
        Some(match self {
            TypeKind::TinyInt => 0,
            TypeKind::SmallInt => 1,
            TypeKind::Integer => 2,
            TypeKind::BigInt => 3,
            TypeKind::Decimal => 4,
            TypeKind::Real => 5,
            TypeKind::Double => 6,
            _ => return None,
        })
    }

    pub fn is_text(self) -> bool {
        matches!(self, TypeKind::Char | TypeKind::Varchar)
    }

    pub fn is_binary(self) -> bool {
        self == TypeKind::Varbinary
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_rank().is_some() || matches!(self, TypeKind::Int256 | TypeKind::UInt256)
    }
}

/// True when a value of `from` converts to `to` without an explicit cast in
/// the source engines. Strictly narrower to wider; a kind does not widen to
/// itself.
pub fn widens_to(from: TypeKind, to: TypeKind) -> bool {
    use TypeKind::*;
    if let (Some(a), Some(b)) = (from.numeric_rank(), to.numeric_rank()) {
        return a < b;
    }
    matches!(
        (from, to),
        (Int256 | UInt256, Double) | (Date, Timestamp) | (Char, Varchar)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_chain() {
        assert!(widens_to(TypeKind::Integer, TypeKind::Double));
        assert!(widens_to(TypeKind::TinyInt, TypeKind::Decimal));
        assert!(!widens_to(TypeKind::Double, TypeKind::Integer));
        assert!(!widens_to(TypeKind::Double, TypeKind::Double));
    }

    #[test]
    fn test_other_edges() {
        assert!(widens_to(TypeKind::UInt256, TypeKind::Double));
        assert!(widens_to(TypeKind::Date, TypeKind::Timestamp));
        assert!(widens_to(TypeKind::Char, TypeKind::Varchar));
        assert!(!widens_to(TypeKind::Integer, TypeKind::UInt256));
        assert!(!widens_to(TypeKind::Varchar, TypeKind::Varbinary));
    }

    #[test]
    fn test_kind_from_text_ignores_parameters() {
        assert_eq!(TypeKind::from_sql("varchar(3)"), Some(TypeKind::Varchar));
        assert_eq!(TypeKind::from_sql("DECIMAL(38, 0)"), Some(TypeKind::Decimal));
        assert_eq!(TypeKind::from_sql("timestamp(3) with time zone"), Some(TypeKind::Timestamp));
        assert_eq!(TypeKind::from_sql("array(varchar)"), Some(TypeKind::Array));
        assert_eq!(TypeKind::from_sql("uint256"), Some(TypeKind::UInt256));
        assert_eq!(TypeKind::from_sql("geometry"), Some(TypeKind::Other));
        assert_eq!(TypeKind::from_sql("not a type("), None);
    }

    #[test]
    fn test_kind_of_parsed_type() {
        assert_eq!(TypeKind::of(&DataType::Bytea), TypeKind::Varbinary);
        assert_eq!(TypeKind::of(&DataType::Text), TypeKind::Varchar);
        assert_eq!(TypeKind::of(&DataType::UInt256), TypeKind::UInt256);
    }
}
