//! Value types for fields and expressions.
//!
//! Pure data: type identity and the compatibility rules used by expression
//! checking. No SQL knowledge lives here; dialects translate these to
//! engine type names.

use serde::{Deserialize, Serialize};

/// The type of a field or expression value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Bool,
    Date,
    Timestamp,
    /// A regular expression value; comparable only against strings.
    Regex,
    /// An inclusive range of a scalar type, as used in range filters.
    Range(Box<ValueType>),
    /// A partial comparison ("= 'a' | 'b'"): one side of a comparison whose
    /// other side is filled in by each alternative.
    Alternation(Box<ValueType>),
}

impl ValueType {
    /// Whether a value of this type can be compared with one of `other`.
    ///
    /// Numbers compare with numbers, strings with strings or regexes, and
    /// time types with themselves. Ranges and alternations compare with
    /// their element type.
    pub fn comparable_with(&self, other: &ValueType) -> bool {
        use ValueType::*;
        match (self, other) {
            (Range(inner), rhs) | (rhs, Range(inner)) => inner.comparable_with(rhs),
            (Alternation(inner), rhs) | (rhs, Alternation(inner)) => inner.comparable_with(rhs),
            (Regex, String) | (String, Regex) => true,
            (Regex, _) | (_, Regex) => false,
            (a, b) => a == b,
        }
    }

    /// Whether this is a date or timestamp type.
    pub fn is_temporal(&self) -> bool {
        matches!(self, ValueType::Date | ValueType::Timestamp)
    }

    /// Whether values of this type can be summed/averaged.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Number)
    }

    /// Display name used in error messages.
    pub fn name(&self) -> String {
        match self {
            ValueType::String => "string".into(),
            ValueType::Number => "number".into(),
            ValueType::Bool => "bool".into(),
            ValueType::Date => "date".into(),
            ValueType::Timestamp => "timestamp".into(),
            ValueType::Regex => "regex".into(),
            ValueType::Range(inner) => format!("range<{}>", inner.name()),
            ValueType::Alternation(inner) => format!("alternation<{}>", inner.name()),
        }
    }
}

/// Truncation units for date/timestamp expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Timeframe {
    /// The SQL unit keyword, lowercase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Second => "second",
            Timeframe::Minute => "minute",
            Timeframe::Hour => "hour",
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Quarter => "quarter",
            Timeframe::Year => "year",
        }
    }

    /// Parse a timeframe from its keyword.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "second" => Some(Timeframe::Second),
            "minute" => Some(Timeframe::Minute),
            "hour" => Some(Timeframe::Hour),
            "day" => Some(Timeframe::Day),
            "week" => Some(Timeframe::Week),
            "month" => Some(Timeframe::Month),
            "quarter" => Some(Timeframe::Quarter),
            "year" => Some(Timeframe::Year),
            _ => None,
        }
    }

    /// Units below `day` only exist on timestamps.
    pub fn requires_timestamp(&self) -> bool {
        matches!(
            self,
            Timeframe::Second | Timeframe::Minute | Timeframe::Hour
        )
    }
}

/// Extraction units for date/timestamp expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractUnit {
    Second,
    Minute,
    Hour,
    Day,
    DayOfWeek,
    DayOfYear,
    Week,
    Month,
    Quarter,
    Year,
}

impl ExtractUnit {
    /// The SQL EXTRACT field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractUnit::Second => "SECOND",
            ExtractUnit::Minute => "MINUTE",
            ExtractUnit::Hour => "HOUR",
            ExtractUnit::Day => "DAY",
            ExtractUnit::DayOfWeek => "DAYOFWEEK",
            ExtractUnit::DayOfYear => "DAYOFYEAR",
            ExtractUnit::Week => "WEEK",
            ExtractUnit::Month => "MONTH",
            ExtractUnit::Quarter => "QUARTER",
            ExtractUnit::Year => "YEAR",
        }
    }
}
