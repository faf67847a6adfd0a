// Copyright © 2024 Pathway

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use super::error::DataError;

pub const AGE_FIELD: &str = "age";
pub const STATE_FIELD: &str = "state";
pub const FARE_FIELD: &str = "fare";

/// Field names of a trip record, in the order they appear in the input lines.
pub const TRIP_HEADER: [&str; 8] = [
    "date",
    "name",
    AGE_FIELD,
    "city",
    STATE_FIELD,
    FARE_FIELD,
    "gender",
    "occupation",
];

/// One input line, keyed by header field name. Values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRecord {
    fields: HashMap<ArcStr, String>,
}

impl RawRecord {
    pub fn new(fields: HashMap<ArcStr, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, DataError> {
        self.get(name)
            .ok_or_else(|| DataError::MissingField(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawRecord
where
    K: Into<ArcStr>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Age bucket. `Age56Plus` is the catch-all: besides ages above 55 it also
/// receives every age below 18.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AgeRange {
    #[serde(rename = "18-25")]
    Age18To25,
    #[serde(rename = "26-35")]
    Age26To35,
    #[serde(rename = "36-45")]
    Age36To45,
    #[serde(rename = "46-55")]
    Age46To55,
    #[serde(rename = "56+")]
    Age56Plus,
}

impl AgeRange {
    pub const ALL: [AgeRange; 5] = [
        Self::Age18To25,
        Self::Age26To35,
        Self::Age36To45,
        Self::Age46To55,
        Self::Age56Plus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Age18To25 => "18-25",
            Self::Age26To35 => "26-35",
            Self::Age36To45 => "36-45",
            Self::Age46To55 => "46-55",
            Self::Age56Plus => "56+",
        }
    }
}

impl Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown age range label {0:?}")]
pub struct UnknownAgeRange(String);

impl FromStr for AgeRange {
    type Err = UnknownAgeRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|range| range.as_str() == s)
            .ok_or_else(|| UnknownAgeRange(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRecord {
    pub record: RawRecord,
    pub age_range: AgeRange,
}

/// Grouping key. Equality is structural, so records from different lines and
/// partitions land in the same group whenever bucket and state match.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GroupKey {
    pub age_range: AgeRange,
    pub state: ArcStr,
}

impl GroupKey {
    pub fn new(age_range: AgeRange, state: impl Into<ArcStr>) -> Self {
        Self {
            age_range,
            state: state.into(),
        }
    }
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.age_range, self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub age_range: AgeRange,
    pub state: ArcStr,
    pub total_fare: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    String,
    Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueField {
    pub name: String,
    pub type_: Type,
}

impl ValueField {
    pub fn new(name: impl Into<String>, type_: Type) -> Self {
        Self {
            name: name.into(),
            type_,
        }
    }
}

/// Columns of the aggregated table, in sink order.
pub fn output_schema() -> Vec<ValueField> {
    vec![
        ValueField::new("age_range", Type::String),
        ValueField::new("state", Type::String),
        ValueField::new("total_fare", Type::Float),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_range_labels_round_trip() {
        for range in AgeRange::ALL {
            assert_eq!(range.as_str().parse::<AgeRange>().unwrap(), range);
        }
        assert!("17-".parse::<AgeRange>().is_err());
    }

    #[test]
    fn test_age_range_serializes_as_label() {
        let row = AggregatedRow {
            age_range: AgeRange::Age56Plus,
            state: "NY".into(),
            total_fare: 1.5,
        };
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"age_range":"56+","state":"NY","total_fare":1.5}"#
        );
    }

    #[test]
    fn test_group_key_equality_is_structural() {
        let state = String::from("CA");
        let lhs = GroupKey::new(AgeRange::Age26To35, state.as_str());
        let rhs = GroupKey::new(AgeRange::Age26To35, "CA");
        assert_eq!(lhs, rhs);
        assert_ne!(lhs, GroupKey::new(AgeRange::Age36To45, "CA"));
    }

    #[test]
    fn test_raw_record_require() {
        let record: RawRecord = [("age", "31")].into_iter().collect();
        assert_eq!(record.require("age").unwrap(), "31");
        assert!(matches!(
            record.require("fare"),
            Err(DataError::MissingField(name)) if name == "fare"
        ));
    }
}
