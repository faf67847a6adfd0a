// Copyright © 2024 Pathway

//! Record classification and key extraction. Everything here is a pure function of
//! its input, so workers call it freely without coordination.

use super::error::{DataError, FareError};
use super::value::{
    AgeRange, ClassifiedRecord, GroupKey, RawRecord, AGE_FIELD, FARE_FIELD, STATE_FIELD,
};

/// Maps an age to its bucket. Total over `i64`: anything outside 18..=55,
/// including ages below 18, falls into [`AgeRange::Age56Plus`].
pub fn classify_age(age: i64) -> AgeRange {
    match age {
        18..=25 => AgeRange::Age18To25,
        26..=35 => AgeRange::Age26To35,
        36..=45 => AgeRange::Age36To45,
        46..=55 => AgeRange::Age46To55,
        _ => AgeRange::Age56Plus,
    }
}

pub fn parse_age(raw_value: &str) -> Result<i64, DataError> {
    raw_value
        .trim()
        .parse()
        .map_err(|source| DataError::InvalidAge {
            value: raw_value.to_string(),
            source,
        })
}

pub fn parse_fare(raw_value: &str) -> Result<f64, DataError> {
    let invalid = |reason| DataError::InvalidFare {
        value: raw_value.to_string(),
        reason,
    };
    let fare: f64 = raw_value
        .trim()
        .parse()
        .map_err(|e| invalid(FareError::NotANumber(e)))?;
    if fare.is_finite() {
        Ok(fare)
    } else {
        Err(invalid(FareError::NotFinite))
    }
}

pub fn classify(record: RawRecord) -> Result<ClassifiedRecord, DataError> {
    let age = parse_age(record.require(AGE_FIELD)?)?;
    Ok(ClassifiedRecord {
        age_range: classify_age(age),
        record,
    })
}

/// Produces the grouping key and the fare contributed by a classified record.
/// The state code is taken verbatim.
pub fn extract_key(classified: &ClassifiedRecord) -> Result<(GroupKey, f64), DataError> {
    let record = &classified.record;
    let fare = parse_fare(record.require(FARE_FIELD)?)?;
    let state = record.require(STATE_FIELD)?;
    Ok((GroupKey::new(classified.age_range, state), fare))
}
