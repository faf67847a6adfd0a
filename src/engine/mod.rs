pub mod error;
pub use self::error::{DataError, Error, Result};

pub mod value;
pub use self::value::{
    output_schema, AgeRange, AggregatedRow, ClassifiedRecord, GroupKey, RawRecord, Type,
    ValueField,
};

pub mod classify;
pub use classify::{classify, classify_age, extract_key};

pub mod reduce;
pub use reduce::{Aggregate, ReducerImpl, Semigroup, SumReducer};

pub mod output;
pub use output::{format_row, round_half_away_from_zero};

pub mod dataflow;
pub use dataflow::{run_aggregation, AggregationOutput, Config, ErrorPolicy, RunStats};
