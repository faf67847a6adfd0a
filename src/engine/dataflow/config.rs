// Copyright © 2024 Pathway

use std::num::NonZeroUsize;

use crate::env::{parse_env_flag, parse_env_var, Error as EnvError};
use log::warn;

pub const MAX_THREADS: usize = 64;
pub const DEFAULT_PARTITION_SIZE: usize = 10_000;

pub const THREADS_ENV_VAR: &str = "CABFARE_THREADS";
pub const PARTITION_SIZE_ENV_VAR: &str = "CABFARE_PARTITION_SIZE";
pub const SKIP_MALFORMED_ENV_VAR: &str = "CABFARE_SKIP_MALFORMED";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("can't run with no threads")]
    NeedsThreads,

    #[error("partition size must be positive")]
    EmptyPartitions,

    #[error(transparent)]
    EnvError(#[from] EnvError),
}

/// What happens to an input line that can't be parsed, classified or keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// The whole run fails on the first bad line any worker meets.
    #[default]
    FailFast,
    /// Bad lines are logged, skipped and counted in the run statistics.
    SkipAndCount,
}

#[derive(Clone, Debug)]
pub struct Config {
    threads: usize,
    partition_size: NonZeroUsize,
    error_policy: ErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 1,
            partition_size: NonZeroUsize::new(DEFAULT_PARTITION_SIZE)
                .expect("default partition size is positive"),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl Config {
    pub fn new(
        threads: usize,
        partition_size: usize,
        error_policy: ErrorPolicy,
    ) -> Result<Self, Error> {
        if threads == 0 {
            return Err(Error::NeedsThreads);
        }
        let threads = if threads > MAX_THREADS {
            warn!("{threads} is greater than the maximum allowed number of threads ({MAX_THREADS}), reducing");
            MAX_THREADS
        } else {
            threads
        };
        let partition_size = NonZeroUsize::new(partition_size).ok_or(Error::EmptyPartitions)?;
        Ok(Self {
            threads,
            partition_size,
            error_policy,
        })
    }

    pub fn from_env() -> Result<Self, Error> {
        let threads: usize = parse_env_var(THREADS_ENV_VAR)?.unwrap_or(1);
        let partition_size: usize =
            parse_env_var(PARTITION_SIZE_ENV_VAR)?.unwrap_or(DEFAULT_PARTITION_SIZE);
        let error_policy = if parse_env_flag(SKIP_MALFORMED_ENV_VAR)?.unwrap_or(false) {
            ErrorPolicy::SkipAndCount
        } else {
            ErrorPolicy::FailFast
        };
        Self::new(threads, partition_size, error_policy)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn partition_size(&self) -> usize {
        self.partition_size.get()
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    #[must_use]
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }
}
