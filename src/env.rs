// Copyright © 2024 Pathway

use std::env;
use std::error;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("couldn't parse the value of {0:?} environment variable as UTF-8 string")]
    NotUtf8(String),

    #[error("couldn't parse the value of {0:?} environment variable: {1}")]
    ParsingFailed(String, #[source] Box<dyn error::Error + Send + Sync>),

    #[error("value {value:?} of {name:?} environment variable is not a boolean flag")]
    NotAFlag { name: String, value: String },
}

fn read_env_var(name: &str) -> Result<Option<String>, Error> {
    env::var_os(name)
        .map(|value| {
            value
                .into_string()
                .map_err(|_| Error::NotUtf8(name.to_string()))
        })
        .transpose()
}

pub fn parse_env_var<T: FromStr>(name: &str) -> Result<Option<T>, Error>
where
    T::Err: error::Error + Send + Sync + 'static,
{
    read_env_var(name)?
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|err| Error::ParsingFailed(name.to_string(), Box::new(err)))
        })
        .transpose()
}

/// Reads a boolean switch. Besides "true" and "false", the usual shell spellings
/// ("1", "yes", "on", ...) are accepted, case-insensitively.
pub fn parse_env_flag(name: &str) -> Result<Option<bool>, Error> {
    let Some(value) = read_env_var(name)? else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "t" | "y" => Ok(Some(true)),
        "false" | "no" | "off" | "0" | "f" | "n" | "" => Ok(Some(false)),
        _ => Err(Error::NotAFlag {
            name: name.to_string(),
            value,
        }),
    }
}
