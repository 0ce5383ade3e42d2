//! Sysctls requested through sandbox annotations.

use crate::constants::{SYSCTLS_ANNOTATION, UNSAFE_SYSCTLS_ANNOTATION};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A single `name=value` kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysctl {
    pub name: String,
    pub value: String,
}

/// Parses the safe and unsafe sysctl annotations.
pub fn sysctls_from_annotations(
    annotations: &HashMap<String, String>,
) -> Result<(Vec<Sysctl>, Vec<Sysctl>)> {
    let safe = match annotations.get(SYSCTLS_ANNOTATION) {
        Some(list) => parse_sysctls(list)?,
        None => Vec::new(),
    };
    let unsafe_ = match annotations.get(UNSAFE_SYSCTLS_ANNOTATION) {
        Some(list) => parse_sysctls(list)?,
        None => Vec::new(),
    };
    Ok((safe, unsafe_))
}

fn parse_sysctls(list: &str) -> Result<Vec<Sysctl>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok(Sysctl {
                name: name.to_string(),
                value: value.to_string(),
            }),
            _ => Err(Error::Validation(format!(
                "sysctl {:?} not of the format sysctl_name=value",
                entry
            ))),
        })
        .collect()
}
