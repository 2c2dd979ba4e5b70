//! Custom validation functions for configuration.

use std::collections::BTreeMap;

use fleetsim_core::taxonomy::MachineKind;
use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

/// Upper bound on instances of one machine kind.
pub const MAX_MACHINES_PER_KIND: usize = 10_000;

lazy_static! {
    static ref HOST_RE: Regex =
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.\-]*[A-Za-z0-9])?$").expect("host pattern");
}

/// Validate a host name or IPv4 literal.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.len() <= 253 && HOST_RE.is_match(host) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_host"))
    }
}

/// Validate that every fleet entry names a known machine kind with a sane count.
pub fn validate_fleet(fleet: &BTreeMap<String, usize>) -> Result<(), ValidationError> {
    for (name, count) in fleet {
        if name.parse::<MachineKind>().is_err() {
            let mut error = ValidationError::new("unknown_machine_kind");
            error.message = Some(format!("unknown machine kind '{name}'").into());
            return Err(error);
        }
        if *count > MAX_MACHINES_PER_KIND {
            let mut error = ValidationError::new("too_many_machines");
            error.message = Some(
                format!("{name}: {count} exceeds {MAX_MACHINES_PER_KIND} machines").into(),
            );
            return Err(error);
        }
    }
    Ok(())
}

/// Validate a tracing filter directive is not blank.
pub fn validate_filter(filter: &str) -> Result<(), ValidationError> {
    if filter.trim().is_empty() {
        Err(ValidationError::new("empty_filter"))
    } else {
        Ok(())
    }
}
