//! AppArmor profile resolution.

use crate::constants::{
    APPARMOR_CONTAINER_ANNOTATION_PREFIX, APPARMOR_PROFILE_PREFIX, APPARMOR_RUNTIME_DEFAULT,
};
use std::collections::HashMap;
use std::path::Path;

const ENABLED_PARAM: &str = "/sys/module/apparmor/parameters/enabled";
const PARSER: &str = "/sbin/apparmor_parser";

/// Returns true when the kernel module is enabled and the parser exists.
pub fn is_enabled() -> bool {
    if !Path::new(PARSER).exists() {
        return false;
    }
    std::fs::read_to_string(ENABLED_PARAM)
        .map(|v| v.starts_with('Y'))
        .unwrap_or(false)
}

/// Raw annotation value for `container_name`, if set.
pub fn profile_from_annotations<'a>(
    annotations: &'a HashMap<String, String>,
    container_name: &str,
) -> Option<&'a str> {
    annotations
        .get(&format!("{}{}", APPARMOR_CONTAINER_ANNOTATION_PREFIX, container_name))
        .map(String::as_str)
}

/// Profile name to set on the container process, or `None` to leave it unset.
///
/// `runtime/default` selects `default_profile`; `localhost/<name>` selects
/// `<name>`.
pub fn resolve_profile(
    annotations: &HashMap<String, String>,
    container_name: &str,
    default_profile: &str,
) -> Option<String> {
    let profile = profile_from_annotations(annotations, container_name)?;
    if profile.is_empty() {
        return None;
    }
    if profile == APPARMOR_RUNTIME_DEFAULT {
        return Some(default_profile.to_string());
    }
    Some(
        profile
            .strip_prefix(APPARMOR_PROFILE_PREFIX)
            .unwrap_or(profile)
            .to_string(),
    )
}
