//! FHIR version identification.

use regex::Regex;
use std::sync::LazyLock;

/// `fhirVersion` patterns and the release names they map to.
static VERSION_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^1\.0", "DSTU2"),
        (r"^3\.0", "STU3"),
        (r"^4\.0", "R4"),
        (r"^4\.3", "R4B"),
        (r"^5\.0", "R5"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("Valid version pattern"), name))
    .collect()
});

/// Release name of a `fhirVersion`, if the client supports it.
///
/// # Examples
///
/// ```
/// use cohort_capability::version_name;
///
/// assert_eq!(version_name("4.0.1"), Some("R4"));
/// assert_eq!(version_name("4.3.0"), Some("R4B"));
/// assert_eq!(version_name("0.5.0"), None);
/// ```
pub fn version_name(fhir_version: &str) -> Option<&'static str> {
    let fhir_version = fhir_version.trim();
    VERSION_TABLE
        .iter()
        .find(|(pattern, _)| pattern.is_match(fhir_version))
        .map(|(_, name)| *name)
}
