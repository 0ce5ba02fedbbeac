//! Build metadata printed at startup.
//!
//! Values are taken from `VIGIL_BUILD_VERSION`, `VIGIL_BUILD_DATE` and
//! `VIGIL_BUILD_COMMIT` at compile time and fall back to `N/A`.

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub date: &'static str,
    pub commit: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: or_na(option_env!("VIGIL_BUILD_VERSION")),
            date: or_na(option_env!("VIGIL_BUILD_DATE")),
            commit: or_na(option_env!("VIGIL_BUILD_COMMIT")),
        }
    }
}

const fn or_na(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => NOT_AVAILABLE,
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Build version: {}", self.version)?;
        writeln!(f, "Build date: {}", self.date)?;
        write!(f, "Build commit: {}", self.commit)
    }
}
