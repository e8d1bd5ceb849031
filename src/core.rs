//! Shared build-mode definitions.

/// Which environment routes are derived for.
///
/// The active mode is injected into every route context as `SITEGEN_ENV`
/// so templates can branch on it (e.g. only emit the autorefresh script
/// during development).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// Value of the `SITEGEN_ENV` context field.
    pub fn env_str(self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Production => "production",
        }
    }
}
