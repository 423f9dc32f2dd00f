//! Open-mode string descriptor.
//!
//! Mode strings use the alphabet `{r, w, x, a, t, b, +}` and are validated
//! eagerly at the open entry points; backends consume the derived predicates
//! rather than re-parsing the string.

use crate::errors::{FsError, FsResult};

const VALID_CHARS: &str = "rwxtab+";

/// A parsed, validated open mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    mode: String,
}

impl Mode {
    /// Parse and validate a mode string.
    pub fn new(mode: &str) -> FsResult<Mode> {
        if mode.is_empty() {
            return Err(FsError::invalid_mode("mode must not be empty"));
        }
        if mode.chars().any(|c| !VALID_CHARS.contains(c)) {
            return Err(FsError::invalid_mode(format!(
                "mode '{mode}' contains invalid characters"
            )));
        }
        if !mode.starts_with(['r', 'w', 'x', 'a']) {
            return Err(FsError::invalid_mode(
                "mode must start with 'r', 'w', 'x', or 'a'",
            ));
        }
        if mode.contains('t') && mode.contains('b') {
            return Err(FsError::invalid_mode(
                "mode can't be binary ('b') and text ('t')",
            ));
        }
        Ok(Mode {
            mode: mode.to_string(),
        })
    }

    /// Additional validation for binary-open entry points: `t` is rejected.
    pub fn validate_bin(&self) -> FsResult<()> {
        if self.contains('t') {
            return Err(FsError::invalid_mode("mode must be binary"));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.mode
    }

    pub fn contains(&self, c: char) -> bool {
        self.mode.contains(c)
    }

    /// `true` if the mode would create a missing file.
    pub fn create(&self) -> bool {
        self.contains('a') || self.contains('w') || self.contains('x')
    }

    /// `true` if the mode permits reading.
    pub fn reading(&self) -> bool {
        self.contains('r') || self.contains('+')
    }

    /// `true` if the mode permits writing.
    pub fn writing(&self) -> bool {
        self.contains('w') || self.contains('a') || self.contains('+') || self.contains('x')
    }

    /// `true` if writes go to the end of the file.
    pub fn appending(&self) -> bool {
        self.contains('a')
    }

    /// `true` if the mode permits both reading and writing.
    pub fn updating(&self) -> bool {
        self.contains('+')
    }

    /// `true` if an existing file would be truncated.
    pub fn truncate(&self) -> bool {
        self.contains('w') || self.contains('x')
    }

    /// `true` if the mode requires exclusive creation.
    pub fn exclusive(&self) -> bool {
        self.contains('x')
    }

    pub fn binary(&self) -> bool {
        self.contains('b')
    }

    pub fn text(&self) -> bool {
        self.contains('t') || !self.contains('b')
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.mode)
    }
}

/// Check that a mode string allows reading.
pub fn check_readable(mode: &str) -> FsResult<bool> {
    Ok(Mode::new(mode)?.reading())
}

/// Check that a mode string allows writing.
pub fn check_writable(mode: &str) -> FsResult<bool> {
    Ok(Mode::new(mode)?.writing())
}

/// Validate the mode parameter of a binary open entry point and return the
/// parsed mode. Alphabet `{r, w, x, a, b, +}`; `t` is rejected outright.
pub fn validate_openbin_mode(mode: &str) -> FsResult<Mode> {
    if mode.contains('t') {
        return Err(FsError::invalid_mode("text mode not valid in openbin"));
    }
    Mode::new(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        let mode = Mode::new("r+b").unwrap();
        assert!(mode.reading());
        assert!(mode.writing());
        assert!(mode.updating());
        assert!(mode.binary());
        assert!(!mode.text());
        assert!(!mode.appending());
        assert!(!mode.truncate());

        let mode = Mode::new("w").unwrap();
        assert!(!mode.reading());
        assert!(mode.writing());
        assert!(mode.truncate());
        assert!(mode.create());
        assert!(mode.text());

        let mode = Mode::new("x").unwrap();
        assert!(mode.exclusive());
        assert!(mode.truncate());
        assert!(mode.create());

        let mode = Mode::new("a").unwrap();
        assert!(mode.appending());
        assert!(mode.create());
        assert!(!mode.truncate());
    }

    #[test]
    fn invalid_modes_are_rejected() {
        assert!(Mode::new("").is_err());
        assert!(Mode::new("rz").is_err());
        assert!(Mode::new("tb").is_err());
        assert!(Mode::new("brt").is_err());
        assert!(Mode::new("+r").is_err());
        assert!(Mode::new("r").is_ok());
        assert!(Mode::new("rt").is_ok());
    }

    #[test]
    fn binary_validation() {
        assert!(Mode::new("rt").unwrap().validate_bin().is_err());
        assert!(Mode::new("rb").unwrap().validate_bin().is_ok());
        assert!(validate_openbin_mode("rt").is_err());
        assert!(validate_openbin_mode("t").is_err());
        assert!(validate_openbin_mode("").is_err());
        assert!(validate_openbin_mode("rb").is_ok());
        assert!(validate_openbin_mode("r").is_ok());
    }

    #[test]
    fn mode_helpers() {
        assert!(check_readable("r").unwrap());
        assert!(!check_readable("w").unwrap());
        assert!(check_writable("w").unwrap());
        assert!(!check_writable("rb").unwrap());
    }
}
