//! Module firmware protocol version
//!
//! The module reports its version as a string such as `"v1.6"`. Two pieces of
//! command shaping depend on it:
//!
//! - only the exact string `v1.0` takes a scalar `input` field instead of a list
//! - firmware whose level reaches [`VLM_HIGH_CAPABILITY_VERSION`] ships a
//!   higher-capability vision model
//!
//! The level is the leading decimal number after the `v`, read as a float.
//! `v1.6.1` is level 1.6 and `v1.10` is level 1.1.

use std::fmt;

/// The one version string that expects a scalar `input` field
pub const LEGACY_INPUT_VERSION: &str = "v1.0";

/// First level that ships the high-capability vision model
pub const VLM_HIGH_CAPABILITY_VERSION: f64 = 1.6;

/// A version string as reported by the module, with its numeric level
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolVersion {
    raw: String,
    level: f64,
}

impl ProtocolVersion {
    /// Parse `"v1.6"`, `"1.6"` or `"v1.6.1"`; surrounding whitespace is ignored
    ///
    /// Returns `None` when no number follows the `v`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let rest = s.strip_prefix('v').or_else(|| s.strip_prefix('V')).unwrap_or(s);
        let level = leading_number(rest)?;
        Some(Self {
            raw: format!("v{}", rest),
            level,
        })
    }

    /// Version string, always with a lowercase `v`
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric level used for threshold checks
    pub fn level(&self) -> f64 {
        self.level
    }

    /// True when `input` must be sent as a scalar
    pub fn uses_scalar_input(&self) -> bool {
        self.raw == LEGACY_INPUT_VERSION
    }

    /// True when the level is at or above `level`
    pub fn at_least(&self, level: f64) -> bool {
        self.level >= level
    }
}

/// Float value of the longest `digits[.digits]` prefix
fn leading_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let int_end = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if int_end == 0 {
        return None;
    }
    let mut end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac = bytes[end + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if frac > 0 {
            end += 1 + frac;
        }
    }
    s[..end].parse().ok()
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self {
            raw: LEGACY_INPUT_VERSION.to_string(),
            level: 1.0,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> ProtocolVersion {
        ProtocolVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(version("v1.6").level(), 1.6);
        assert_eq!(version("1.3").as_str(), "v1.3");
        assert_eq!(version(" v2 ").level(), 2.0);
        assert_eq!(version("V1.0"), ProtocolVersion::default());
        assert_eq!(ProtocolVersion::parse("vx"), None);
        assert_eq!(ProtocolVersion::parse(""), None);
    }

    #[test]
    fn test_level_is_leading_decimal() {
        assert_eq!(version("v1.6.1").level(), 1.6);
        assert_eq!(version("v1.10").level(), 1.1);
        assert_eq!(version("v1.x").level(), 1.0);
        assert_eq!(version("v1.6.1").to_string(), "v1.6.1");
    }

    #[test]
    fn test_default_is_legacy_string() {
        assert_eq!(ProtocolVersion::default().to_string(), LEGACY_INPUT_VERSION);
        assert!(ProtocolVersion::default().uses_scalar_input());
    }

    #[test]
    fn test_scalar_input_only_on_exact_v1_0() {
        assert!(version("v1.0").uses_scalar_input());
        assert!(!version("v1.00").uses_scalar_input());
        assert!(!version("v1").uses_scalar_input());
        assert!(!version("v1.1").uses_scalar_input());
        assert!(!version("v2.0").uses_scalar_input());
    }

    #[test]
    fn test_threshold() {
        for s in ["v1.6", "v1.6.1", "v1.7", "v2.0", "v1.60"] {
            assert!(version(s).at_least(VLM_HIGH_CAPABILITY_VERSION), "{}", s);
        }
        for s in ["v1.0", "v1.5", "v1.10", "v1.59"] {
            assert!(!version(s).at_least(VLM_HIGH_CAPABILITY_VERSION), "{}", s);
        }
    }
}
