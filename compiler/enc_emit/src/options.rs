//! Emission options.

/// Knobs for delta emission.
///
/// ```text
/// let options = EmitOptions::default().with_debug_info(false);
/// ```
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct EmitOptions {
    /// Write per-method local and sequence point tables.
    pub emit_debug_info: bool,
    /// Module that defines well-known runtime types.
    pub core_library: String,
    /// Recheck log, map and append-only invariants before committing.
    pub verify_invariants: bool,
    /// Case count from which a full build dispatches a string switch
    /// through a hashing helper.
    pub string_switch_helper_threshold: usize,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            emit_debug_info: true,
            core_library: "System.Runtime".to_owned(),
            verify_invariants: true,
            string_switch_helper_threshold: 7,
        }
    }
}

impl EmitOptions {
    /// Defaults overlaid with `ENC_EMIT_DEBUG_INFO` and `ENC_EMIT_VERIFY`.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = var("ENC_EMIT_DEBUG_INFO") {
            self.emit_debug_info = parse_flag(&value, self.emit_debug_info);
        }
        if let Some(value) = var("ENC_EMIT_VERIFY") {
            self.verify_invariants = parse_flag(&value, self.verify_invariants);
        }
        self
    }

    #[must_use]
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.emit_debug_info = enabled;
        self
    }

    #[must_use]
    pub fn with_core_library(mut self, module: impl Into<String>) -> Self {
        self.core_library = module.into();
        self
    }

    #[must_use]
    pub fn with_verify_invariants(mut self, enabled: bool) -> Self {
        self.verify_invariants = enabled;
        self
    }

    #[must_use]
    pub fn with_string_switch_helper_threshold(mut self, cases: usize) -> Self {
        self.string_switch_helper_threshold = cases;
        self
    }
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "0" | "false" | "no" | "off" => false,
        "1" | "true" | "yes" | "on" => true,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let options = EmitOptions::default();
        assert!(options.emit_debug_info);
        assert!(options.verify_invariants);
        assert_eq!(options.core_library, "System.Runtime");
        assert_eq!(options.string_switch_helper_threshold, 7);
    }

    #[test]
    fn overlay_disables_flags() {
        let options = EmitOptions::default().overlay(|key| match key {
            "ENC_EMIT_DEBUG_INFO" => Some("0".to_owned()),
            "ENC_EMIT_VERIFY" => Some("False".to_owned()),
            _ => None,
        });
        assert!(!options.emit_debug_info);
        assert!(!options.verify_invariants);
    }

    #[test]
    fn unknown_values_keep_defaults() {
        let options = EmitOptions::default().overlay(|_| Some("maybe".to_owned()));
        assert_eq!(options, EmitOptions::default());
    }
}
