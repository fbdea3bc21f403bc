use serde::{Deserialize, Serialize};

/// Knobs of a lineage build. Unknown keys in a settings file are rejected,
/// missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Hold branches whose partner has no tree generation yet and retry them
    /// once the other branches are built, instead of using offset 0 at once.
    pub defer_unresolved_partners: bool,
    /// Log founder fallbacks at `warn` level rather than `debug`.
    pub warn_on_founder_fallback: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            defer_unresolved_partners: false,
            warn_on_founder_fallback: true,
        }
    }
}

impl BuildSettings {
    pub fn load_from_path(path: &str) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Could not read settings file '{path}': {e}"))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("Could not parse settings JSON '{path}': {e}"))
    }

    /// Sets one field by name; returns a short description of the change.
    pub fn set(&mut self, name: &str, value: &serde_json::Value) -> Result<String, String> {
        let flag = |value: &serde_json::Value| {
            value
                .as_bool()
                .ok_or_else(|| format!("Parameter '{name}' expects a boolean, got {value}"))
        };
        match name {
            "defer_unresolved_partners" => {
                self.defer_unresolved_partners = flag(value)?;
                Ok(format!(
                    "defer_unresolved_partners = {}",
                    self.defer_unresolved_partners
                ))
            }
            "warn_on_founder_fallback" => {
                self.warn_on_founder_fallback = flag(value)?;
                Ok(format!(
                    "warn_on_founder_fallback = {}",
                    self.warn_on_founder_fallback
                ))
            }
            _ => Err(format!("Unknown parameter '{name}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"defer_unresolved_partners": true}"#).unwrap();
        let settings = BuildSettings::load_from_path(&path.to_string_lossy()).unwrap();
        assert!(settings.defer_unresolved_partners);
        assert!(settings.warn_on_founder_fallback);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = serde_json::from_str::<BuildSettings>(r#"{"bogus": 1}"#).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_set_parameter() {
        let mut settings = BuildSettings::default();
        let msg = settings
            .set("defer_unresolved_partners", &json!(true))
            .unwrap();
        assert!(msg.contains("true"));
        assert!(settings.defer_unresolved_partners);
        assert!(settings.set("defer_unresolved_partners", &json!(3)).is_err());
        assert!(settings.set("nope", &json!(true)).is_err());
    }
}
