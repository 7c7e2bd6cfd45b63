//! Device profile loading: TOML files with a `type` discriminator and
//! per-technology constant overrides, falling back to the built-in
//! defaults for anything unspecified.

use std::path::Path;

use anyhow::{Context, Result};

use radiotrace_core::{Profile, Profile3G, ProfileLte, ProfileWifi};

/// Load a profile from a TOML file.
pub fn load_profile(path: &Path) -> Result<Profile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile: {}", path.display()))?;
    let profile: Profile = toml::from_str(&content)
        .with_context(|| format!("invalid profile file: {}", path.display()))?;
    Ok(profile)
}

/// Built-in defaults for a technology name (`3g`, `lte`, `wifi`).
pub fn default_profile(technology: &str) -> Option<Profile> {
    match technology.to_ascii_lowercase().as_str() {
        "3g" => Some(Profile::ThreeG(Profile3G::default())),
        "lte" => Some(Profile::Lte(ProfileLte::default())),
        "wifi" => Some(Profile::Wifi(ProfileWifi::default())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_profile_with_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lte.toml");
        fs::write(&path, "type = \"lte\"\npromotion_time = 0.5\nburst_th = 2.0\n").unwrap();
        let profile = load_profile(&path).unwrap();
        match profile {
            Profile::Lte(lte) => {
                assert_eq!(lte.promotion_time, 0.5);
                assert_eq!(lte.common.burst_th, 2.0);
                // Untouched constants keep their defaults.
                assert_eq!(lte.inactivity_timer, 0.1);
            }
            _ => panic!("expected lte"),
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "type = \"5g\"\n").unwrap();
        assert!(load_profile(&path).is_err());
    }

    #[test]
    fn default_profiles_by_name() {
        assert_eq!(default_profile("3g").unwrap().technology(), "3g");
        assert_eq!(default_profile("LTE").unwrap().technology(), "lte");
        assert_eq!(default_profile("wifi").unwrap().technology(), "wifi");
        assert!(default_profile("5g").is_none());
    }
}
