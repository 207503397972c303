use std::path::Path;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags::{Flag, Flags};
use crate::scanner::Sector;

/// Error returned when a configuration names a flag that doesn't exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown flag `{0}`")]
pub struct UnknownFlag(pub String);

/// Settings for compiling and scanning, usually loaded from a TOML file.
///
/// ```toml
/// flags = ["ignorecase", "sector"]
/// budget = 100000
///
/// [sector]
/// stride = 512
/// offset = 0
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Names of the flags, as accepted by [`Flag::from_name`].
    pub flags: Vec<String>,
    /// Sector scanning information.
    pub sector: SectorConfig,
    /// Maximum number of VM steps per call, unlimited if not set.
    pub budget: Option<usize>,
}

/// Sector scanning information.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SectorConfig {
    /// Distance in bytes between consecutive anchors.
    pub stride: usize,
    /// Offset of the first anchor.
    pub offset: usize,
    /// First offset that is not used as an anchor.
    pub end_anchor: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> ScanConfig {
        ScanConfig {
            flags: Vec::new(),
            sector: SectorConfig { stride: 1, offset: 0, end_anchor: None },
            budget: None,
        }
    }
}

impl ScanConfig {
    /// Converts the flag names into [`Flags`].
    pub fn flags(&self) -> Result<Flags, UnknownFlag> {
        self.flags.iter().try_fold(Flags::none(), |flags, name| {
            Flag::from_name(name)
                .map(|flag| flags.with(flag))
                .ok_or_else(|| UnknownFlag(name.clone()))
        })
    }

    /// The sector described by this configuration.
    pub fn sector(&self) -> Sector {
        Sector::new(self.sector.stride, self.sector.offset)
            .end_anchor(self.sector.end_anchor)
    }
}

/// Load config file from a given path. Path must contain a valid TOML file or
/// this function will propagate the error. Settings missing from the file
/// keep the values from [`ScanConfig::default`].
pub fn load_config_from_file(
    config_file: &Path,
) -> Result<ScanConfig, figment::Error> {
    let config: ScanConfig =
        Figment::from(Serialized::defaults(ScanConfig::default()))
            .merge(Toml::file_exact(config_file))
            .extract()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::{load_config_from_file, ScanConfig, UnknownFlag};
    use crate::flags::{Flag, Flags};
    use crate::scanner::Sector;

    #[test]
    fn flags_from_names() {
        let config = ScanConfig {
            flags: vec!["IgnoreCase".to_string(), "dotall".to_string()],
            ..ScanConfig::default()
        };

        assert_eq!(
            config.flags(),
            Ok(Flags::none().with(Flag::IgnoreCase).with(Flag::DotAll))
        );

        let config = ScanConfig {
            flags: vec!["dotall".to_string(), "bogus".to_string()],
            ..ScanConfig::default()
        };

        assert_eq!(config.flags(), Err(UnknownFlag("bogus".to_string())));
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir()
            .join(format!("sectorex-config-{}.toml", std::process::id()));

        fs::write(
            &path,
            r#"
flags = ["sector"]

[sector]
stride = 512
offset = 4
"#,
        )
        .unwrap();

        let config = load_config_from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.flags(), Ok(Flags::none().with(Flag::Sector)));
        assert_eq!(config.sector(), Sector::new(512, 4));
        assert_eq!(config.budget, None);
    }

    #[test]
    fn missing_file() {
        assert!(load_config_from_file(
            std::path::Path::new("/nonexistent/sectorex.toml")
        )
        .is_err());
    }
}
