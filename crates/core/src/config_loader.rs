use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging defaults, TOML, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config/BubbleRadar.toml"))
            .merge(Env::prefixed("BUBBLE_RADAR_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Loads application configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config/BubbleRadar.toml"))
            .merge(Toml::file(format!("config/BubbleRadar.{profile}.toml")))
            .merge(Env::prefixed("BUBBLE_RADAR_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_defaults_without_files() {
        // No config file in the test working directory; defaults apply.
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.analysis.window_min, 125);
        assert_eq!(config.analysis.window_max, 750);
    }
}
