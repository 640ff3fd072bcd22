use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    fn base() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
    }

    fn finish(figment: Figment) -> Result<AppConfig> {
        let config: AppConfig = figment.merge(Env::prefixed("UPDOWN_").split("__")).extract()?;
        config.market.validate()?;
        Ok(config)
    }

    /// Loads configuration by merging defaults, `config/Market.toml`, and
    /// `UPDOWN_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the market section is invalid.
    pub fn load() -> Result<AppConfig> {
        Self::finish(Self::base().merge(Toml::file("config/Market.toml")))
    }

    /// Loads configuration with a profile overlay (`config/Market.{profile}.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the market section is invalid.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        Self::finish(
            Self::base()
                .merge(Toml::file("config/Market.toml"))
                .merge(Toml::file(format!("config/Market.{profile}.toml"))),
        )
    }

    /// Loads configuration from an explicit file; `.json` files are read as
    /// JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the market section is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::base().merge(Json::file(path)),
            _ => Self::base().merge(Toml::file(path)),
        };
        Self::finish(figment)
    }
}
