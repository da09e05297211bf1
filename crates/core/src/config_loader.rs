use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging the TOML file (if present) with
    /// `IRONMAKER_`-prefixed environment variables. Nested keys use a
    /// double underscore, e.g. `IRONMAKER_API__API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed, an environment
    /// override has the wrong type, or the merged config fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("IRONMAKER_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("IRONMAKER_TRADING__DRY_RUN", "true");
            let config = ConfigLoader::load("does-not-exist.toml").unwrap();
            assert!(config.trading.dry_run);
            assert_eq!(config.rate_limit.max_requests, 30);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                [trading]
                dry_run = true
                spread = 0.08

                [rate_limit]
                max_requests = 10
                "#,
            )?;
            jail.set_env("IRONMAKER_RATE_LIMIT__MAX_REQUESTS", "20");
            let config = ConfigLoader::load("Config.toml").unwrap();
            assert!((config.trading.spread - 0.08).abs() < 1e-9);
            assert_eq!(config.rate_limit.max_requests, 20);
            Ok(())
        });
    }
}
