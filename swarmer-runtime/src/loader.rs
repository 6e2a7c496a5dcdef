//! Settings file loading and environment overrides.
use crate::error::RuntimeError;
use std::path::{Path, PathBuf};
use swarmer::core::PopulationSettings;

pub const ENV_PREFIX: &str = "SWARMER";

/// Reads population settings from an optional YAML file, then applies
/// `<PREFIX>_*` environment overrides on top.
pub struct ConfigLoader {
    prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_file(&self, path: impl AsRef<Path>) -> Result<PopulationSettings, RuntimeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        // Enum variants such as `think_time: { between: { .. } }` are written as maps.
        let mut settings: PopulationSettings = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(&content),
        )?;
        self.apply_env_overrides(&mut settings)?;
        Ok(settings)
    }

    pub fn from_env(&self) -> Result<PopulationSettings, RuntimeError> {
        let mut settings = PopulationSettings::default();
        self.apply_env_overrides(&mut settings)?;
        Ok(settings)
    }

    /// Settings are not validated here; command line flags may still fill in
    /// missing values.
    pub fn load(&self, path: Option<impl AsRef<Path>>) -> Result<PopulationSettings, RuntimeError> {
        match path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    pub fn apply_env_overrides(&self, settings: &mut PopulationSettings) -> Result<(), RuntimeError> {
        if let Ok(host) = self.get_env_var("HOST") {
            settings.host = host;
        }

        if let Ok(users) = self.get_env_var("USERS") {
            settings.users = users
                .parse()
                .map_err(|e| RuntimeError::Env(format!("Invalid USERS: {}", e)))?;
        }

        if let Ok(spawn_rate) = self.get_env_var("SPAWN_RATE") {
            settings.spawn_rate = spawn_rate
                .parse()
                .map_err(|e| RuntimeError::Env(format!("Invalid SPAWN_RATE: {}", e)))?;
        }

        if let Ok(run_time) = self.get_env_var("RUN_TIME") {
            let run_time = humantime::parse_duration(&run_time)
                .map_err(|e| RuntimeError::Env(format!("Invalid RUN_TIME: {}", e)))?;
            settings.run_time = Some(run_time);
        }

        Ok(())
    }

    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use std::time::Duration;
    use swarmer::core::ThinkTime;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("swarmer-{}-{name}.yaml", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn file_then_env() {
        let path = write_config(
            "file-then-env",
            "host: \"localhost:50051\"\nusers: 10\nspawn_rate: 2\n",
        );
        std::env::set_var("SWARMER_T1_USERS", "25");
        std::env::set_var("SWARMER_T1_RUN_TIME", "1m 30s");

        let settings = ConfigLoader::with_prefix("SWARMER_T1")
            .load(Some(&path))
            .unwrap();
        assert_eq!(settings.host, "localhost:50051");
        assert_eq!(settings.users, 25);
        assert_eq!(settings.spawn_rate, 2.);
        assert_eq!(settings.run_time, Some(Duration::from_secs(90)));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn class_overrides_from_file() {
        let path = write_config(
            "class-overrides",
            r#"
host: "localhost:50051"
classes:
  LoginWithUniqueUsers:
    weight: 3
    think_time:
      constant: 30
  FetchVacancies:
    think_time:
      between: { min: 0.5, max: 2 }
"#,
        );

        let settings = ConfigLoader::with_prefix("SWARMER_T5")
            .from_file(&path)
            .unwrap();
        let login = &settings.classes["LoginWithUniqueUsers"];
        assert_eq!(login.weight, NonZeroU32::new(3));
        assert_eq!(
            login.think_time,
            Some(ThinkTime::constant(Duration::from_secs(30)))
        );
        assert_eq!(
            settings.classes["FetchVacancies"].think_time,
            Some(ThinkTime::between(
                Duration::from_millis(500),
                Duration::from_secs(2)
            ))
        );
        assert!(settings.validate().is_ok());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn env_only() {
        std::env::set_var("SWARMER_T2_HOST", "vacancy:9000");
        let settings = ConfigLoader::with_prefix("SWARMER_T2")
            .load(None::<&Path>)
            .unwrap();
        assert_eq!(settings.host, "vacancy:9000");
        assert_eq!(settings.users, swarmer::core::DEFAULT_USERS);
    }

    #[test]
    fn bad_override() {
        std::env::set_var("SWARMER_T3_SPAWN_RATE", "fast");
        let err = ConfigLoader::with_prefix("SWARMER_T3")
            .from_env()
            .unwrap_err();
        assert!(err.to_string().contains("Invalid SPAWN_RATE"), "{err}");
    }

    #[test]
    fn missing_and_malformed_files() {
        let err = ConfigLoader::with_prefix("SWARMER_T4")
            .from_file("/definitely/not/here.yaml")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Io { .. }));

        let path = write_config("malformed", "users: [1, 2]\n");
        let err = ConfigLoader::with_prefix("SWARMER_T4")
            .from_file(&path)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Yaml(_)));
        let _ = std::fs::remove_file(path);
    }
}
