//! Runtime environment selection.

use std::fmt;
use std::io::Error;

/// Name of the environment variable which selects the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// The name of the development environment.
const DEV_ENV_NAME: &str = "dev";

/// The name of the staging environment.
const STAGING_ENV_NAME: &str = "staging";

/// The name of the production environment.
const PROD_ENV_NAME: &str = "prod";

/// The runtime environment the service is deployed in.
///
/// Picks which `configuration/{environment}.yaml` overrides the base file and
/// how telemetry output is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// Loads the environment from the `APP_ENVIRONMENT` env variable.
    ///
    /// Defaults to [`Environment::Dev`] when the variable is unset.
    pub fn load() -> Result<Environment, Error> {
        std::env::var(APP_ENVIRONMENT_ENV_NAME)
            .unwrap_or_else(|_| DEV_ENV_NAME.into())
            .try_into()
    }

    /// Returns the string name of the environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Staging => STAGING_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Attempts to create an [`Environment`] from a string, case-insensitively.
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            STAGING_ENV_NAME => Ok(Self::Staging),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use `{DEV_ENV_NAME}`, `{STAGING_ENV_NAME}`, or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(Environment::try_from("DEV".to_string()).unwrap(), Environment::Dev);
        assert_eq!(
            Environment::try_from("Staging".to_string()).unwrap(),
            Environment::Staging
        );
        assert_eq!(
            Environment::try_from("prod".to_string()).unwrap(),
            Environment::Prod
        );
        assert!(Environment::try_from("qa".to_string()).is_err());
    }

    #[test]
    fn display_round_trips() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            assert_eq!(Environment::try_from(env.to_string()).unwrap(), env);
        }
    }
}
