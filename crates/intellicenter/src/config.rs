//! CLI configuration: a thin wrapper around `intellicenter_config`.
//!
//! Adds the resolution order the command line needs: `--host` and
//! `--port` flags (or their environment variables) win over the selected
//! profile, and `--timeout` wins over both.

use intellicenter_config::profile_to_controller_config;
use intellicenter_core::ControllerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use intellicenter_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `ControllerConfig` for this invocation.
///
/// A `--host` flag works without any config file. Otherwise the active
/// profile must exist; a missing explicit `--profile` is an error, a
/// missing default profile means nothing was configured yet.
pub fn resolve_controller(global: &GlobalOpts, config: &Config) -> Result<ControllerConfig, CliError> {
    let name = active_profile_name(global, config);

    let mut profile = match (config.profiles.get(&name), global.host.as_deref()) {
        (Some(profile), _) => profile.clone(),
        (None, Some(host)) => Profile::new(host),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available(config),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(host) = &global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    tracing::debug!(profile = %name, host = %profile.host, port = profile.port, "resolved controller");
    Ok(profile_to_controller_config(&profile, &config.defaults)?)
}

fn available(config: &Config) -> String {
    let names = config.profile_names();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["intellicenter"];
        argv.extend_from_slice(args);
        argv.push("info");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with(name: &str, host: &str) -> Config {
        let mut config = Config::default();
        config.profiles.insert(name.into(), Profile::new(host));
        config
    }

    #[test]
    fn host_flag_works_without_profiles() {
        let cfg = resolve_controller(&global(&["--host", "10.0.0.5"]), &Config::default()).unwrap();
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, intellicenter_core::DEFAULT_PORT);
    }

    #[test]
    fn flags_override_profile() {
        let config = config_with("default", "pool.local");
        let cfg = resolve_controller(
            &global(&["--port", "7000", "--timeout", "9"]),
            &config,
        )
        .unwrap();
        assert_eq!(cfg.host, "pool.local");
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.request_timeout, Duration::from_secs(9));
    }

    #[test]
    fn missing_profiles_are_reported() {
        let err = resolve_controller(&global(&[]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));

        let config = config_with("home", "pool.local");
        let err = resolve_controller(&global(&["--profile", "cabin"]), &config).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "cabin");
                assert_eq!(available, "home");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
