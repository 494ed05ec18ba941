//! Config subcommand handlers.

use std::fmt::Write;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display as TOML-like text.
fn format_config(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for name in cfg.profile_names() {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "host = \"{}\"", p.host);
        let _ = writeln!(out, "port = {}", p.port);
        let optional = [
            ("connect_timeout", p.connect_timeout),
            ("timeout", p.timeout),
            ("keepalive_interval", p.keepalive_interval),
            ("idle_timeout", p.idle_timeout),
            ("reconnect_delay", p.reconnect_delay),
            ("max_reconnect_delay", p.max_reconnect_delay),
            ("max_retries", p.max_retries.map(u64::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
    }

    out.trim_end().to_owned()
}

fn parse_secs(field: &str, value: &str) -> Result<u64, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: "must be a number (seconds)".into(),
    })
}

/// Apply one `key = value` assignment to a profile.
fn set_key(profile: &mut Profile, key: &str, value: &str) -> Result<(), CliError> {
    match key.replace('-', "_").as_str() {
        "host" => profile.host = value.to_owned(),
        "port" => {
            profile.port = value.parse().map_err(|_| CliError::Validation {
                field: "port".into(),
                reason: "must be a number between 1 and 65535".into(),
            })?;
        }
        "connect_timeout" => profile.connect_timeout = Some(parse_secs(key, value)?),
        "timeout" => profile.timeout = Some(parse_secs(key, value)?),
        "keepalive_interval" => profile.keepalive_interval = Some(parse_secs(key, value)?),
        "idle_timeout" => profile.idle_timeout = Some(parse_secs(key, value)?),
        "reconnect_delay" => profile.reconnect_delay = Some(parse_secs(key, value)?),
        "max_reconnect_delay" => profile.max_reconnect_delay = Some(parse_secs(key, value)?),
        "max_retries" => {
            profile.max_retries = Some(value.parse().map_err(|_| CliError::Validation {
                field: "max_retries".into(),
                reason: "must be a whole number".into(),
            })?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: host, port, connect_timeout, \
                     timeout, keepalive_interval, idle_timeout, reconnect_delay, \
                     max_reconnect_delay, max_retries"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { host, name, port } => {
            let mut cfg = config::load_config()?;
            let mut profile = Profile::new(host);
            if let Some(port) = port {
                profile.port = port;
            }

            // Validate before anything is written.
            intellicenter_config::profile_to_controller_config(&profile, &cfg.defaults)?;

            if cfg.profiles.is_empty() || cfg.default_profile.is_none() {
                cfg.default_profile = Some(name.clone());
            }
            cfg.profiles.insert(name.clone(), profile);
            config::save_config(&cfg)?;

            if !global.quiet {
                eprintln!("✓ Profile '{name}' written to {}", config::config_path().display());
                eprintln!("  Test it: intellicenter --profile {name} info");
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                "config".into()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg
                .profiles
                .entry(profile_name.clone())
                .or_insert_with(|| Profile::new(""));
            set_key(profile, &key, &value)?;

            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");

            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: intellicenter config init --host <ip>");
            } else {
                let lines: Vec<String> = cfg
                    .profile_names()
                    .into_iter()
                    .map(|name| {
                        let marker = if name == default { " *" } else { "" };
                        format!("{name}{marker}")
                    })
                    .collect();
                output::print_output(&lines.join("\n"), global.quiet);
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;

            if !cfg.profiles.contains_key(&name) {
                let available = cfg.profile_names().join(", ");
                return Err(CliError::ProfileNotFound {
                    name,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available
                    },
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_key_accepts_dashed_names() {
        let mut profile = Profile::new("pool.local");
        set_key(&mut profile, "idle-timeout", "120").unwrap();
        set_key(&mut profile, "max_retries", "5").unwrap();
        set_key(&mut profile, "port", "7000").unwrap();
        assert_eq!(profile.idle_timeout, Some(120));
        assert_eq!(profile.max_retries, Some(5));
        assert_eq!(profile.port, 7000);
    }

    #[test]
    fn set_key_rejects_unknown_and_malformed() {
        let mut profile = Profile::new("pool.local");
        assert!(matches!(
            set_key(&mut profile, "api_key", "x"),
            Err(CliError::Validation { .. })
        ));
        assert!(set_key(&mut profile, "timeout", "soon").is_err());
        assert!(set_key(&mut profile, "port", "70000").is_err());
    }

    #[test]
    fn formatted_config_lists_profiles_in_order() {
        let mut cfg = Config::default();
        let mut home = Profile::new("192.168.1.50");
        home.idle_timeout = Some(300);
        cfg.profiles.insert("home".into(), home);
        cfg.profiles.insert("cabin".into(), Profile::new("10.0.0.9"));

        let text = format_config(&cfg);
        let cabin = text.find("[profiles.cabin]").unwrap();
        let home = text.find("[profiles.home]").unwrap();
        assert!(cabin < home);
        assert!(text.contains("idle_timeout = 300"));
        assert!(text.contains("port = 6681"));
    }
}
