//! Config subcommand handlers.

use std::io::BufRead;

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(REDACTED.into());
        }
    }
    cfg
}

fn as_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

#[derive(Debug, Serialize)]
struct ProfileView {
    name: String,
    host: String,
    port: u16,
    https: bool,
    default: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&multitek_config::load_config()?);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => as_toml(&cfg),
                ref format => output::render_single(format, &cfg, as_toml, as_toml),
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = multitek_config::load_config()?;
            let active = config::active_profile_name(global, &cfg);
            let views: Vec<ProfileView> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileView {
                    name: name.clone(),
                    host: p.host.clone(),
                    port: p.port,
                    https: p.https,
                    default: *name == active,
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &views,
                |v| ProfileRow {
                    marker: if v.default { "*" } else { "" },
                    name: v.name.clone(),
                    address: format!(
                        "{}://{}:{}",
                        if v.https { "https" } else { "http" },
                        v.host,
                        v.port
                    ),
                },
                |v| v.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = multitek_config::load_config()?;
            cfg.profile(&name)?;
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetKey => {
            let cfg = multitek_config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);

            let mut key = String::new();
            std::io::stdin().lock().read_line(&mut key)?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "expected the API key on stdin".into(),
                });
            }

            let entry = keyring::Entry::new(
                multitek_config::KEYRING_SERVICE,
                &config::keyring_user(&profile_name),
            )?;
            entry.set_password(key)?;
            if !global.quiet {
                eprintln!("API key for profile '{profile_name}' stored in system keyring");
            }
            Ok(())
        }
    }
}
