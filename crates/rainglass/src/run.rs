use std::path::PathBuf;

use anyhow::{Context, Result};
use glassconfig::GlassConfig;
use renderer::{HostBindings, RuntimeConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{ConfigArgs, RunArgs};
use crate::droplets;
use crate::editor::ScratchEditor;
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let (config, source) = resolve_config(&args)?;
    let seed = args.seed.unwrap_or_else(rand::random);
    tracing::info!(
        config = %source,
        seed,
        width = args.size.0,
        height = args.size.1,
        "starting rainglass"
    );

    let runtime = RuntimeConfig {
        title: "rainglass".to_string(),
        initial_size: args.size,
        config,
        seed,
    };
    let host = HostBindings {
        editor: Box::new(ScratchEditor::new()),
        simulator: droplets::factory(seed),
    };
    renderer::run(runtime, host)
}

pub fn print_config(args: &RunArgs, command: &ConfigArgs) -> Result<()> {
    let (config, source) = resolve_config(args)?;
    tracing::debug!(config = %source, "printing effective configuration");
    let rendered = if command.json {
        serde_json::to_string_pretty(&config).context("failed to encode configuration as JSON")?
    } else {
        toml::to_string_pretty(&config).context("failed to encode configuration as TOML")?
    };
    println!("{rendered}");
    Ok(())
}

/// Where the effective configuration came from.
enum ConfigSource {
    Flag(PathBuf),
    Discovered(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Flag(path) | ConfigSource::Discovered(path) => {
                write!(f, "{}", path.display())
            }
            ConfigSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

fn resolve_config(args: &RunArgs) -> Result<(GlassConfig, ConfigSource)> {
    let (mut config, source) = match &args.config {
        Some(path) => (
            GlassConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            ConfigSource::Flag(path.clone()),
        ),
        None => {
            let paths = AppPaths::discover()?;
            let path = paths.config_file();
            if path.is_file() {
                (
                    GlassConfig::load(&path)
                        .with_context(|| format!("failed to load {}", path.display()))?,
                    ConfigSource::Discovered(path),
                )
            } else {
                tracing::debug!(
                    dir = %paths.config_dir().display(),
                    "no configuration file found; using defaults"
                );
                (GlassConfig::default(), ConfigSource::Defaults)
            }
        }
    };

    apply_overrides(&mut config, args);
    config
        .validate()
        .context("configuration is invalid after applying command-line overrides")?;
    Ok((config, source))
}

fn apply_overrides(config: &mut GlassConfig, args: &RunArgs) {
    if let Some(path) = &args.background {
        config.rain.background = Some(path.clone());
    }
    if let Some(path) = &args.foreground {
        config.rain.foreground = Some(path.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn flag_config_and_image_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("glass.toml");
        fs::write(
            &path,
            "version = 1\n[rain]\nbackground = \"bg.png\"\nforeground = \"fg.png\"\n",
        )
        .unwrap();

        let args = RunArgs {
            config: Some(path.clone()),
            foreground: Some(PathBuf::from("other.png")),
            ..RunArgs::default()
        };
        let (config, source) = resolve_config(&args).unwrap();
        assert!(matches!(source, ConfigSource::Flag(ref p) if *p == path));
        assert_eq!(config.rain.background, Some(PathBuf::from("bg.png")));
        assert_eq!(config.rain.foreground, Some(PathBuf::from("other.png")));
    }

    #[test]
    fn missing_flag_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = RunArgs {
            config: Some(dir.path().join("absent.toml")),
            ..RunArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }
}
