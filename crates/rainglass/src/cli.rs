use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "rainglass",
    author,
    version,
    about = "Rain-on-glass editor backdrop",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file; defaults to `rainglass.toml` in the config directory.
    #[arg(long, global = true, value_name = "PATH", env = "RAINGLASS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Initial window size in logical pixels (e.g. `1280x752`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1280x752")]
    pub size: (u32, u32),

    /// Seed for the droplet field and lightning rolls; random when omitted.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Background image refracted by the back water layer.
    #[arg(long, global = true, value_name = "PATH")]
    pub background: Option<PathBuf>,

    /// Foreground image refracted by the front water layer.
    #[arg(long, global = true, value_name = "PATH")]
    pub foreground: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective configuration and exit.
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    /// Emit JSON instead of TOML.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(spec: &str) -> Result<(u32, u32), String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x752".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{trimmed}'"))?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes_with_either_separator() {
        assert_eq!(parse_size("1280x752"), Ok((1280, 752)));
        assert_eq!(parse_size(" 800 X 600 "), Ok((800, 600)));
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(parse_size("0x600").is_err());
        assert!(parse_size("800").is_err());
        assert!(parse_size("wide x tall").is_err());
    }

    #[test]
    fn config_subcommand_sees_global_flags() {
        let cli = Cli::try_parse_from(["rainglass", "config", "--json", "--config", "glass.toml"])
            .expect("parses");
        assert!(matches!(cli.command, Some(Command::Config(ConfigArgs { json: true }))));
        assert_eq!(cli.run.config, Some(PathBuf::from("glass.toml")));
        assert_eq!(cli.run.size, (1280, 752));
    }
}
