//! Mosaic CLI
//!
//! Multi-domain static site generator.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for Mosaic.
#[derive(Parser)]
#[command(
    name = "mosaic",
    version,
    about = "A multi-domain static site generator"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "mosaic.toml")]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build every page of every domain
    Build {
        /// Output directory, overriding build.output_dir
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Remove the output directory first
        #[arg(long)]
        force: bool,
    },
    /// Re-render only the pages affected by changed files
    Rebuild {
        /// Changed source, component, layout, data or asset files
        #[arg(required = true)]
        files: Vec<std::path::PathBuf>,
    },
    /// Validate configuration and parse every source
    Check,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    mosaic::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build { output, force } => {
            mosaic::cmd::build::run(&cli.config, output.as_deref(), force)?;
        }
        Commands::Rebuild { files } => {
            mosaic::cmd::rebuild::run(&cli.config, &files)?;
        }
        Commands::Check => {
            mosaic::cmd::check::run(&cli.config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_build_command_parsing() {
        let args = ["mosaic", "build", "--output", "public", "--force"];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config, std::path::PathBuf::from("mosaic.toml"));
        assert_eq!(cli.verbose, 0);

        match cli.command {
            Commands::Build { output, force } => {
                assert_eq!(output, Some(std::path::PathBuf::from("public")));
                assert!(force);
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_build_defaults() {
        let cli = Cli::parse_from(["mosaic", "build"]);

        match cli.command {
            Commands::Build { output, force } => {
                assert!(output.is_none());
                assert!(!force);
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_rebuild_command_parsing() {
        let args = [
            "mosaic",
            "rebuild",
            "content/default/_components/card.mosaic",
            "data/posts.json",
        ];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Rebuild { files } => {
                assert_eq!(files.len(), 2);
                assert_eq!(files[1], std::path::PathBuf::from("data/posts.json"));
            }
            _ => panic!("Expected Rebuild command"),
        }
    }

    #[test]
    fn test_cli_rebuild_requires_files() {
        assert!(Cli::try_parse_from(["mosaic", "rebuild"]).is_err());
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let args = ["mosaic", "-vvv", "check"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_cli_custom_config_path() {
        let args = ["mosaic", "--config", "site/mosaic.toml", "check"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.config, std::path::PathBuf::from("site/mosaic.toml"));
    }
}
