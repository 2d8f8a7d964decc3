//! Command-line arguments for the server binary.

use crate::config::ServerConfig;
use crate::ServerError;
use clap::Parser;
use std::path::PathBuf;

/// Reel server - keeps rendered videos around just long enough to fetch them.
#[derive(Debug, Parser)]
#[command(name = "reel-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "REEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to bind, overriding the configuration file
    #[arg(long)]
    pub bind_port: Option<u16>,
}

impl Cli {
    /// Load the configuration these arguments describe
    ///
    /// Without `--config` the built-in test configuration is used.
    pub fn load_config(&self) -> Result<ServerConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => {
                eprintln!("Warning: No config file specified, using default test configuration");
                ServerConfig::default_test_config()
            }
        };

        if let Some(port) = self.bind_port {
            config.bind_port = port;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_and_port() {
        let cli = Cli::try_parse_from(["reel-server", "--config", "reel.toml", "--bind-port", "9001"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("reel.toml")));
        assert_eq!(cli.bind_port, Some(9001));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["reel-server", "--bind-port", "http"]).is_err());
    }

    #[test]
    fn test_help_is_generated() {
        let err = Cli::try_parse_from(["reel-server", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(err.to_string().contains("--bind-port"));
    }

    #[test]
    fn test_port_override_applies_to_file_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.toml");
        std::fs::write(
            &path,
            "bind_address = \"127.0.0.1\"\nbind_port = 3000\n[renderer]\nprogram = \"fx\"\n",
        )
        .unwrap();

        let cli = Cli {
            config: Some(path.clone()),
            bind_port: Some(4000),
        };
        assert_eq!(cli.load_config().unwrap().bind_addr(), "127.0.0.1:4000");

        let cli = Cli {
            config: Some(path),
            bind_port: None,
        };
        assert_eq!(cli.load_config().unwrap().bind_port, 3000);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/reel.toml")),
            bind_port: None,
        };
        assert!(matches!(cli.load_config(), Err(ServerError::Config(_))));
    }
}
