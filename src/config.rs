use std::{net::IpAddr, path::PathBuf, str::FromStr};

use tracing::level_filters::LevelFilter;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
	#[error("{name} must be {expected}, got {value:?}")]
	Invalid {
		name: &'static str,
		expected: &'static str,
		value: String,
	},
}

/// Service configuration, read once at startup.
///
/// | variable | default |
/// |---|---|
/// | `HOST` | `127.0.0.1` |
/// | `PORT` | `3000` |
/// | `POSTS_FILE` | `blogs.json` |
/// | `CONTENT_ROOT` | `.` |
/// | `LOG_LEVEL` | `info` |
/// | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset, which disables export |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub host: IpAddr,
	pub port: u16,
	pub posts_file: PathBuf,
	pub content_root: PathBuf,
	pub log_level: LevelFilter,
	pub otlp_endpoint: Option<String>,
}

impl Config {
	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

		Ok(Self {
			host: parse(var("HOST"), "HOST", "an IP address", "127.0.0.1")?,
			port: parse(var("PORT"), "PORT", "a port number", "3000")?,
			posts_file: var("POSTS_FILE").map_or_else(|| "blogs.json".into(), PathBuf::from),
			content_root: var("CONTENT_ROOT").map_or_else(|| ".".into(), PathBuf::from),
			log_level: parse(
				var("LOG_LEVEL"),
				"LOG_LEVEL",
				"one of off, error, warn, info, debug or trace",
				"info",
			)?,
			otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
		})
	}
}

fn parse<T: FromStr>(
	value: Option<String>,
	name: &'static str,
	expected: &'static str,
	default: &str,
) -> Result<T, ConfigError> {
	let value = value.unwrap_or_else(|| default.to_owned());

	value.trim().parse().map_err(|_| ConfigError::Invalid {
		name,
		expected,
		value,
	})
}
