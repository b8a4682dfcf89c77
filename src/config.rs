//! Host configuration, read from TOML.
//!
//! ```toml
//! package_root = "/var/cache/plugins"
//! repositories = ["/srv/bundles", "/mnt/shared/bundles"]
//! acquire_timeout_ms = 30000
//! poll_interval_ms = 50
//! fetch_retries = 10
//! fetch_backoff_ms = 1000
//! ```
//!
//! Every field is optional.

use std::path::{ Path, PathBuf };
use std::time::Duration ;
use serde::Deserialize ;
use thiserror::Error ;

use crate::package_cache::AcquireOptions ;
use crate::retry::RetryPolicy ;



#[derive( Debug, Error )]
pub enum ConfigError {
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
	#[error( "TOML parse error: {0}" )] Parse( #[from] toml::de::Error ),
	#[error( "Invalid configuration: {0}" )] Invalid( String ),
}

#[derive( Debug, Clone, Deserialize, PartialEq, Eq )]
#[serde( default, deny_unknown_fields )]
pub struct HostConfig {
	/// Directory bundles are unpacked into.
	pub package_root: PathBuf,
	/// Bundle repositories, searched in order.
	pub repositories: Vec<PathBuf>,
	pub acquire_timeout_ms: u64,
	pub poll_interval_ms: u64,
	/// Retries of transient bundle store failures.
	pub fetch_retries: u32,
	pub fetch_backoff_ms: u64,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			package_root: std::env::temp_dir().join( "wasm-hotload" ),
			repositories: Vec::new(),
			acquire_timeout_ms: 30_000,
			poll_interval_ms: 50,
			fetch_retries: 10,
			fetch_backoff_ms: 1_000,
		}
	}
}

impl HostConfig {

	/// # Errors
	/// [`ConfigError::Io`] if the file cannot be read, otherwise as [`from_toml_str`]( Self::from_toml_str ).
	pub fn from_file( path: impl AsRef<Path> ) -> Result<Self, ConfigError> {
		Self::from_toml_str( &std::fs::read_to_string( path )? )
	}

	/// # Errors
	/// [`ConfigError::Parse`] on malformed TOML or unknown fields,
	/// [`ConfigError::Invalid`] if a value makes no sense.
	pub fn from_toml_str( source: &str ) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str( source )?;
		if config.poll_interval_ms == 0 { return Err( ConfigError::Invalid( "poll_interval_ms must be positive".to_string() )) }
		if config.poll_interval_ms > config.acquire_timeout_ms {
			return Err( ConfigError::Invalid( "poll_interval_ms exceeds acquire_timeout_ms".to_string() ))
		}
		Ok( config )
	}

	pub fn acquire_options( &self ) -> AcquireOptions {
		AcquireOptions {
			deadline: Duration::from_millis( self.acquire_timeout_ms ),
			poll_interval: Duration::from_millis( self.poll_interval_ms ),
		}
	}

	pub fn retry_policy( &self ) -> RetryPolicy {
		RetryPolicy { max_retries: self.fetch_retries, backoff: Duration::from_millis( self.fetch_backoff_ms ) }
	}

}
