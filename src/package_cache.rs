//! Exactly-once fetch and unpack of bundles shared between threads and processes.
//!
//! Every acquirer of `<root>/<id>.<version>` races for `<root>/<id>.<version>.lock`,
//! created with create-new semantics. The winner checks again whether the package
//! directory appeared in the meantime, and if not fetches the archive, unpacks it into
//! a staging directory and renames that into place. Losers poll until the directory
//! exists or the deadline passes. No in-memory lock is involved, so independent
//! processes sharing a package root cooperate the same way threads do.
//!
//! A lock file left behind by a process that died while holding it is never broken:
//! waiters give up with [`AcquireError::Timeout`] once the deadline passes.

use std::fs::{ File, OpenOptions };
use std::path::{ Path, PathBuf };
use std::sync::Arc ;
use std::time::{ Duration, Instant };
use thiserror::Error ;
use tracing::{ debug, info, trace, warn };

use crate::{ PackageKey, KeyError };
use crate::archive::{ ArchiveError, ArchiveFormat, ZipFormat };
use crate::bundle_store::{ BundleError, BundleStore };



/// Errors returned by [`PackageCache::acquire`].
#[derive( Debug, Error )]
pub enum AcquireError {
	/// No source has the requested package.
	#[error( "Package {0} not found" )] PackageNotFound( String ),
	/// The package directory did not appear before the deadline.
	#[error( "Package {package} was not acquired within {waited:?}{}", last_error_suffix( .last_error ))]
	Timeout { package: String, waited: Duration, last_error: Option<String> },
	/// The bundle store failed.
	#[error( "Bundle store error for {package}: {source}" )]
	Bundle { package: String, #[source] source: BundleError },
	/// The archive could not be unpacked.
	#[error( "Failed to extract {package}: {source}" )]
	Extraction { package: String, #[source] source: ArchiveError },
	#[error( "Invalid package key: {0}" )] Key( #[from] KeyError ),
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
}

fn last_error_suffix( last_error: &Option<String> ) -> String {
	last_error.as_ref().map(| err | format!( " (last error: {})", err )).unwrap_or_default()
}

impl AcquireError {
	/// Whether the failure came from a transient backend condition.
	pub fn is_transient( &self ) -> bool {
		matches!( self, Self::Bundle { source, .. } if source.is_transient() )
	}
}

/// Policy constants of the acquisition loop.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct AcquireOptions {
	/// Wall-clock bound on waiting for the package directory to appear.
	pub deadline: Duration,
	/// Sleep between two attempts at taking the lock.
	pub poll_interval: Duration,
}

impl Default for AcquireOptions {
	fn default() -> Self {
		Self { deadline: Duration::from_secs( 30 ), poll_interval: Duration::from_millis( 50 ) }
	}
}

/// Filesystem mutex marker: a zero-byte file that exists while held.
///
/// Removed when the token is dropped, including during a panic unwind.
#[derive( Debug )]
pub struct LockToken {
	path: PathBuf,
	_file: File,
}

impl LockToken {

	/// Takes the lock at `path` if nobody holds it.
	///
	/// Any failure to create the file is read as "somebody else holds it".
	pub fn try_acquire( path: &Path ) -> Option<Self> {
		match OpenOptions::new().write( true ).create_new( true ).open( path ) {
			Ok( file ) => Some( Self { path: path.to_path_buf(), _file: file }),
			Err( err ) => {
				trace!( lock = %path.display(), error = %err, "lock file not acquired" );
				None
			},
		}
	}

	#[inline] pub fn path( &self ) -> &Path { &self.path }

}

impl Drop for LockToken {
	fn drop( &mut self ) {
		if let Err( err ) = std::fs::remove_file( &self.path ) {
			warn!( lock = %self.path.display(), error = %err, "failed to remove lock file" );
		}
	}
}

/// Path of the lock guarding `destination`: the same path with `.lock` appended.
pub fn lock_path( destination: &Path ) -> PathBuf {
	let mut path = destination.as_os_str().to_owned();
	path.push( ".lock" );
	PathBuf::from( path )
}

/// Coordinates fetching and unpacking of bundles below one root directory.
#[derive( Clone )]
pub struct PackageCache {
	root: PathBuf,
	store: Arc<dyn BundleStore>,
	format: Arc<dyn ArchiveFormat>,
	options: AcquireOptions,
}

impl std::fmt::Debug for PackageCache {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "PackageCache" )
			.field( "root", &self.root )
			.field( "options", &self.options )
			.finish_non_exhaustive()
	}
}

impl PackageCache {

	/// A cache unpacking zip archives with the default policy.
	pub fn new( root: impl Into<PathBuf>, store: impl BundleStore + 'static ) -> Self {
		Self {
			root: root.into(),
			store: Arc::new( store ),
			format: Arc::new( ZipFormat ),
			options: AcquireOptions::default(),
		}
	}

	pub fn with_options( mut self, options: AcquireOptions ) -> Self {
		self.options = options ;
		self
	}

	pub fn with_archive_format( mut self, format: impl ArchiveFormat + 'static ) -> Self {
		self.format = Arc::new( format );
		self
	}

	#[inline] pub fn root( &self ) -> &Path { &self.root }
	#[inline] pub fn options( &self ) -> AcquireOptions { self.options }
	#[inline] pub fn store( &self ) -> &dyn BundleStore { self.store.as_ref() }

	/// Directory `key` is (or will be) unpacked into.
	pub fn package_path( &self, key: &PackageKey ) -> PathBuf {
		self.root.join( key.directory_name() )
	}

	/// Returns the local directory of `key`, fetching and unpacking it first if needed.
	///
	/// # Errors
	/// - [`AcquireError::PackageNotFound`] if the store does not have the package.
	/// - [`AcquireError::Bundle`] if the store failed otherwise.
	/// - [`AcquireError::Timeout`] if the directory did not appear before the deadline,
	///   either because the lock stayed taken or because extraction kept failing.
	pub fn acquire( &self, key: &PackageKey ) -> Result<PathBuf, AcquireError> {

		let destination = self.package_path( key );
		if destination.is_dir() {
			trace!( package = %key, "package already unpacked" );
			return Ok( destination )
		}

		std::fs::create_dir_all( &self.root )?;
		let lock = lock_path( &destination );
		let started = Instant::now();
		let mut last_error: Option<String> = None ;

		while !destination.is_dir() && started.elapsed() < self.options.deadline {
			let Some( token ) = LockToken::try_acquire( &lock ) else {
				debug!( package = %key, "package lock held elsewhere, waiting" );
				std::thread::sleep( self.options.poll_interval );
				continue
			};
			if destination.is_dir() { break }
			match self.populate( key, &destination ) {
				Ok(()) => break,
				Err( err @ ( AcquireError::PackageNotFound( _ ) | AcquireError::Bundle { .. } )) => return Err( err ),
				Err( err ) => {
					warn!( package = %key, error = %err, "package extraction failed, retrying" );
					last_error = Some( err.to_string() );
					drop( token );
					std::thread::sleep( self.options.poll_interval );
				},
			}
		}

		match destination.is_dir() {
			true => Ok( destination ),
			false => Err( AcquireError::Timeout { package: key.to_string(), waited: started.elapsed(), last_error }),
		}

	}

	/// Acquires the highest version of `package_id` the store knows about.
	///
	/// # Errors
	/// [`AcquireError::PackageNotFound`] if the store reports no version, otherwise
	/// any error of [`acquire`]( Self::acquire ).
	pub fn acquire_latest( &self, package_id: &str ) -> Result<( PackageKey, PathBuf ), AcquireError> {
		let version = self.store.latest_version( package_id )
			.map_err(| source | match source {
				BundleError::NotFound( _ ) => AcquireError::PackageNotFound( package_id.to_string() ),
				source => AcquireError::Bundle { package: package_id.to_string(), source },
			})?
			.ok_or_else(|| AcquireError::PackageNotFound( package_id.to_string() ))?;
		let key = PackageKey::new( package_id, &version )?;
		let path = self.acquire( &key )?;
		Ok(( key, path ))
	}

	/// Fetches and unpacks `key` into `destination`. Called with the lock held.
	///
	/// Nothing is left behind on failure: the scratch directories clean themselves
	/// up and a partially renamed destination is removed.
	fn populate( &self, key: &PackageKey, destination: &Path ) -> Result<(), AcquireError> {

		let prefix = format!( ".{}.", key.directory_name() );
		let download = tempfile::Builder::new().prefix( &prefix ).suffix( ".download" ).tempdir_in( &self.root )?;
		let staging = tempfile::Builder::new().prefix( &prefix ).suffix( ".staging" ).tempdir_in( &self.root )?;

		info!( package = %key, "fetching bundle" );
		let archive = self.store.fetch_bundle( key, download.path() )
			.map_err(| source | match source {
				BundleError::NotFound( _ ) => AcquireError::PackageNotFound( key.to_string() ),
				source => AcquireError::Bundle { package: key.to_string(), source },
			})?;

		info!( package = %key, archive = %archive.display(), "extracting bundle" );
		self.format.extract( &archive, staging.path() )
			.map_err(| source | AcquireError::Extraction { package: key.to_string(), source })?;

		if let Err( err ) = std::fs::rename( staging.path(), destination ) {
			if destination.exists() { let _ = std::fs::remove_dir_all( destination ); }
			return Err( err.into() )
		}
		Ok(())

	}

}
