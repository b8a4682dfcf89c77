//! Bundle transport.
//!
//! A [`BundleStore`] moves bundle archives between a repository and the local disk.
//! It knows nothing about locking or unpacking; the [`PackageCache`]( crate::PackageCache )
//! calls it at most once per successful acquisition.

use std::path::{ Path, PathBuf };
use thiserror::Error ;
use tracing::debug ;

use crate::PackageKey ;
use crate::package_key::{ VersionOrder, version_order };



/// Errors reported by a [`BundleStore`].
#[derive( Debug, Error )]
pub enum BundleError {
	/// No configured source has the requested bundle.
	#[error( "Bundle {0} not found" )] NotFound( String ),
	/// A backend failure that may succeed if retried.
	#[error( "Transient backend error: {0}" )] Transient( String ),
	/// A backend failure that will not go away by retrying.
	#[error( "Backend error: {0}" )] Backend( String ),
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
}

impl BundleError {
	/// Whether [`RetryingStore`]( crate::RetryingStore ) should try again.
	pub fn is_transient( &self ) -> bool { matches!( self, Self::Transient( _ )) }
}

/// Retrieves and persists bundle archives.
///
/// Implementations must be idempotent: fetching the same bundle twice into two
/// different directories is always allowed.
pub trait BundleStore: Send + Sync {

	/// Copies the archive of `key` into `destination` (an existing, empty directory)
	/// and returns the path of the archive file.
	///
	/// # Errors
	/// [`BundleError::NotFound`] if no source has the bundle, any other variant on failure.
	fn fetch_bundle( &self, key: &PackageKey, destination: &Path ) -> Result<PathBuf, BundleError> ;

	/// Persists the archive at `source` as the bundle `key`.
	///
	/// # Errors
	/// Any [`BundleError`] raised by the backend.
	fn store_bundle( &self, key: &PackageKey, source: &Path ) -> Result<(), BundleError> ;

	/// Highest version of `package_id` the store knows about, if it can tell.
	///
	/// # Errors
	/// Any [`BundleError`] raised by the backend.
	fn latest_version( &self, _package_id: &str ) -> Result<Option<String>, BundleError> { Ok( None ) }

}

impl<S: BundleStore + ?Sized> BundleStore for std::sync::Arc<S> {
	fn fetch_bundle( &self, key: &PackageKey, destination: &Path ) -> Result<PathBuf, BundleError> {
		( **self ).fetch_bundle( key, destination )
	}
	fn store_bundle( &self, key: &PackageKey, source: &Path ) -> Result<(), BundleError> {
		( **self ).store_bundle( key, source )
	}
	fn latest_version( &self, package_id: &str ) -> Result<Option<String>, BundleError> {
		( **self ).latest_version( package_id )
	}
}

/// A set of repository directories holding `<id>.<version>.zip` archives.
///
/// Repositories are searched in order; the first one holding the archive wins.
/// New bundles are stored into the first repository.
#[derive( Debug, Clone )]
pub struct DirectoryBundleStore {
	repositories: Vec<PathBuf>,
}

impl DirectoryBundleStore {

	pub const ARCHIVE_EXTENSION: &'static str = "zip" ;

	pub fn new( repositories: impl IntoIterator<Item = impl Into<PathBuf>> ) -> Self {
		Self { repositories: repositories.into_iter().map( Into::into ).collect() }
	}

	#[inline] pub fn repositories( &self ) -> &[PathBuf] { &self.repositories }

	fn archive_name( key: &PackageKey ) -> String {
		format!( "{}.{}", key.directory_name(), Self::ARCHIVE_EXTENSION )
	}

	fn versions_in( repository: &Path, package_id: &str ) -> std::io::Result<Vec<( VersionOrder, String )>> {
		if !repository.is_dir() { return Ok( Vec::with_capacity( 0 )) }
		let prefix = format!( "{}.", package_id );
		let suffix = format!( ".{}", Self::ARCHIVE_EXTENSION );
		Ok( std::fs::read_dir( repository )?
			.filter_map( Result::ok )
			.filter_map(| entry | entry.file_name().into_string().ok() )
			.filter_map(| name | name
				.strip_prefix( &prefix )
				.and_then(| rest | rest.strip_suffix( &suffix ))
				.and_then(| version | Some(( version_order( version )?, version.to_string() )))
			)
			.collect() )
	}

}

impl BundleStore for DirectoryBundleStore {

	fn fetch_bundle( &self, key: &PackageKey, destination: &Path ) -> Result<PathBuf, BundleError> {
		let archive_name = Self::archive_name( key );
		let source = self.repositories.iter()
			.map(| repository | repository.join( &archive_name ))
			.find(| candidate | candidate.is_file() )
			.ok_or_else(|| BundleError::NotFound( key.to_string() ))?;
		let target = destination.join( &archive_name );
		debug!( package = %key, source = %source.display(), "copying bundle archive" );
		std::fs::copy( &source, &target )?;
		Ok( target )
	}

	fn store_bundle( &self, key: &PackageKey, source: &Path ) -> Result<(), BundleError> {
		let repository = self.repositories.first()
			.ok_or_else(|| BundleError::Backend( "no repository configured".to_string() ))?;
		std::fs::create_dir_all( repository )?;
		std::fs::copy( source, repository.join( Self::archive_name( key )))?;
		Ok(())
	}

	fn latest_version( &self, package_id: &str ) -> Result<Option<String>, BundleError> {
		let mut latest: Option<( VersionOrder, String )> = None ;
		for repository in &self.repositories {
			for version in Self::versions_in( repository, package_id )? {
				if latest.as_ref().is_none_or(|( current, _ )| version.0 > *current ) { latest = Some( version ) }
			}
		}
		Ok( latest.map(|( _, version )| version ))
	}

}
