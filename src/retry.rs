use std::path::{ Path, PathBuf };
use std::time::Duration ;
use tracing::warn ;

use crate::PackageKey ;
use crate::bundle_store::{ BundleError, BundleStore };



/// Bounded retry with a fixed backoff between attempts.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct RetryPolicy {
	/// Retries after the first attempt; `0` disables retrying.
	pub max_retries: u32,
	pub backoff: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_retries: 10, backoff: Duration::from_secs( 1 ) }
	}
}

impl RetryPolicy {

	pub fn none() -> Self { Self { max_retries: 0, backoff: Duration::ZERO } }

	/// Runs `operation` until it succeeds, fails with a non transient error,
	/// or the retries are used up.
	///
	/// # Errors
	/// The last error returned by `operation`.
	pub fn run<T>( &self, what: &str, mut operation: impl FnMut() -> Result<T, BundleError> ) -> Result<T, BundleError> {
		let mut attempt = 0 ;
		loop {
			match operation() {
				Err( err ) if err.is_transient() && attempt < self.max_retries => {
					attempt += 1 ;
					warn!( operation = what, attempt, max_retries = self.max_retries, error = %err, "transient bundle store error, retrying" );
					std::thread::sleep( self.backoff );
				},
				result => return result,
			}
		}
	}

}

/// Wraps a [`BundleStore`] whose backend reports transient failures
/// (deadlocks, dropped connections, throttling) and retries those.
#[derive( Debug, Clone )]
pub struct RetryingStore<S> {
	inner: S,
	policy: RetryPolicy,
}

impl<S: BundleStore> RetryingStore<S> {

	pub fn new( inner: S, policy: RetryPolicy ) -> Self { Self { inner, policy }}

	#[inline] pub fn inner( &self ) -> &S { &self.inner }
	#[inline] pub fn policy( &self ) -> RetryPolicy { self.policy }

}

impl<S: BundleStore> BundleStore for RetryingStore<S> {

	fn fetch_bundle( &self, key: &PackageKey, destination: &Path ) -> Result<PathBuf, BundleError> {
		self.policy.run( "fetch", || self.inner.fetch_bundle( key, destination ))
	}

	fn store_bundle( &self, key: &PackageKey, source: &Path ) -> Result<(), BundleError> {
		self.policy.run( "store", || self.inner.store_bundle( key, source ))
	}

	fn latest_version( &self, package_id: &str ) -> Result<Option<String>, BundleError> {
		self.policy.run( "latest-version", || self.inner.latest_version( package_id ))
	}

}
