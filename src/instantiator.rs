//! The public entry point: cached, lazily resolved factories per instantiator key.
//!
//! The first caller asking for an [`InstantiatorKey`] resolves it: acquires the
//! package, loads it into a fresh isolation context and binds every constructor
//! of the requested class. The resulting [`FactorySet`] is published with a single
//! insert and stays in the cache for the lifetime of the factory. Later callers,
//! and callers that raced the first one, get the same set.
//!
//! Only callers of the same key ever wait on each other, and only while that key
//! is being resolved.

use std::sync::{ Arc, Mutex, PoisonError };
use dashmap::DashMap ;
use itertools::Itertools ;
use thiserror::Error ;
use tracing::{ debug, info };
use wasmtime::Engine ;
use wasmtime::component::Val ;

use crate::{ ConstructorSignature, InstantiatorKey, PackageKey };
use crate::bundle_store::DirectoryBundleStore ;
use crate::config::HostConfig ;
use crate::forwarding::FactorySet ;
use crate::isolation::{ IsolationManager, LoadError, Rejection };
use crate::manifest::{ Manifest, ManifestError };
use crate::package_cache::{ AcquireError, PackageCache };
use crate::proxy::Capability ;
use crate::remote_table::InvocationError ;
use crate::retry::RetryingStore ;



/// Why a key could not be resolved. Never retried: the failure is deterministic.
#[derive( Debug, Error )]
pub enum ResolveError {
	#[error( "{0}" )] Acquire( #[from] AcquireError ),
	#[error( "{0}" )] Manifest( #[from] ManifestError ),
	#[error( "{0}" )] Load( #[from] LoadError ),
	/// The package declares no such class, or does not export it.
	#[error( "Type \"{type_name}\" not found in {package}" )]
	TypeNotFound { package: PackageKey, type_name: String },
	#[error( "Type \"{0}\" has no public constructor" )] NoPublicConstructor( String ),
	#[error( "Type \"{type_name}\" does not implement the capability, missing {}", .missing.join( ", " ))]
	CapabilityNotImplemented { type_name: String, missing: Vec<String> },
	/// A constructor export takes other parameters than the manifest declares.
	#[error( "Type \"{type_name}\" constructor \"{export}\" takes {exported}, the manifest declares {declared}" )]
	ConstructorMismatch { type_name: String, export: String, declared: ConstructorSignature, exported: ConstructorSignature },
}

impl ResolveError {
	pub fn is_transient( &self ) -> bool {
		matches!( self, Self::Acquire( source ) if source.is_transient() )
	}
}

/// Errors returned by [`InstantiatorFactory`].
#[derive( Debug, Error )]
pub enum InstantiatorError {
	/// The plugin could not be loaded.
	#[error( "Failed to create instantiator {key}: {source}" )]
	Creation { key: InstantiatorKey, #[source] source: ResolveError },
	/// The default class of a package could not be determined.
	#[error( "Failed to read the default class of {package}: {source}" )]
	DefaultClass { package: PackageKey, #[source] source: ResolveError },
	/// The plugin was loaded but has no constructor taking the given arguments.
	#[error( "No constructor of {key} matches {signature}, available: {}", .available.iter().join( ", " ))]
	ConstructorSignatureNotFound { key: InstantiatorKey, signature: ConstructorSignature, available: Vec<ConstructorSignature> },
	/// The plugin was loaded but the call into it failed.
	#[error( "Invocation of {key} failed: {source}" )]
	Invocation { key: InstantiatorKey, #[source] source: InvocationError },
}

/// Coarse classification of [`InstantiatorError`].
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ErrorKind {
	/// Loading the plugin failed for good.
	Creation,
	/// The plugin is fine, the call was not.
	Invocation,
	/// A backend failure that may go away.
	Transient,
}

impl InstantiatorError {
	pub fn kind( &self ) -> ErrorKind {
		match self {
			Self::Creation { source, .. } | Self::DefaultClass { source, .. } if source.is_transient() => ErrorKind::Transient,
			Self::Creation { .. } | Self::DefaultClass { .. } => ErrorKind::Creation,
			Self::ConstructorSignatureNotFound { .. } | Self::Invocation { .. } => ErrorKind::Invocation,
		}
	}
}

/// Resolves and caches factories of plugin classes implementing the capability `T`.
///
/// ```no_run
/// use wasm_hotload::{ Engine, HostConfig, InstantiatorFactory, InstantiatorKey };
///
/// wasm_hotload::capability! {
/// 	pub trait Greeter { fn greet( &self, name: String ) -> String ; }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = HostConfig::from_file( "host.toml" )?;
/// let factory = InstantiatorFactory::<dyn Greeter>::from_config( Engine::default(), &config );
/// let key = InstantiatorKey::new( "demo.greeter", "1.0", "greeter" )?;
/// let greeter = factory.instantiate( &key, &[] )?;
/// println!( "{}", greeter.greet( "world".to_string() )? );
/// # Ok(()) }
/// ```
pub struct InstantiatorFactory<T: ?Sized> {
	packages: PackageCache,
	isolation: IsolationManager,
	cache: DashMap<InstantiatorKey, Arc<FactorySet<T>>>,
	locks: DashMap<InstantiatorKey, Arc<Mutex<()>>>,
	defaults: DashMap<PackageKey, InstantiatorKey>,
}

impl<T: ?Sized> std::fmt::Debug for InstantiatorFactory<T> {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "InstantiatorFactory" )
			.field( "packages", &self.packages )
			.field( "resolved", &self.cache.len() )
			.finish_non_exhaustive()
	}
}

impl<T: ?Sized + Capability> InstantiatorFactory<T> {

	pub fn new( packages: PackageCache, isolation: IsolationManager ) -> Self {
		Self { packages, isolation, cache: DashMap::new(), locks: DashMap::new(), defaults: DashMap::new() }
	}

	/// Wires a [`RetryingStore`] over a [`DirectoryBundleStore`] as configured.
	pub fn from_config( engine: Engine, config: &HostConfig ) -> Self {
		let store = RetryingStore::new( DirectoryBundleStore::new( config.repositories.clone() ), config.retry_policy() );
		let packages = PackageCache::new( config.package_root.clone(), store ).with_options( config.acquire_options() );
		Self::new( packages, IsolationManager::new( engine ))
	}

	#[inline] pub fn packages( &self ) -> &PackageCache { &self.packages }
	#[inline] pub fn isolation( &self ) -> &IsolationManager { &self.isolation }

	/// Number of resolved keys.
	pub fn len( &self ) -> usize { self.cache.len() }
	pub fn is_empty( &self ) -> bool { self.cache.is_empty() }

	/// The factory set of `key` if it has been resolved already.
	pub fn cached( &self, key: &InstantiatorKey ) -> Option<Arc<FactorySet<T>>> {
		self.cache.get( key ).map(| entry | Arc::clone( entry.value() ))
	}

	/// Creates an instance of the class `key` names, using the constructor
	/// [`FactorySet::select`] picks for `args`.
	///
	/// # Errors
	/// - [`InstantiatorError::Creation`] if the key cannot be resolved.
	/// - [`InstantiatorError::ConstructorSignatureNotFound`] if no constructor matches.
	/// - [`InstantiatorError::Invocation`] if the constructor fails.
	pub fn instantiate( &self, key: &InstantiatorKey, args: &[Val] ) -> Result<Box<T>, InstantiatorError> {
		let factories = self.resolve( key )?;
		let Some( factory ) = factories.select( args ) else {
			return Err( InstantiatorError::ConstructorSignatureNotFound {
				key: key.clone(),
				signature: ConstructorSignature::of( args ),
				available: factories.signatures(),
			})
		};
		factory.invoke( args ).map_err(| source | InstantiatorError::Invocation { key: key.clone(), source })
	}

	/// Instantiates the default class named by the manifest of `package`.
	///
	/// # Errors
	/// [`InstantiatorError::DefaultClass`] if the package or its manifest cannot be
	/// read, otherwise as [`instantiate`]( Self::instantiate ).
	pub fn instantiate_default( &self, package: &PackageKey, args: &[Val] ) -> Result<Box<T>, InstantiatorError> {
		let key = self.default_key( package )
			.map_err(| source | InstantiatorError::DefaultClass { package: package.clone(), source })?;
		self.instantiate( &key, args )
	}

	/// Key of the default class of `package`. The manifest is read once per package.
	///
	/// # Errors
	/// Any [`ResolveError`] raised acquiring the package or reading its manifest.
	pub fn default_key( &self, package: &PackageKey ) -> Result<InstantiatorKey, ResolveError> {
		if let Some( key ) = self.defaults.get( package ) { return Ok( key.value().clone() ) }
		let path = self.packages.acquire( package )?;
		let manifest = Manifest::load( &path )?;
		let key = InstantiatorKey::for_package( package.clone(), manifest.default_class() )
			.map_err(| _ | ResolveError::TypeNotFound { package: package.clone(), type_name: manifest.default_class().to_string() })?;
		debug!( package = %package, class = key.type_name(), "default class read" );
		Ok( self.defaults.entry( package.clone() ).or_insert( key ).value().clone() )
	}

	/// Returns the factory set of `key`, resolving it first if needed.
	///
	/// Concurrent callers of the same key observe the same `Arc`.
	///
	/// # Errors
	/// [`InstantiatorError::Creation`] wrapping the first failure of the pipeline.
	/// Nothing is cached on failure, so a later call tries again.
	pub fn resolve( &self, key: &InstantiatorKey ) -> Result<Arc<FactorySet<T>>, InstantiatorError> {

		if let Some( factories ) = self.cached( key ) {
			debug!( key = %key, "instantiator cache hit" );
			return Ok( factories )
		}

		let lock = Arc::clone( self.locks.entry( key.clone() ).or_default().value() );
		let _guard = lock.lock().unwrap_or_else( PoisonError::into_inner );

		if let Some( factories ) = self.cached( key ) {
			debug!( key = %key, "instantiator resolved by another caller" );
			return Ok( factories )
		}

		let factories = self.build( key )
			.map_err(| source | InstantiatorError::Creation { key: key.clone(), source })?;
		let published = Arc::clone( self.cache.entry( key.clone() ).or_insert( Arc::new( factories )).value() );
		info!( key = %key, constructors = published.signatures().len(), "instantiator resolved" );
		Ok( published )

	}

	fn build( &self, key: &InstantiatorKey ) -> Result<FactorySet<T>, ResolveError> {

		let path = self.packages.acquire( key.package() )?;
		let manifest = Manifest::load( &path )?;
		let type_not_found = || ResolveError::TypeNotFound { package: key.package().clone(), type_name: key.type_name().to_string() };
		if manifest.class( key.type_name() ).is_none() { return Err( type_not_found() ) }

		let ( context, mut report ) = self.isolation.load( key.package(), &path, &manifest, T::MEMBERS )?;
		let position = report.usable.iter().position(| class | class.name() == key.type_name() );
		let Some( class ) = position.map(| index | report.usable.swap_remove( index )) else {
			context.unload();
			return Err( match report.rejection( key.type_name() ) {
				Some( Rejection::CapabilityNotImplemented( missing )) => ResolveError::CapabilityNotImplemented {
					type_name: key.type_name().to_string(),
					missing: missing.clone(),
				},
				Some( Rejection::NoPublicConstructor ) => ResolveError::NoPublicConstructor( key.type_name().to_string() ),
				Some( Rejection::ConstructorMismatch { export, declared, exported }) => ResolveError::ConstructorMismatch {
					type_name: key.type_name().to_string(),
					export: export.clone(),
					declared: declared.clone(),
					exported: exported.clone(),
				},
				Some( Rejection::MissingInterface( _ )) | None => type_not_found(),
			})
		};

		FactorySet::build( key.clone(), Arc::clone( &context ), class ).ok_or_else(|| {
			context.unload();
			ResolveError::NoPublicConstructor( key.type_name().to_string() )
		})

	}

}
