//! Versioned WebAssembly plugin bundles, fetched once, cached on disk, and
//! instantiated behind host-side capability traits.
//!
//! A long-running host asks for "type `calc` of package `demo.calc` version `1.2`"
//! and gets back a `Box<dyn Calculator>`. Everything between the request and the
//! proxy is cached, so the same bundle is downloaded and unpacked once per machine
//! and the same plugin class is loaded once per process, regardless of how many
//! threads or processes ask at the same time.
//!
//! # Core Concepts
//!
//! - [`PackageKey`] / [`InstantiatorKey`]: validated identities of a bundle version
//! 	and of a plugin type inside it.
//!
//! - [`BundleStore`]: where bundle archives come from. [`DirectoryBundleStore`] reads
//! 	`<id>.<version>.zip` files from a list of directories; [`RetryingStore`] retries
//! 	transient failures of any store.
//!
//! - [`PackageCache`]: unpacks each bundle version exactly once under a shared root,
//! 	coordinating threads and processes through lock files next to the package
//! 	directories.
//!
//! - [`IsolationContext`]: a wasmtime store holding the instances of one package
//! 	version. Contexts share nothing and can be unloaded.
//!
//! - [`capability!`]: declares a host trait together with a proxy that forwards
//! 	every call to a plugin resource through a [`RemoteObject`] handle.
//!
//! - [`InstantiatorFactory`]: resolves an [`InstantiatorKey`] into a [`FactorySet`],
//! 	one [`CachedFactory`] per constructor signature, and caches it for good.
//!
//! # Plugins
//!
//! A plugin class is a component model resource. Its constructors are the
//! `[constructor]` and `[static]` functions declared in the bundle manifest (see
//! [`manifest`]), and it implements a capability if it exports a `[method]` for
//! every member of the capability trait, with snake case names turned kebab case.
//!
//! # Example
//!
//! ```no_run
//! use wasm_hotload::{
//! 	DirectoryBundleStore, Engine, InstantiatorFactory, InstantiatorKey,
//! 	IsolationManager, IntoVal, PackageCache,
//! };
//!
//! wasm_hotload::capability! {
//! 	pub trait Calculator {
//! 		fn calculate( &self, a: i32, b: i32 ) -> i32 ;
//! 	}
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let packages = PackageCache::new( "/var/cache/plugins", DirectoryBundleStore::new([ "/srv/bundles" ]));
//! let factory = InstantiatorFactory::<dyn Calculator>::new( packages, IsolationManager::new( Engine::default() ));
//!
//! let key = InstantiatorKey::new( "demo.calc", "1.2", "calc" )?;
//! let calculator = factory.instantiate( &key, &[ 10_i32.into_val() ])?;
//! assert_eq!( calculator.calculate( 1, 2 )?, 13 );
//! # Ok(())
//! # }
//! ```

mod archive ;
mod bundle_store ;
mod config ;
mod forwarding ;
mod instantiator ;
mod isolation ;
pub mod manifest ;
mod materializer ;
mod package_cache ;
mod package_key ;
mod proxy ;
mod remote_table ;
mod retry ;
mod signature ;
mod value ;

#[doc( no_inline )]
pub use wasmtime::Engine ;
#[doc( no_inline )]
pub use wasmtime::component::{ Linker, Val };

pub use archive::{ ArchiveError, ArchiveFormat, ZipFormat };
pub use bundle_store::{ BundleError, BundleStore, DirectoryBundleStore };
pub use config::{ ConfigError, HostConfig };
pub use forwarding::{ CachedFactory, FactorySet };
pub use instantiator::{ ErrorKind, InstantiatorError, InstantiatorFactory, ResolveError };
pub use isolation::{
	BoundConstructor, ContextStatus, HostState, IsolationContext, IsolationManager,
	LoadError, LoadReport, LoadedClass, Rejection,
};
pub use manifest::{ Manifest, ManifestError };
pub use materializer::{ ComponentMaterializer, Materializer };
pub use package_cache::{ AcquireError, AcquireOptions, LockToken, PackageCache, lock_path };
pub use package_key::{ InstantiatorKey, KeyError, PackageKey };
pub use proxy::{ Capability, RemoteObject };
pub use remote_table::{ CallResult, Handle, InvocationError, RemoteTable };
pub use retry::{ RetryPolicy, RetryingStore };
pub use signature::{ ConstructorSignature, accepts, kind_name, type_name, type_name_of };
pub use value::{ FromVal, IntoVal };
