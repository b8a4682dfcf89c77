//! Isolation contexts.
//!
//! An [`IsolationContext`] is one wasmtime [`Store`] holding an instance of every
//! artifact of one package version. Stores share nothing but the [`Engine`], so two
//! versions of a package, or two packages declaring the same resource names, never
//! observe each other. Dropping the store through [`IsolationContext::unload`] is the
//! only way to give the package's memory back.
//!
//! All calls into a context are serialized by its lock.

use std::collections::{ HashMap, HashSet };
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex };
use itertools::Itertools ;
use thiserror::Error ;
use tracing::{ debug, error, info, warn };
use uuid::Uuid ;
use wasmtime::{ Engine, Store };
use wasmtime::component::{ Component, ComponentExportIndex, Instance, Linker, ResourceAny, ResourceTable, Type, Val };

use crate::{ ConstructorSignature, PackageKey };
use crate::manifest::{ ClassDeclaration, ClassPath, Manifest };
use crate::materializer::{ ComponentMaterializer, Materializer };
use crate::remote_table::{ Handle, InvocationError };



/// Data of every isolation context store.
///
/// Host functions added to the [`Linker`] given to [`IsolationManager::with_linker`]
/// can reach it through their store context.
#[derive( Default )]
pub struct HostState {
	resource_table: ResourceTable,
}

impl HostState {
	pub fn resource_table( &mut self ) -> &mut ResourceTable { &mut self.resource_table }
}

impl std::fmt::Debug for HostState {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "HostState" ).finish_non_exhaustive()
	}
}

/// Errors raised while loading a package into a fresh context.
#[derive( Debug, Error )]
pub enum LoadError {
	/// The manifest names an artifact that is not in the package.
	#[error( "Artifact \"{0}\" not found in package" )] ArtifactNotFound( String ),
	/// The package contains no artifact at all.
	#[error( "No artifacts found under {0}" )] NoArtifacts( PathBuf ),
	#[error( "Failed to compile artifact \"{artifact}\": {source}" )]
	Materialize { artifact: String, #[source] source: wasmtime::Error },
	#[error( "Failed to instantiate artifact \"{artifact}\": {source}" )]
	Instantiate { artifact: String, #[source] source: wasmtime::Error },
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
}

/// Why a declared class cannot be instantiated.
#[derive( Debug, Error, Clone, PartialEq, Eq )]
pub enum Rejection {
	/// The class lives in an interface the artifact does not export.
	#[error( "interface \"{0}\" is not exported" )] MissingInterface( String ),
	/// None of the declared constructors is exported.
	#[error( "no public constructor" )] NoPublicConstructor,
	/// Some members of the host capability are not exported.
	#[error( "capability not implemented, missing {}", .0.join( ", " ))] CapabilityNotImplemented( Vec<String> ),
	/// A declared constructor takes other parameters than the manifest says.
	#[error( "constructor \"{export}\" takes {exported}, declared {declared}" )]
	ConstructorMismatch { export: String, declared: ConstructorSignature, exported: ConstructorSignature },
}

/// An exported function of a class, found by index in whichever instance of its
/// artifact is live.
#[derive( Debug, Clone )]
pub(crate) struct ExportedFunc {
	artifact: usize,
	index: ComponentExportIndex,
	params: Vec<Type>,
	results: usize,
}

impl ExportedFunc {

	fn resolve(
		store: &mut Store<HostState>,
		( artifact, instance ): ( usize, Instance ),
		interface: Option<&ComponentExportIndex>,
		export: &str,
	) -> Option<Self> {
		let index = instance.get_export_index( &mut *store, interface, export )?;
		let func = instance.get_func( &mut *store, index )?;
		let ty = func.ty( &*store );
		let params = ty.params().map(|( _, ty )| ty ).collect();
		let results = ty.results().len();
		Some( Self { artifact, index, params, results })
	}

	/// Parameter types, the receiver of a method excluded.
	#[inline] pub(crate) fn params( &self ) -> &[Type] { &self.params }
	#[inline] pub(crate) fn results( &self ) -> usize { self.results }

	fn without_receiver( mut self ) -> Self {
		if !self.params.is_empty() { self.params.remove( 0 ); }
		self
	}

}

/// A constructor overload resolved against a live instance.
#[derive( Debug, Clone )]
pub struct BoundConstructor {
	export: String,
	signature: ConstructorSignature,
	func: ExportedFunc,
}

impl BoundConstructor {
	#[inline] pub fn export( &self ) -> &str { &self.export }
	/// Derived from the parameter types of the export.
	#[inline] pub fn signature( &self ) -> &ConstructorSignature { &self.signature }
	#[inline] pub(crate) fn func( &self ) -> &ExportedFunc { &self.func }
}

/// A class that can be instantiated and forwarded to behind the host capability.
#[derive( Debug, Clone )]
pub struct LoadedClass {
	name: String,
	path: ClassPath,
	artifact: String,
	constructors: Vec<BoundConstructor>,
	members: HashMap<String, ExportedFunc>,
}

impl LoadedClass {
	#[inline] pub fn name( &self ) -> &str { &self.name }
	#[inline] pub fn path( &self ) -> &ClassPath { &self.path }
	#[inline] pub fn artifact( &self ) -> &str { &self.artifact }
	#[inline] pub fn constructors( &self ) -> &[BoundConstructor] { &self.constructors }
	#[inline] pub(crate) fn member( &self, name: &str ) -> Option<&ExportedFunc> { self.members.get( name ) }
}

/// Outcome of inspecting every class a manifest declares.
#[derive( Debug, Default )]
pub struct LoadReport {
	pub usable: Vec<LoadedClass>,
	pub rejected: Vec<( String, Rejection )>,
}

impl LoadReport {
	pub fn usable( &self, name: &str ) -> Option<&LoadedClass> {
		self.usable.iter().find(| class | class.name == name )
	}
	pub fn rejection( &self, name: &str ) -> Option<&Rejection> {
		self.rejected.iter().find(|( rejected, _ )| rejected == name ).map(|( _, rejection )| rejection )
	}
}

/// Lifecycle of an [`IsolationContext`]. Contexts are handed out `Active`.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ContextStatus { Active, Unloaded }

/// The live instance of one artifact, and the component to replace it from.
struct LiveArtifact {
	component: Component,
	instance: Instance,
}

/// An instance created through a constructor, and the artifact it lives in.
#[derive( Debug, Clone, Copy )]
pub(crate) struct Slot {
	pub resource: ResourceAny,
	pub artifact: usize,
}

pub(crate) struct ContextState {
	store: Store<HostState>,
	linker: Linker<HostState>,
	artifacts: Vec<( String, LiveArtifact )>,
	handles: HashMap<Handle, Slot>,
	lost: HashSet<Handle>,
}

impl ContextState {

	pub(crate) fn store( &mut self ) -> &mut Store<HostState> { &mut self.store }

	pub(crate) fn slot( &self, handle: Handle ) -> Option<Slot> { self.handles.get( &handle ).copied() }

	pub(crate) fn is_lost( &self, handle: Handle ) -> bool { self.lost.contains( &handle ) }

	/// Keeps `resource`, created by `constructor`, under `handle`.
	pub(crate) fn insert( &mut self, handle: Handle, constructor: &ExportedFunc, resource: ResourceAny ) {
		self.handles.insert( handle, Slot { resource, artifact: constructor.artifact });
	}

	/// Forgets `handle`. Returns its slot if the instance is still alive, `None` if it
	/// was unknown or lost.
	pub(crate) fn remove( &mut self, handle: Handle ) -> Option<Slot> {
		self.lost.remove( &handle );
		self.handles.remove( &handle )
	}

	/// Calls `func` in the live instance of its artifact.
	///
	/// A failed call leaves the instance it entered poisoned: wasmtime refuses to
	/// enter it again. The instance is then replaced by a fresh one of the same
	/// component, and every instance created in the poisoned one is lost.
	pub(crate) fn call( &mut self, func: &ExportedFunc, params: &[Val], results: &mut [Val] ) -> Result<(), InvocationError> {
		let callee = self.artifacts.get( func.artifact )
			.and_then(|( _, live )| live.instance.get_func( &mut self.store, func.index ))
			.ok_or_else(|| InvocationError::RuntimeException( wasmtime::Error::msg( "export is not part of this context" )))?;
		let outcome = callee.call( &mut self.store, params, results )
			.and_then(|()| callee.post_return( &mut self.store ));
		if let Err( err ) = outcome {
			self.recycle( func.artifact );
			return Err( InvocationError::RuntimeException( err ))
		}
		Ok(())
	}

	/// Drops the resource behind `slot`, recycling its artifact if the destructor traps.
	pub(crate) fn drop_resource( &mut self, slot: Slot ) -> Result<(), InvocationError> {
		slot.resource.resource_drop( &mut self.store ).map_err(| err | {
			self.recycle( slot.artifact );
			InvocationError::RuntimeException( err )
		})
	}

	fn recycle( &mut self, position: usize ) {
		let lost = self.handles.iter()
			.filter(|( _, slot )| slot.artifact == position )
			.map(|( handle, _ )| *handle )
			.collect::<Vec<_>>();
		for handle in &lost {
			self.handles.remove( handle );
			self.lost.insert( *handle );
		}
		let Some(( name, live )) = self.artifacts.get_mut( position ) else { return };
		match self.linker.instantiate( &mut self.store, &live.component ) {
			Ok( instance ) => {
				live.instance = instance ;
				warn!( artifact = %name, lost = lost.len(), "artifact instance trapped, replaced with a fresh instance" );
			},
			Err( err ) => error!( artifact = %name, error = %err, "failed to replace trapped artifact instance" ),
		}
	}

}

/// One isolated, unloadable execution context.
pub struct IsolationContext {
	id: Uuid,
	package: PackageKey,
	state: Mutex<Option<ContextState>>,
}

impl std::fmt::Debug for IsolationContext {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "IsolationContext" )
			.field( "id", &self.id )
			.field( "package", &self.package )
			.field( "status", &self.status() )
			.finish_non_exhaustive()
	}
}

impl IsolationContext {

	#[inline] pub fn id( &self ) -> Uuid { self.id }
	#[inline] pub fn package( &self ) -> &PackageKey { &self.package }

	pub fn status( &self ) -> ContextStatus {
		match self.state.lock() {
			Ok( state ) if state.is_some() => ContextStatus::Active,
			_ => ContextStatus::Unloaded,
		}
	}

	/// Number of instances currently alive in the remote tables of this context.
	pub fn live_instances( &self ) -> usize {
		self.state.lock().ok().and_then(| state | state.as_ref().map(| state | state.handles.len() )).unwrap_or( 0 )
	}

	/// Drops the store and every instance in it.
	///
	/// Factories and proxies built against this context stay valid objects, but
	/// every later call through them fails with [`InvocationError::ContextUnloaded`].
	/// Returns `false` if the context was already unloaded.
	pub fn unload( &self ) -> bool {
		let state = match self.state.lock() {
			Ok( mut state ) => state.take(),
			Err( poisoned ) => poisoned.into_inner().take(),
		};
		match state {
			Some( state ) => {
				info!( context = %self.id, package = %self.package, live_instances = state.handles.len(), "unloading isolation context" );
				true
			},
			None => false,
		}
	}

	pub(crate) fn with_state<R>( &self, run: impl FnOnce( &mut ContextState ) -> R ) -> Result<R, InvocationError> {
		let mut guard = self.state.lock().map_err(|_| InvocationError::LockRejected )?;
		let state = guard.as_mut().ok_or( InvocationError::ContextUnloaded )?;
		Ok( run( state ))
	}

}

/// Creates isolation contexts.
#[derive( Clone )]
pub struct IsolationManager {
	engine: Engine,
	linker: Linker<HostState>,
	materializer: Arc<dyn Materializer>,
}

impl std::fmt::Debug for IsolationManager {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "IsolationManager" ).finish_non_exhaustive()
	}
}

impl IsolationManager {

	pub fn new( engine: Engine ) -> Self {
		let linker = Linker::new( &engine );
		Self { engine, linker, materializer: Arc::new( ComponentMaterializer )}
	}

	/// Host functions in `linker` are made available to every plugin.
	pub fn with_linker( mut self, linker: Linker<HostState> ) -> Self {
		self.linker = linker ;
		self
	}

	pub fn with_materializer( mut self, materializer: impl Materializer + 'static ) -> Self {
		self.materializer = Arc::new( materializer );
		self
	}

	#[inline] pub fn engine( &self ) -> &Engine { &self.engine }

	/// Loads every artifact found under `package_path` into a new context and
	/// reports which declared classes implement all `members` and have a constructor.
	///
	/// `members` are the snake case member names of the host capability.
	///
	/// # Errors
	/// Any [`LoadError`]. Classes that are merely unusable are reported in
	/// [`LoadReport::rejected`] instead.
	pub fn load(
		&self,
		package: &PackageKey,
		package_path: &Path,
		manifest: &Manifest,
		members: &[&str],
	) -> Result<( Arc<IsolationContext>, LoadReport ), LoadError> {

		let artifacts = discover_artifacts( package_path )?;
		if artifacts.is_empty() { return Err( LoadError::NoArtifacts( package_path.to_path_buf() )) }
		if let Some( missing ) = std::iter::once( manifest.artifact() )
			.chain( manifest.classes().iter().map(| class | manifest.artifact_of( class )))
			.find(| artifact | !artifacts.iter().any(|( name, _ )| name == artifact ))
		{
			return Err( LoadError::ArtifactNotFound( missing.to_string() ))
		}

		let mut store = Store::new( &self.engine, HostState::default() );
		let mut live = Vec::with_capacity( artifacts.len() );
		for ( name, path ) in artifacts {
			let component = self.materializer.materialize( &self.engine, &path )
				.map_err(| source | LoadError::Materialize { artifact: name.clone(), source })?;
			let instance = self.linker.instantiate( &mut store, &component )
				.map_err(| source | LoadError::Instantiate { artifact: name.clone(), source })?;
			debug!( package = %package, artifact = %name, "artifact instantiated" );
			live.push(( name, LiveArtifact { component, instance }));
		}

		let mut report = LoadReport::default();
		for class in manifest.classes() {
			let artifact = manifest.artifact_of( class );
			let instance = live.iter().position(|( name, _ )| name == artifact )
				.map(| position | ( position, live[position].1.instance ))
				.ok_or_else(|| LoadError::ArtifactNotFound( artifact.to_string() ))?;
			match inspect_class( &mut store, instance, artifact, class, members ) {
				Ok( loaded ) => report.usable.push( loaded ),
				Err( rejection ) => {
					debug!( package = %package, class = class.name(), %rejection, "class is not an instantiation target" );
					report.rejected.push(( class.name().to_string(), rejection ));
				},
			}
		}

		let state = ContextState {
			store,
			linker: self.linker.clone(),
			artifacts: live,
			handles: HashMap::new(),
			lost: HashSet::new(),
		};
		let context = Arc::new( IsolationContext { id: Uuid::new_v4(), package: package.clone(), state: Mutex::new( Some( state )) });
		info!(
			context = %context.id, package = %package,
			usable = report.usable.len(), rejected = report.rejected.len(),
			"isolation context loaded",
		);
		Ok(( context, report ))

	}

	/// Same as [`IsolationContext::unload`].
	pub fn unload( &self, context: &IsolationContext ) -> bool { context.unload() }

}

fn inspect_class(
	store: &mut Store<HostState>,
	instance: ( usize, Instance ),
	artifact: &str,
	class: &ClassDeclaration,
	members: &[&str],
) -> Result<LoadedClass, Rejection> {

	let Some( path ) = class.path() else { return Err( Rejection::NoPublicConstructor ) };

	let interface_index = match path.interface() {
		None => None,
		Some( interface ) => Some( instance.1
			.get_export_index( &mut *store, None, interface )
			.ok_or_else(|| Rejection::MissingInterface( interface.to_string() ))?
		),
	};

	let mut lookup = | export: &str | ExportedFunc::resolve( &mut *store, instance, interface_index.as_ref(), export );

	let mut constructors: Vec<BoundConstructor> = Vec::with_capacity( class.constructors().len() );
	for declaration in class.constructors() {
		let export = declaration.export_name( path.resource() );
		let Some( func ) = lookup( &export ) else {
			debug!( class = class.name(), export = %export, "declared constructor is not exported" );
			continue
		};
		let signature = ConstructorSignature::from_types( func.params() );
		if let Some( declared ) = declaration.signature().filter(| declared | *declared != signature ) {
			return Err( Rejection::ConstructorMismatch { export, declared, exported: signature })
		}
		if constructors.iter().any(| bound | bound.signature == signature ) {
			warn!( class = class.name(), %signature, "duplicate constructor signature ignored" );
			continue
		}
		constructors.push( BoundConstructor { export, signature, func });
	}
	if constructors.is_empty() { return Err( Rejection::NoPublicConstructor ) }

	let ( members, missing ): ( Vec<_>, Vec<_> ) = members.iter()
		.map(| member | ( *member, lookup( &path.method_export( member ))))
		.partition(|( _, func )| func.is_some() );
	if !missing.is_empty() {
		return Err( Rejection::CapabilityNotImplemented( missing.into_iter().map(|( member, _ )| member.to_string() ).collect() ))
	}

	Ok( LoadedClass {
		name: class.name().to_string(),
		path,
		artifact: artifact.to_string(),
		constructors,
		members: members.into_iter()
			.filter_map(|( member, func )| func.map(| func | ( member.to_string(), func.without_receiver() )))
			.collect(),
	})

}

/// Every artifact below `root`, keyed by its `/` separated path relative to `root`.
fn discover_artifacts( root: &Path ) -> std::io::Result<Vec<( String, PathBuf )>> {
	let mut pending = vec![ root.to_path_buf() ];
	let mut artifacts = Vec::new();
	while let Some( directory ) = pending.pop() {
		for entry in std::fs::read_dir( &directory )? {
			let path = entry?.path();
			if path.is_dir() { pending.push( path ); continue }
			let is_artifact = path.extension()
				.and_then(| extension | extension.to_str() )
				.is_some_and(| extension | ComponentMaterializer::EXTENSIONS.contains( &extension ));
			if !is_artifact { continue }
			let Ok( relative ) = path.strip_prefix( root ) else { continue };
			let name = relative.components()
				.map(| component | component.as_os_str().to_string_lossy() )
				.join( "/" );
			artifacts.push(( name, path ));
		}
	}
	Ok( artifacts.into_iter().sorted_by(|( a, _ ), ( b, _ )| a.cmp( b )).collect() )
}
