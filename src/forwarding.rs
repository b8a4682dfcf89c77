//! Factories instantiating plugin classes behind host capabilities.

use std::marker::PhantomData ;
use std::sync::Arc ;
use itertools::Itertools ;
use nonempty_collections::NEMap ;
use pipe_trait::Pipe ;
use tracing::debug ;
use wasmtime::component::Val ;

use crate::{ ConstructorSignature, InstantiatorKey };
use crate::isolation::{ BoundConstructor, IsolationContext, LoadedClass };
use crate::proxy::{ Capability, RemoteObject };
use crate::remote_table::{ CallResult, RemoteTable };
use crate::signature::accepts ;



/// One constructor of one class, bound once and invoked any number of times.
pub struct CachedFactory<T: ?Sized> {
	table: Arc<RemoteTable>,
	constructor: BoundConstructor,
	_capability: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> std::fmt::Debug for CachedFactory<T> {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "CachedFactory" )
			.field( "class", &self.table.class().name() )
			.field( "constructor", &self.constructor.export() )
			.field( "signature", self.constructor.signature() )
			.finish()
	}
}

impl<T: ?Sized + Capability> CachedFactory<T> {

	/// Binds `constructor` of the class served by `table`.
	pub fn build( table: Arc<RemoteTable>, constructor: BoundConstructor ) -> Self {
		Self { table, constructor, _capability: PhantomData }
	}

	#[inline] pub fn signature( &self ) -> &ConstructorSignature { self.constructor.signature() }
	#[inline] pub fn class_name( &self ) -> &str { self.table.class().name() }
	#[inline] pub fn context( &self ) -> &Arc<IsolationContext> { self.table.context() }

	/// Whether `args` fit the parameter types of the constructor.
	pub fn accepts( &self, args: &[Val] ) -> bool { accepts( self.constructor.func().params(), args ) }

	/// Creates an instance and returns it behind a capability proxy.
	///
	/// # Errors
	/// [`InvocationError::ArgumentTypeMismatch`]( crate::InvocationError::ArgumentTypeMismatch ) if `args` do not match the bound
	/// signature, otherwise any error of the constructor call.
	pub fn invoke( &self, args: &[Val] ) -> CallResult<Box<T>> {
		self.create_remote( args ).map( T::forward )
	}

	/// Creates an instance without wrapping it.
	///
	/// # Errors
	/// Same as [`invoke`]( Self::invoke ).
	pub fn create_remote( &self, args: &[Val] ) -> CallResult<RemoteObject> {
		let handle = self.table.create_instance( &self.constructor, args )?;
		Ok( RemoteObject::new( Arc::clone( &self.table ), handle ))
	}

}

/// Every bound constructor of one resolved class, indexed by signature.
pub struct FactorySet<T: ?Sized> {
	key: InstantiatorKey,
	context: Arc<IsolationContext>,
	factories: NEMap<ConstructorSignature, Arc<CachedFactory<T>>>,
}

impl<T: ?Sized> std::fmt::Debug for FactorySet<T> {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "FactorySet" ).field( "key", &self.key ).finish_non_exhaustive()
	}
}

impl<T: ?Sized + Capability> FactorySet<T> {

	/// Binds every constructor of `class`. `None` if the class has none.
	pub fn build( key: InstantiatorKey, context: Arc<IsolationContext>, class: LoadedClass ) -> Option<Self> {
		let constructors = class.constructors().to_vec();
		debug!( key = %key, class = class.name(), constructors = constructors.len(), "binding factories" );
		let table = Arc::new( RemoteTable::new( Arc::clone( &context ), class ));
		constructors.into_iter()
			.map(| constructor | ( constructor.signature().clone(), Arc::new( CachedFactory::build( Arc::clone( &table ), constructor ))))
			.collect::<Vec<_>>()
			.pipe( into_nonempty_map )
			.map(| factories | Self { key, context, factories })
	}

	#[inline] pub fn key( &self ) -> &InstantiatorKey { &self.key }

	pub fn get( &self, signature: &ConstructorSignature ) -> Option<&Arc<CachedFactory<T>>> {
		self.factories.get( signature )
	}

	/// The constructor `args` are meant for.
	///
	/// Looked up by the signature of `args` first. Arguments whose types are only
	/// partly known, such as an empty list, select the one constructor accepting them.
	pub fn select( &self, args: &[Val] ) -> Option<&Arc<CachedFactory<T>>> {
		self.get( &ConstructorSignature::of( args )).or_else(|| self.factories.iter()
			.map(|( _, factory )| factory )
			.filter(| factory | factory.accepts( args ))
			.exactly_one()
			.ok()
		)
	}

	/// Signatures of every bound constructor, sorted.
	pub fn signatures( &self ) -> Vec<ConstructorSignature> {
		self.factories.iter().map(|( signature, _ )| signature.clone() ).sorted().collect()
	}

	/// The context every factory of the set instantiates into.
	#[inline] pub fn context( &self ) -> &Arc<IsolationContext> { &self.context }

}

fn into_nonempty_map<K: std::hash::Hash + Eq, V>( entries: Vec<( K, V )> ) -> Option<NEMap<K, V>> {
	let mut entries = entries.into_iter();
	let ( key, value ) = entries.next()?;
	let mut map = NEMap::new( key, value );
	entries.for_each(|( key, value )| { map.insert( key, value ); });
	Some( map )
}
