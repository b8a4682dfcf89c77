//! Instances living inside an isolation context, addressed from the host by handle.
//!
//! The host never holds a component resource directly. A [`RemoteTable`] creates
//! instances through a class constructor, keeps the resulting resource in the
//! context, and hands out an opaque [`Handle`]. Method calls and disposal go through
//! the table by handle, so the only thing crossing the boundary is [`Val`]s.

use std::sync::Arc ;
use thiserror::Error ;
use tracing::{ debug, trace };
use uuid::Uuid ;
use wasmtime::component::Val ;

use crate::ConstructorSignature ;
use crate::isolation::{ BoundConstructor, IsolationContext, LoadedClass };
use crate::signature::accepts ;



/// Result of every call through a capability proxy.
pub type CallResult<T> = Result<T, InvocationError> ;

/// Errors raised while invoking a constructor or a member across the isolation boundary.
#[derive( Debug, Error )]
pub enum InvocationError {
	/// The context the instance lives in has been unloaded.
	#[error( "Isolation context has been unloaded" )] ContextUnloaded,
	/// The context lock was poisoned by a panic in another call.
	#[error( "Isolation context lock was poisoned" )] LockRejected,
	/// Arguments do not match the bound constructor.
	#[error( "Arguments {found} do not match constructor {expected}" )]
	ArgumentTypeMismatch { expected: ConstructorSignature, found: ConstructorSignature },
	/// The class does not export the member.
	#[error( "Member \"{0}\" is not exported" )] UnknownMember( String ),
	/// Arguments do not match the parameters of the exported member.
	#[error( "Arguments {found} do not match member \"{member}\" {expected}" )]
	ParameterMismatch { member: String, expected: ConstructorSignature, found: ConstructorSignature },
	/// A member returned a value the host cannot convert.
	#[error( "Member \"{member}\" returned {found}, which does not match the host type" )]
	ReturnTypeMismatch { member: String, found: String },
	/// The instance lived in a plugin instance that trapped and was replaced.
	#[error( "Instance {0} was lost when its plugin trapped" )] InstanceLost( Handle ),
	/// A call produced fewer results than its host signature needs.
	#[error( "Member \"{0}\" returned no value" )] MissingResult( String ),
	/// A constructor returned something other than a resource.
	#[error( "Constructor \"{0}\" did not return a resource" )] NotAResource( String ),
	/// The plugin trapped or raised an error.
	#[error( "Runtime exception: {0}" )] RuntimeException( #[source] wasmtime::Error ),
}

/// Opaque identifier of an instance in a [`RemoteTable`].
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct Handle( Uuid );

impl Handle {
	fn new() -> Self { Self( Uuid::new_v4() ) }
}

impl std::fmt::Display for Handle {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result { write!( f, "{}", self.0 ) }
}

/// Instances of one class in one isolation context.
#[derive( Debug )]
pub struct RemoteTable {
	context: Arc<IsolationContext>,
	class: LoadedClass,
}

impl RemoteTable {

	pub fn new( context: Arc<IsolationContext>, class: LoadedClass ) -> Self { Self { context, class }}

	#[inline] pub fn context( &self ) -> &Arc<IsolationContext> { &self.context }
	#[inline] pub fn class( &self ) -> &LoadedClass { &self.class }

	/// Runs `constructor` with `args` and keeps the instance it returns.
	///
	/// # Errors
	/// - [`InvocationError::ArgumentTypeMismatch`] if `args` do not fit the constructor.
	/// - [`InvocationError::ContextUnloaded`] after unload.
	/// - [`InvocationError::RuntimeException`] if the constructor traps.
	pub fn create_instance( &self, constructor: &BoundConstructor, args: &[Val] ) -> CallResult<Handle> {
		let func = constructor.func();
		if !accepts( func.params(), args ) {
			return Err( InvocationError::ArgumentTypeMismatch { expected: constructor.signature().clone(), found: ConstructorSignature::of( args ) })
		}
		self.context.with_state(| state | {
			let mut results = vec![ Val::Bool( false ); func.results() ];
			state.call( func, args, &mut results )?;
			let Some( Val::Resource( resource )) = results.pop() else {
				return Err( InvocationError::NotAResource( constructor.export().to_string() ))
			};
			let handle = Handle::new();
			state.insert( handle, func, resource );
			debug!( context = %self.context.id(), class = self.class.name(), %handle, constructor = constructor.export(), "instance created" );
			Ok( handle )
		})?
	}

	/// Calls `member` on the instance behind `handle` and returns every result it produced.
	///
	/// Returns `Ok( None )` if `handle` is unknown to the table, for instance because
	/// it was disposed of already.
	///
	/// # Errors
	/// - [`InvocationError::UnknownMember`] if the class does not export `member`.
	/// - [`InvocationError::ParameterMismatch`] if `args` do not fit the export.
	/// - [`InvocationError::InstanceLost`] if the instance went down with a trap.
	/// - [`InvocationError::ContextUnloaded`] after unload.
	/// - [`InvocationError::RuntimeException`] if the plugin traps.
	pub fn invoke( &self, handle: Handle, member: &str, args: Vec<Val> ) -> CallResult<Option<Vec<Val>>> {
		let func = self.class.member( member ).ok_or_else(|| InvocationError::UnknownMember( member.to_string() ))?;
		if !accepts( func.params(), &args ) {
			return Err( InvocationError::ParameterMismatch {
				member: member.to_string(),
				expected: ConstructorSignature::from_types( func.params() ),
				found: ConstructorSignature::of( &args ),
			})
		}
		self.context.with_state(| state | {
			if state.is_lost( handle ) { return Err( InvocationError::InstanceLost( handle )) }
			let Some( slot ) = state.slot( handle ) else { return Ok( None ) };
			let params = std::iter::once( Val::Resource( slot.resource )).chain( args ).collect::<Vec<_>>();
			let mut results = vec![ Val::Bool( false ); func.results() ];
			state.call( func, &params, &mut results )?;
			trace!( context = %self.context.id(), %handle, member, "member invoked" );
			Ok( Some( results ))
		})?
	}

	/// Drops the instance behind `handle`. Returns `false` if it was unknown.
	///
	/// An instance lost to a trap is forgotten without running its destructor.
	///
	/// # Errors
	/// [`InvocationError::ContextUnloaded`] after unload, [`InvocationError::RuntimeException`]
	/// if the resource destructor traps.
	pub fn dispose_instance( &self, handle: Handle ) -> CallResult<bool> {
		self.context.with_state(| state | {
			let lost = state.is_lost( handle );
			let Some( slot ) = state.remove( handle ) else { return Ok( lost ) };
			state.drop_resource( slot )?;
			debug!( context = %self.context.id(), class = self.class.name(), %handle, "instance disposed" );
			Ok( true )
		})?
	}

}
