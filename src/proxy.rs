//! Host-side proxies of plugin instances.
//!
//! A host capability is an ordinary object-safe trait declared with [`capability!`].
//! The macro also generates a private proxy type implementing the trait by forwarding
//! every call, through a [`RemoteObject`], to the instance inside the isolation
//! context. Host code holds `Box<dyn Trait>` and never sees a component type.

use std::sync::Arc ;
use tracing::{ trace, warn };
use wasmtime::component::Val ;

use crate::remote_table::{ CallResult, Handle, InvocationError, RemoteTable };
use crate::signature::type_name ;
use crate::value::FromVal ;



/// A host trait plugin classes can be instantiated behind.
///
/// Implemented for `dyn Trait` by [`capability!`]; not meant to be implemented by hand.
pub trait Capability: Send + Sync {
	/// Snake case names of every member, each of which a class has to export.
	const MEMBERS: &'static [&'static str] ;

	/// Wraps a remote instance into a proxy implementing the capability.
	fn forward( object: RemoteObject ) -> Box<Self> ;
}

/// One instance inside an isolation context, as seen from the host.
///
/// The instance is disposed of when the object is dropped.
#[derive( Debug )]
pub struct RemoteObject {
	table: Arc<RemoteTable>,
	handle: Handle,
}

impl RemoteObject {

	pub fn new( table: Arc<RemoteTable>, handle: Handle ) -> Self { Self { table, handle }}

	#[inline] pub fn handle( &self ) -> Handle { self.handle }
	#[inline] pub fn class_name( &self ) -> &str { self.table.class().name() }

	/// Invokes `member` with `args` and converts its result.
	///
	/// A disposed of instance answers every call with `R::default()`. Results the
	/// host type does not ask for are ignored.
	///
	/// # Errors
	/// [`InvocationError::ContextUnloaded`] if the context is gone, any other
	/// [`InvocationError`] if the call or the result conversion fails.
	pub fn call<R: FromVal + Default>( &self, member: &str, args: Vec<Val> ) -> CallResult<R> {
		let Some( mut results ) = self.table.invoke( self.handle, member, args )? else {
			warn!( class = self.class_name(), handle = %self.handle, member, "call on a disposed instance" );
			return Ok( R::default() )
		};
		if R::result_count() == 0 { return Ok( R::default() ) }
		let val = results.pop().ok_or_else(|| InvocationError::MissingResult( member.to_string() ))?;
		let found = type_name( &val );
		R::from_val( val ).ok_or_else(|| InvocationError::ReturnTypeMismatch { member: member.to_string(), found })
	}

	/// Disposes of the instance ahead of drop. Returns `false` if it was already gone.
	///
	/// # Errors
	/// See [`RemoteTable::dispose_instance`].
	pub fn dispose( &self ) -> CallResult<bool> {
		self.table.dispose_instance( self.handle )
	}

}

impl Drop for RemoteObject {
	fn drop( &mut self ) {
		match self.table.dispose_instance( self.handle ) {
			Ok( _ ) | Err( InvocationError::ContextUnloaded ) => {},
			Err( err ) => trace!( handle = %self.handle, error = %err, "failed to dispose of instance" ),
		}
	}
}

/// Declares a host capability trait and its forwarding proxy.
///
/// Every member takes `&self`, arguments implementing [`IntoVal`]( crate::IntoVal ),
/// and returns [`CallResult`]`<R>` where `R` is the declared return type (or `()`),
/// which must implement [`FromVal`]( crate::FromVal ) and `Default`. Member names map
/// onto the kebab case `[method]` exports of the plugin resource.
///
/// ```
/// wasm_hotload::capability! {
/// 	/// Adds numbers.
/// 	pub trait Calculator {
/// 		fn calculate( &self, a: i32, b: i32 ) -> i32 ;
/// 		fn reset( &self );
/// 	}
/// }
///
/// use wasm_hotload::Capability ;
/// assert_eq!( <dyn Calculator as Capability>::MEMBERS, &[ "calculate", "reset" ]);
/// ```
#[macro_export]
macro_rules! capability {
	( @ret ) => { () };
	( @ret $ret:ty ) => { $ret };
	(
		$( #[$attr:meta] )*
		$vis:vis trait $name:ident {
			$(
				$( #[$member_attr:meta] )*
				fn $member:ident( &self $( , $arg:ident : $arg_ty:ty )* $(,)? ) $( -> $ret:ty )? ;
			)*
		}
	) => {
		$( #[$attr] )*
		$vis trait $name: Send + Sync {
			$(
				$( #[$member_attr] )*
				fn $member( &self $( , $arg: $arg_ty )* ) -> $crate::CallResult<$crate::capability!( @ret $( $ret )? )> ;
			)*
		}

		impl $crate::Capability for dyn $name {
			const MEMBERS: &'static [&'static str] = &[ $( stringify!( $member ) ),* ];

			fn forward( object: $crate::RemoteObject ) -> Box<Self> {
				struct Proxy( $crate::RemoteObject );
				impl $name for Proxy {
					$(
						fn $member( &self $( , $arg: $arg_ty )* ) -> $crate::CallResult<$crate::capability!( @ret $( $ret )? )> {
							self.0.call( stringify!( $member ), vec![ $( $crate::IntoVal::into_val( $arg ) ),* ] )
						}
					)*
				}
				Box::new( Proxy( object ))
			}
		}
	};
}
