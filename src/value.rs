//! Conversions between host Rust values and component model [`Val`]s.
//!
//! Arguments and results cross the isolation boundary as [`Val`]s. Proxies generated
//! by [`capability!`]( crate::capability ) convert their parameters with [`IntoVal`]
//! and their results with [`FromVal`].

use wasmtime::component::Val ;



/// Converts a host value into a component model value.
pub trait IntoVal {
	fn into_val( self ) -> Val ;
}

/// Converts a component model value back into a host value.
///
/// Returns `None` when the value has a different shape than `Self`.
pub trait FromVal: Sized {
	fn from_val( val: Val ) -> Option<Self> ;

	/// Number of results a component function returning `Self` produces.
	fn result_count() -> usize { 1 }
}

macro_rules! primitive_val {
	( $( $ty:ty => $variant:ident ),* $(,)? ) => { $(
		impl IntoVal for $ty {
			#[inline] fn into_val( self ) -> Val { Val::$variant( self ) }
		}
		impl FromVal for $ty {
			#[inline] fn from_val( val: Val ) -> Option<Self> { match val {
				Val::$variant( value ) => Some( value ),
				_ => None,
			}}
		}
	)* };
}

primitive_val! {
	bool => Bool,
	i8 => S8, i16 => S16, i32 => S32, i64 => S64,
	u8 => U8, u16 => U16, u32 => U32, u64 => U64,
	f32 => Float32, f64 => Float64,
	char => Char,
	String => String,
}

impl IntoVal for &str {
	#[inline] fn into_val( self ) -> Val { Val::String( self.to_string() ) }
}

impl IntoVal for Val {
	#[inline] fn into_val( self ) -> Val { self }
}

impl<T: IntoVal> IntoVal for Vec<T> {
	fn into_val( self ) -> Val { Val::List( self.into_iter().map( IntoVal::into_val ).collect() ) }
}

impl<T: IntoVal> IntoVal for Option<T> {
	fn into_val( self ) -> Val { Val::Option( self.map(| value | Box::new( value.into_val() ))) }
}

impl<T: FromVal> FromVal for Vec<T> {
	fn from_val( val: Val ) -> Option<Self> { match val {
		Val::List( items ) => items.into_iter().map( T::from_val ).collect(),
		_ => None,
	}}
}

impl<T: FromVal> FromVal for Option<T> {
	fn from_val( val: Val ) -> Option<Self> { match val {
		Val::Option( None ) => Some( None ),
		Val::Option( Some( inner )) => T::from_val( *inner ).map( Some ),
		_ => None,
	}}
}

impl FromVal for () {
	fn from_val( _: Val ) -> Option<Self> { Some(()) }
	fn result_count() -> usize { 0 }
}
