//! Constructor signatures.
//!
//! A [`ConstructorSignature`] is the ordered list of parameter type names of one
//! constructor, joined with `", "`. Bound constructors take theirs from the parameter
//! types of the exported function ([`ConstructorSignature::from_types`]); a call site
//! computes one from its arguments ([`ConstructorSignature::of`]) to look the
//! constructor up. Both sides spell every type the same way, element types included:
//! `list<u8>` and `list<string>` are different signatures.
//!
//! A value does not always tell its full type. An empty list, a `none`, or a single
//! case of a variant leaves parts of it open, which [`type_name`] spells `?`. Such
//! signatures never match a bound one exactly, and arguments are checked
//! structurally with [`accepts`] instead.

use itertools::Itertools ;
use wasmtime::component::{ Type, Val };



/// Placeholder for the parts of a type a value does not determine.
const UNKNOWN: &str = "?" ;

/// Second-level cache index distinguishing the overloaded constructors of one type.
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default )]
pub struct ConstructorSignature( String );

impl ConstructorSignature {

	/// Signature of the zero argument constructor.
	pub fn empty() -> Self { Self::default() }

	/// Builds a signature from declared parameter type names.
	pub fn from_params<S: AsRef<str>>( params: impl IntoIterator<Item = S> ) -> Self {
		Self( params.into_iter().map(| param | param.as_ref().trim().to_string() ).join( ", " ))
	}

	/// Builds the signature of a function taking `params`.
	pub fn from_types( params: &[Type] ) -> Self {
		Self( params.iter().map( type_name_of ).join( ", " ))
	}

	/// Builds the signature an argument list would match.
	pub fn of( args: &[Val] ) -> Self {
		Self( args.iter().map( type_name ).join( ", " ))
	}

	#[inline] pub fn as_str( &self ) -> &str { &self.0 }
	#[inline] pub fn is_empty( &self ) -> bool { self.0.is_empty() }

}

impl std::fmt::Display for ConstructorSignature {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		write!( f, "({})", self.0 )
	}
}

/// Canonical name of the type of a value, `?` where the value leaves it open.
pub fn type_name( val: &Val ) -> String {
	match val {
		Val::List( items ) => format!( "list<{}>", items.first().map_or_else(|| UNKNOWN.to_string(), type_name )),
		Val::Record( fields ) => format!( "record{{{}}}", fields.iter().map(|( name, value )| format!( "{}: {}", name, type_name( value ))).join( ", " )),
		Val::Tuple( items ) => format!( "tuple<{}>", items.iter().map( type_name ).join( ", " )),
		Val::Option( value ) => format!( "option<{}>", value.as_deref().map_or_else(|| UNKNOWN.to_string(), type_name )),
		Val::Result( _ ) | Val::Variant( _, _ ) | Val::Enum( _ ) | Val::Flags( _ ) => format!( "{}<{}>", kind_name( val ), UNKNOWN ),
		_ => kind_name( val ).to_string(),
	}
}

/// Canonical name of a component model type.
pub fn type_name_of( ty: &Type ) -> String {
	match ty {
		Type::Bool => "bool".to_string(),
		Type::S8 => "s8".to_string(),
		Type::S16 => "s16".to_string(),
		Type::S32 => "s32".to_string(),
		Type::S64 => "s64".to_string(),
		Type::U8 => "u8".to_string(),
		Type::U16 => "u16".to_string(),
		Type::U32 => "u32".to_string(),
		Type::U64 => "u64".to_string(),
		Type::Float32 => "f32".to_string(),
		Type::Float64 => "f64".to_string(),
		Type::Char => "char".to_string(),
		Type::String => "string".to_string(),
		Type::List( list ) => format!( "list<{}>", type_name_of( &list.ty() )),
		Type::Record( record ) => format!( "record{{{}}}", record.fields().map(| field | format!( "{}: {}", field.name, type_name_of( &field.ty ))).join( ", " )),
		Type::Tuple( tuple ) => format!( "tuple<{}>", tuple.types().map(| ty | type_name_of( &ty )).join( ", " )),
		Type::Variant( variant ) => format!( "variant<{}>", variant.cases().map(| case | match &case.ty {
			Some( ty ) => format!( "{}({})", case.name, type_name_of( ty )),
			None => case.name.to_string(),
		}).join( ", " )),
		Type::Enum( cases ) => format!( "enum<{}>", cases.names().join( ", " )),
		Type::Option( option ) => format!( "option<{}>", type_name_of( &option.ty() )),
		Type::Result( result ) => format!( "result<{}, {}>", payload_name( result.ok() ), payload_name( result.err() )),
		Type::Flags( flags ) => format!( "flags<{}>", flags.names().join( ", " )),
		Type::Own( _ ) | Type::Borrow( _ ) => "resource".to_string(),
		Type::Future( _ ) => "future".to_string(),
		Type::Stream( _ ) => "stream".to_string(),
		Type::ErrorContext => "error-context".to_string(),
	}
}

fn payload_name( ty: Option<Type> ) -> String {
	ty.map_or_else(|| "_".to_string(), | ty | type_name_of( &ty ))
}

/// Name of the kind of a value, without element types.
pub fn kind_name( val: &Val ) -> &'static str {
	match val {
		Val::Bool( _ ) => "bool",
		Val::S8( _ ) => "s8",
		Val::S16( _ ) => "s16",
		Val::S32( _ ) => "s32",
		Val::S64( _ ) => "s64",
		Val::U8( _ ) => "u8",
		Val::U16( _ ) => "u16",
		Val::U32( _ ) => "u32",
		Val::U64( _ ) => "u64",
		Val::Float32( _ ) => "f32",
		Val::Float64( _ ) => "f64",
		Val::Char( _ ) => "char",
		Val::String( _ ) => "string",
		Val::List( _ ) => "list",
		Val::Record( _ ) => "record",
		Val::Tuple( _ ) => "tuple",
		Val::Variant( _, _ ) => "variant",
		Val::Enum( _ ) => "enum",
		Val::Option( _ ) => "option",
		Val::Result( _ ) => "result",
		Val::Flags( _ ) => "flags",
		Val::Resource( _ ) => "resource",
		Val::Future( _ ) => "future",
		Val::Stream( _ ) => "stream",
		Val::ErrorContext( _ ) => "error-context",
	}
}

/// Whether `args` can be passed to a function taking `params`.
pub fn accepts( params: &[Type], args: &[Val] ) -> bool {
	params.len() == args.len() && params.iter().zip( args ).all(|( ty, val )| matches_type( val, ty ))
}

fn matches_type( val: &Val, ty: &Type ) -> bool {
	match ( val, ty ) {
		( Val::Bool( _ ), Type::Bool )
		| ( Val::S8( _ ), Type::S8 )
		| ( Val::S16( _ ), Type::S16 )
		| ( Val::S32( _ ), Type::S32 )
		| ( Val::S64( _ ), Type::S64 )
		| ( Val::U8( _ ), Type::U8 )
		| ( Val::U16( _ ), Type::U16 )
		| ( Val::U32( _ ), Type::U32 )
		| ( Val::U64( _ ), Type::U64 )
		| ( Val::Float32( _ ), Type::Float32 )
		| ( Val::Float64( _ ), Type::Float64 )
		| ( Val::Char( _ ), Type::Char )
		| ( Val::String( _ ), Type::String )
		| ( Val::Resource( _ ), Type::Own( _ ) | Type::Borrow( _ ))
		| ( Val::Future( _ ), Type::Future( _ ))
		| ( Val::Stream( _ ), Type::Stream( _ ))
		| ( Val::ErrorContext( _ ), Type::ErrorContext ) => true,
		( Val::List( items ), Type::List( list )) => {
			let element = list.ty();
			items.iter().all(| item | matches_type( item, &element ))
		},
		( Val::Record( fields ), Type::Record( record )) => fields.len() == record.fields().len()
			&& fields.iter().zip( record.fields() ).all(|(( name, value ), field )| name == field.name && matches_type( value, &field.ty )),
		( Val::Tuple( items ), Type::Tuple( tuple )) => items.len() == tuple.types().len()
			&& items.iter().zip( tuple.types() ).all(|( item, ty )| matches_type( item, &ty )),
		( Val::Variant( name, payload ), Type::Variant( variant )) => variant.cases()
			.any(| case | case.name == name && payload_matches( payload.as_deref(), case.ty.as_ref() )),
		( Val::Enum( name ), Type::Enum( cases )) => cases.names().any(| case | case == name ),
		( Val::Option( value ), Type::Option( option )) => value.as_deref().is_none_or(| value | matches_type( value, &option.ty() )),
		( Val::Result( value ), Type::Result( result )) => match value {
			Ok( payload ) => payload_matches( payload.as_deref(), result.ok().as_ref() ),
			Err( payload ) => payload_matches( payload.as_deref(), result.err().as_ref() ),
		},
		( Val::Flags( set ), Type::Flags( flags )) => set.iter().all(| flag | flags.names().any(| name | name == flag )),
		_ => false,
	}
}

fn payload_matches( val: Option<&Val>, ty: Option<&Type> ) -> bool {
	match ( val, ty ) {
		( None, None ) => true,
		( Some( val ), Some( ty )) => matches_type( val, ty ),
		_ => false,
	}
}
