//! Bundle manifest.
//!
//! Every bundle carries a `bundle.toml` at its root naming the artifact and the
//! fully qualified class instantiated by default, and declaring each class the
//! bundle offers together with its constructors:
//!
//! ```toml
//! artifact = "calc.wasm"
//! class = "calc"
//!
//! [[classes]]
//! name = "calc"
//! constructors = [
//! 	{ params = [] },
//! 	{ function = "with-offset", params = ["s32"] },
//! ]
//! ```
//!
//! A class name is either a bare resource name exported at the component root, or
//! `interface-path#resource` for a resource exported from an interface instance.
//! A constructor without `function` is the resource's `[constructor]`; one with a
//! `function` is the static factory `[static]<resource>.<function>`.

use std::collections::HashSet ;
use std::path::{ Path, PathBuf };
use serde::Deserialize ;
use thiserror::Error ;

use crate::ConstructorSignature ;



#[derive( Debug, Error )]
pub enum ManifestError {
	#[error( "Manifest {0} not found" )] Missing( PathBuf ),
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
	#[error( "TOML parse error: {0}" )] Parse( #[from] toml::de::Error ),
	#[error( "Invalid manifest: {0}" )] Invalid( String ),
}

/// Parsed `bundle.toml`.
#[derive( Debug, Clone, Deserialize, PartialEq, Eq )]
#[serde( deny_unknown_fields )]
pub struct Manifest {
	/// Artifact holding the default class, relative to the package root.
	artifact: String,
	/// Fully qualified name of the default class.
	class: String,
	#[serde( default )]
	classes: Vec<ClassDeclaration>,
}

/// One class a bundle offers.
#[derive( Debug, Clone, Deserialize, PartialEq, Eq )]
#[serde( deny_unknown_fields )]
pub struct ClassDeclaration {
	name: String,
	artifact: Option<String>,
	#[serde( default )]
	constructors: Vec<ConstructorDeclaration>,
}

/// One constructor overload of a class.
///
/// `params`, when given, must name the parameter types of the export exactly as
/// [`type_name_of`]( crate::type_name_of ) spells them. A class whose exports disagree
/// is rejected at load. Without `params` the export's own types are taken as is.
#[derive( Debug, Clone, Deserialize, PartialEq, Eq )]
#[serde( deny_unknown_fields )]
pub struct ConstructorDeclaration {
	function: Option<String>,
	params: Option<Vec<String>>,
}

/// Where a class lives inside a component.
#[derive( Debug, Clone, PartialEq, Eq, Hash )]
pub struct ClassPath {
	interface: Option<String>,
	resource: String,
}

impl Manifest {

	pub const FILE_NAME: &'static str = "bundle.toml" ;

	/// Reads `bundle.toml` from a package directory.
	///
	/// # Errors
	/// [`ManifestError::Missing`] if there is no manifest, any other variant if it
	/// cannot be read, parsed or validated.
	pub fn load( package_path: &Path ) -> Result<Self, ManifestError> {
		let path = package_path.join( Self::FILE_NAME );
		if !path.is_file() { return Err( ManifestError::Missing( path )) }
		Self::parse( &std::fs::read_to_string( &path )? )
	}

	/// # Errors
	/// [`ManifestError::Parse`] or [`ManifestError::Invalid`].
	pub fn parse( source: &str ) -> Result<Self, ManifestError> {
		let manifest: Self = toml::from_str( source )?;
		manifest.validate()?;
		Ok( manifest )
	}

	fn validate( &self ) -> Result<(), ManifestError> {
		if self.artifact.trim().is_empty() { return Err( ManifestError::Invalid( "artifact is empty".to_string() )) }
		let mut seen = HashSet::with_capacity( self.classes.len() );
		if let Some( class ) = self.classes.iter().find(| class | !seen.insert( class.name.as_str() )) {
			return Err( ManifestError::Invalid( format!( "class \"{}\" declared twice", class.name )))
		}
		if let Some( class ) = self.classes.iter().find(| class | ClassPath::parse( &class.name ).is_none() ) {
			return Err( ManifestError::Invalid( format!( "malformed class name \"{}\"", class.name )))
		}
		if !seen.contains( self.class.as_str() ) {
			return Err( ManifestError::Invalid( format!( "default class \"{}\" is not declared", self.class )))
		}
		Ok(())
	}

	#[inline] pub fn artifact( &self ) -> &str { &self.artifact }
	#[inline] pub fn default_class( &self ) -> &str { &self.class }
	#[inline] pub fn classes( &self ) -> &[ClassDeclaration] { &self.classes }

	pub fn class( &self, name: &str ) -> Option<&ClassDeclaration> {
		self.classes.iter().find(| class | class.name == name )
	}

	/// Artifact a class is loaded from, falling back to the bundle artifact.
	pub fn artifact_of<'a>( &'a self, class: &'a ClassDeclaration ) -> &'a str {
		class.artifact.as_deref().unwrap_or( &self.artifact )
	}

}

impl ClassDeclaration {
	#[inline] pub fn name( &self ) -> &str { &self.name }
	#[inline] pub fn constructors( &self ) -> &[ConstructorDeclaration] { &self.constructors }

	/// Validated by [`Manifest::parse`].
	pub fn path( &self ) -> Option<ClassPath> { ClassPath::parse( &self.name ) }
}

impl ConstructorDeclaration {

	#[inline] pub fn params( &self ) -> Option<&[String]> { self.params.as_deref() }

	/// The declared signature, if the manifest spells out the parameters.
	pub fn signature( &self ) -> Option<ConstructorSignature> {
		self.params.as_ref().map( ConstructorSignature::from_params )
	}

	/// Export name of the constructor function of `resource`.
	pub fn export_name( &self, resource: &str ) -> String {
		match &self.function {
			None => format!( "[constructor]{}", resource ),
			Some( function ) => format!( "[static]{}.{}", resource, function ),
		}
	}

}

impl ClassPath {

	/// Splits `interface-path#resource` or a bare `resource`.
	pub fn parse( name: &str ) -> Option<Self> {
		let ( interface, resource ) = match name.rsplit_once( '#' ) {
			Some(( interface, resource )) => ( Some( interface.to_string() ), resource ),
			None => ( None, name ),
		};
		let valid = !resource.is_empty() && interface.as_ref().is_none_or(| path | !path.is_empty() )
			&& resource.chars().all(| c | c.is_ascii_alphanumeric() || c == '-' );
		valid.then(|| Self { interface, resource: resource.to_string() })
	}

	#[inline] pub fn interface( &self ) -> Option<&str> { self.interface.as_deref() }
	#[inline] pub fn resource( &self ) -> &str { &self.resource }

	/// Export name of the method implementing a host capability member.
	///
	/// Host members are snake case, component exports are kebab case.
	pub fn method_export( &self, member: &str ) -> String {
		format!( "[method]{}.{}", self.resource, member.replace( '_', "-" ))
	}

}

impl std::fmt::Display for ClassPath {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		match &self.interface {
			Some( interface ) => write!( f, "{}#{}", interface, self.resource ),
			None => write!( f, "{}", self.resource ),
		}
	}
}
