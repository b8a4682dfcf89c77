//! Package and instantiator identity.
//!
//! A [`PackageKey`] names one immutable version of a bundle; an [`InstantiatorKey`]
//! extends it with the fully qualified name of a plugin type inside that bundle.
//! Both are validated and normalized on construction, before any I/O happens, and
//! compare by exact (case-sensitive) string equality afterwards.

use semver::{ BuildMetadata, Prerelease, Version };
use thiserror::Error ;



/// Errors raised while constructing a [`PackageKey`] or [`InstantiatorKey`].
#[derive( Debug, Error, Clone, PartialEq, Eq )]
pub enum KeyError {
	/// The package id is empty or contains characters that are not allowed in a directory name.
	#[error( "Invalid package id \"{0}\"" )] InvalidPackageId( String ),
	/// The version cannot be read as a semantic version.
	#[error( "Invalid version \"{0}\"" )] InvalidVersion( String ),
	/// The fully qualified type name is empty.
	#[error( "Invalid type name \"{0}\"" )] InvalidTypeName( String ),
}

/// Identity of one version of a bundle.
///
/// The version is normalized the way package repositories do it: `1` and `1.2`
/// become `1.0.0` and `1.2.0`, and build metadata is dropped, so `1.2` and `1.2.0+ci`
/// name the same package. Four part versions keep their revision unless it is zero:
/// `1.2.3.4` stays as is, `1.2.3.0` becomes `1.2.3`.
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord )]
pub struct PackageKey {
	package_id: String,
	version: String,
}

impl PackageKey {

	/// Validates the id and normalizes the version.
	///
	/// # Errors
	/// [`KeyError::InvalidPackageId`] if the id is not a dot separated list of
	/// `[A-Za-z0-9_-]+` segments, [`KeyError::InvalidVersion`] if the version is not
	/// one to four dot separated numbers, optionally followed by a pre-release and
	/// build metadata.
	pub fn new( package_id: impl Into<String>, version: &str ) -> Result<Self, KeyError> {
		let package_id = package_id.into();
		if !is_valid_package_id( &package_id ) { return Err( KeyError::InvalidPackageId( package_id )) }
		let version = normalize_version( version ).ok_or_else(|| KeyError::InvalidVersion( version.to_string() ))?;
		Ok( Self { package_id, version })
	}

	#[inline] pub fn package_id( &self ) -> &str { &self.package_id }
	#[inline] pub fn version( &self ) -> &str { &self.version }

	/// Name of the directory a package is unpacked into: `<id>.<version>`.
	pub fn directory_name( &self ) -> String {
		format!( "{}.{}", self.package_id, self.version )
	}

}

impl std::fmt::Display for PackageKey {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		write!( f, "{}.{}", self.package_id, self.version )
	}
}

/// Cache index of the instantiator factory: a package plus a fully qualified type name.
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord )]
pub struct InstantiatorKey {
	package: PackageKey,
	type_name: String,
}

impl InstantiatorKey {

	/// # Errors
	/// Any [`KeyError`] raised by [`PackageKey::new`], or [`KeyError::InvalidTypeName`]
	/// for a blank type name.
	pub fn new( package_id: impl Into<String>, version: &str, type_name: impl Into<String> ) -> Result<Self, KeyError> {
		Self::for_package( PackageKey::new( package_id, version )?, type_name )
	}

	/// # Errors
	/// [`KeyError::InvalidTypeName`] for a blank type name.
	pub fn for_package( package: PackageKey, type_name: impl Into<String> ) -> Result<Self, KeyError> {
		let type_name = type_name.into();
		if type_name.trim().is_empty() { return Err( KeyError::InvalidTypeName( type_name )) }
		Ok( Self { package, type_name })
	}

	#[inline] pub fn package( &self ) -> &PackageKey { &self.package }
	#[inline] pub fn package_id( &self ) -> &str { self.package.package_id() }
	#[inline] pub fn version( &self ) -> &str { self.package.version() }
	#[inline] pub fn type_name( &self ) -> &str { &self.type_name }

}

impl std::fmt::Display for InstantiatorKey {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		write!( f, "{}.{}", self.package, self.type_name )
	}
}

fn is_valid_package_id( id: &str ) -> bool {
	!id.is_empty() && id.split( '.' ).all(| segment | !segment.is_empty()
		&& segment.chars().all(| c | c.is_ascii_alphanumeric() || c == '_' || c == '-' ))
}

/// Ordering of normalized versions, the revision of four part versions included.
pub(crate) type VersionOrder = ( u64, u64, u64, u64, bool, Prerelease );

/// Precedence of `raw`, `None` if it is not a valid version.
///
/// A release sorts above its pre-releases, and `1.2.3.4` above `1.2.3`.
pub(crate) fn version_order( raw: &str ) -> Option<VersionOrder> {
	let ( version, revision ) = parse_version( raw )?;
	Some(( version.major, version.minor, version.patch, revision, version.pre.is_empty(), version.pre ))
}

fn normalize_version( raw: &str ) -> Option<String> {
	let ( version, revision ) = parse_version( raw )?;
	Some( match ( revision, version.pre.is_empty() ) {
		( 0, _ ) => version.to_string(),
		( _, true ) => format!( "{}.{}.{}.{}", version.major, version.minor, version.patch, revision ),
		( _, false ) => format!( "{}.{}.{}.{}-{}", version.major, version.minor, version.patch, revision, version.pre ),
	})
}

/// Splits off the revision of a four part version and pads shorter ones to three parts.
fn parse_version( raw: &str ) -> Option<( Version, u64 )> {
	let raw = raw.trim();
	let ( core, suffix ) = match raw.find([ '-', '+' ]) {
		Some( index ) => raw.split_at( index ),
		None => ( raw, "" ),
	};
	let parts = core.split( '.' ).collect::<Vec<_>>();
	let ( core, revision ) = match parts.as_slice() {
		[ major ] => ( format!( "{}.0.0", major ), 0 ),
		[ major, minor ] => ( format!( "{}.{}.0", major, minor ), 0 ),
		[ _, _, _ ] => ( core.to_string(), 0 ),
		[ major, minor, patch, revision ] if !revision.is_empty() && revision.chars().all(| c | c.is_ascii_digit() ) => {
			( format!( "{}.{}.{}", major, minor, patch ), revision.parse().ok()? )
		},
		_ => return None,
	};
	let mut version = Version::parse( &format!( "{}{}", core, suffix )).ok()?;
	version.build = BuildMetadata::EMPTY ;
	Some(( version, revision ))
}
