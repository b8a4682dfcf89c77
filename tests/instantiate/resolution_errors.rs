use wasm_hotload::{
	AcquireError, ConstructorSignature, ErrorKind, InstantiatorError, InstantiatorKey, IntoVal,
	LoadError, ResolveError,
};
use crate::fixtures::{ self, Calculator, CountingStore, Scaler };

#[test]
fn unknown_package() {

	let host = fixtures::host::<dyn Calculator>( CountingStore::new() );
	let instantiator = InstantiatorKey::new( "demo.missing", "1.0.0", "calc" ).expect( "Invalid key" );

	match host.factory.instantiate( &instantiator, &[] ) {
		Err( err @ InstantiatorError::Creation { source: ResolveError::Acquire( AcquireError::PackageNotFound( _ )), .. }) => {
			assert_eq!( err.kind(), ErrorKind::Creation );
			assert!( err.to_string().contains( "demo.missing.1.0.0.calc" ), "{}", err );
		}
		value => panic!( "Expected Creation error, found: {:#?}", value.map(|_| ()) ),
	}
	assert!( host.factory.is_empty() );
	assert!( host.factory.cached( &instantiator ).is_none() );

}

#[test]
fn undeclared_type() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let host = fixtures::host::<dyn Calculator>( CountingStore::new().with_calculator( &key, fixtures::adding_calculator() ));
	let instantiator = InstantiatorKey::for_package( key, "abacus" ).expect( "Invalid key" );

	match host.factory.instantiate( &instantiator, &[] ) {
		Err( InstantiatorError::Creation { source: ResolveError::TypeNotFound { type_name, .. }, .. }) => assert_eq!( type_name, "abacus" ),
		value => panic!( "Expected TypeNotFound error, found: {:#?}", value.map(|_| ()) ),
	}

}

#[test]
fn capability_not_implemented() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let host = fixtures::host::<dyn Scaler>( CountingStore::new().with_calculator( &key, fixtures::adding_calculator() ));
	let instantiator = InstantiatorKey::for_package( key, "calc" ).expect( "Invalid key" );

	match host.factory.instantiate( &instantiator, &[] ) {
		Err( InstantiatorError::Creation { source: ResolveError::CapabilityNotImplemented { missing, .. }, .. }) => {
			assert_eq!( missing, vec![ "scale".to_string() ]);
		}
		value => panic!( "Expected CapabilityNotImplemented error, found: {:#?}", value.map(|_| ()) ),
	}
	assert!( host.factory.is_empty() );

}

#[test]
fn no_public_constructor() {

	let manifest = r#"
		artifact = "calc.wat"
		class = "calc"
		[[classes]]
		name = "calc"
		constructors = [{ function = "from-seed", params = ["u64"] }]
	"# ;
	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let adding = fixtures::adding_calculator();
	let host = fixtures::host::<dyn Calculator>( CountingStore::new()
		.with_bundle( &key, &[( "bundle.toml", manifest ), ( "calc.wat", adding )]));
	let instantiator = InstantiatorKey::for_package( key, "calc" ).expect( "Invalid key" );

	match host.factory.instantiate( &instantiator, &[] ) {
		Err( InstantiatorError::Creation { source: ResolveError::NoPublicConstructor( type_name ), .. }) => assert_eq!( type_name, "calc" ),
		value => panic!( "Expected NoPublicConstructor error, found: {:#?}", value.map(|_| ()) ),
	}

}

#[test]
fn invalid_artifact() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let host = fixtures::host::<dyn Calculator>( CountingStore::new().with_calculator( &key, "(component (this is not wat" ));
	let instantiator = InstantiatorKey::for_package( key, "calc" ).expect( "Invalid key" );

	match host.factory.instantiate( &instantiator, &[] ) {
		Err( InstantiatorError::Creation { source: ResolveError::Load( LoadError::Materialize { artifact, .. }), .. }) => assert_eq!( artifact, "calc.wat" ),
		value => panic!( "Expected Materialize error, found: {:#?}", value.map(|_| ()) ),
	}

	// Failures are not cached, a later call resolves again.
	assert!( host.factory.instantiate( &instantiator, &[] ).is_err() );
	assert_eq!( host.store.fetches(), 1 );

}

#[test]
fn missing_artifact() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let adding = fixtures::adding_calculator();
	let host = fixtures::host::<dyn Calculator>( CountingStore::new()
		.with_bundle( &key, &[( "bundle.toml", fixtures::CALC_MANIFEST ), ( "lib/other.wat", adding )]));

	match host.factory.instantiate_default( &key, &[] ) {
		Err( InstantiatorError::Creation { source: ResolveError::Load( LoadError::ArtifactNotFound( artifact )), .. }) => assert_eq!( artifact, "calc.wat" ),
		value => panic!( "Expected ArtifactNotFound error, found: {:#?}", value.map(|_| ()) ),
	}

}

#[test]
fn missing_manifest() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let adding = fixtures::adding_calculator();
	let host = fixtures::host::<dyn Calculator>( CountingStore::new().with_bundle( &key, &[( "calc.wat", adding )]));

	match host.factory.instantiate_default( &key, &[] ) {
		Err( err @ InstantiatorError::DefaultClass { source: ResolveError::Manifest( _ ), .. }) => assert_eq!( err.kind(), ErrorKind::Creation ),
		value => panic!( "Expected DefaultClass error, found: {:#?}", value.map(|_| ()) ),
	}

}

#[test]
fn declared_parameters_must_match_the_export() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let adding = fixtures::adding_calculator();
	for ( constructors, export, declared, exported ) in [
		( r#"[{ params = ["string"] }]"#, "[constructor]calc", "string", "" ),
		( r#"[{}, { function = "with-offset", params = ["i32"] }]"#, "[static]calc.with-offset", "i32", "s32" ),
	] {
		let manifest = format!( "artifact = \"calc.wat\"\nclass = \"calc\"\n[[classes]]\nname = \"calc\"\nconstructors = {}\n", constructors );
		let host = fixtures::host::<dyn Calculator>( CountingStore::new()
			.with_bundle( &key, &[( "bundle.toml", manifest.as_str() ), ( "calc.wat", adding )]));
		let instantiator = InstantiatorKey::for_package( key.clone(), "calc" ).expect( "Invalid key" );

		match host.factory.resolve( &instantiator ) {
			Err( err @ InstantiatorError::Creation { source: ResolveError::ConstructorMismatch { .. }, .. }) => {
				assert_eq!( err.kind(), ErrorKind::Creation );
				let InstantiatorError::Creation { source: ResolveError::ConstructorMismatch { export: rejected, declared: declared_signature, exported: exported_signature, .. }, .. } = err else { unreachable!() };
				assert_eq!( rejected, export );
				assert_eq!( declared_signature.as_str(), declared );
				assert_eq!( exported_signature.as_str(), exported );
			}
			value => panic!( "Expected ConstructorMismatch error for {}, found: {:#?}", constructors, value ),
		}
		assert!( host.factory.is_empty() );
	}

}

#[test]
fn undeclared_parameters_are_taken_from_the_export() {

	let manifest = r#"
		artifact = "calc.wat"
		class = "calc"
		[[classes]]
		name = "calc"
		constructors = [{}, { function = "with-offset" }]
	"# ;
	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let adding = fixtures::adding_calculator();
	let host = fixtures::host::<dyn Calculator>( CountingStore::new()
		.with_bundle( &key, &[( "bundle.toml", manifest ), ( "calc.wat", adding )]));
	let instantiator = InstantiatorKey::for_package( key, "calc" ).expect( "Invalid key" );

	let factories = host.factory.resolve( &instantiator ).expect( "Failed to resolve" );
	assert_eq!( factories.signatures(), vec![ ConstructorSignature::empty(), ConstructorSignature::from_params([ "s32" ])]);
	let calculator = host.factory.instantiate( &instantiator, &[ 4_i32.into_val() ]).expect( "Failed to instantiate" );
	assert_eq!( calculator.calculate( 1, 1 ).expect( "Call failed" ), 6 );

}
