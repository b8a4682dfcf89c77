use wasm_hotload::{ BundleError, BundleStore, DirectoryBundleStore };
use crate::fixtures ;

#[test]
fn repositories_are_searched_in_order() {

	let first = fixtures::temp_dir();
	let second = fixtures::temp_dir();
	let scratch = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	fixtures::write_bundle( &second.path().join( "demo.calc.1.0.0.zip" ), &[( "origin", "second" )]);
	let store = DirectoryBundleStore::new([ first.path(), second.path() ]);

	let archive = store.fetch_bundle( &key, scratch.path() ).expect( "Failed to fetch bundle" );
	assert_eq!( archive.parent(), Some( scratch.path() ));

	fixtures::write_bundle( &first.path().join( "demo.calc.1.0.0.zip" ), &[( "origin", "first" )]);
	let archive = store.fetch_bundle( &key, scratch.path() ).expect( "Failed to fetch bundle" );
	let mut zip = zip::ZipArchive::new( std::fs::File::open( archive ).expect( "Failed to open archive" )).expect( "Invalid archive" );
	let mut origin = String::new();
	std::io::Read::read_to_string( &mut zip.by_name( "origin" ).expect( "Missing entry" ), &mut origin ).expect( "Failed to read entry" );
	assert_eq!( origin, "first" );

}

#[test]
fn missing_bundle_is_not_found() {

	let repository = fixtures::temp_dir();
	let scratch = fixtures::temp_dir();
	let store = DirectoryBundleStore::new([ repository.path() ]);

	match store.fetch_bundle( &fixtures::package_key( "demo.calc", "1.0.0" ), scratch.path() ) {
		Err( BundleError::NotFound( name )) => assert_eq!( name, "demo.calc.1.0.0" ),
		value => panic!( "Expected NotFound error, found: {:#?}", value ),
	}

}

#[test]
fn stored_bundle_can_be_fetched() {

	let source = fixtures::temp_dir();
	let repository = fixtures::temp_dir();
	let scratch = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.calc", "2.1" );
	let archive = source.path().join( "upload.zip" );
	fixtures::write_bundle( &archive, &[( "bundle.toml", fixtures::CALC_MANIFEST )]);

	let store = DirectoryBundleStore::new([ repository.path().join( "nested" )]);
	store.store_bundle( &key, &archive ).expect( "Failed to store bundle" );

	assert!( repository.path().join( "nested" ).join( "demo.calc.2.1.0.zip" ).is_file() );
	store.fetch_bundle( &key, scratch.path() ).expect( "Failed to fetch stored bundle" );
	assert_eq!( store.latest_version( "demo.calc" ).expect( "Failed to list versions" ).as_deref(), Some( "2.1.0" ));

}

#[test]
fn store_without_repository_fails() {

	let source = fixtures::temp_dir();
	let archive = source.path().join( "upload.zip" );
	fixtures::write_bundle( &archive, &[( "bundle.toml", fixtures::CALC_MANIFEST )]);
	let store = DirectoryBundleStore::new( Vec::<std::path::PathBuf>::new() );

	match store.store_bundle( &fixtures::package_key( "demo.calc", "1.0.0" ), &archive ) {
		Err( BundleError::Backend( _ )) => {}
		value => panic!( "Expected Backend error, found: {:#?}", value ),
	}

}

#[test]
fn latest_version_orders_revisions_and_pre_releases() {

	let first = fixtures::temp_dir();
	let second = fixtures::temp_dir();
	for ( repository, version ) in [( &first, "1.2.3" ), ( &first, "1.2.3.4-rc.1" ), ( &second, "1.2.3.4" ), ( &second, "1.10.0-beta" )] {
		fixtures::write_bundle( &repository.path().join( format!( "demo.calc.{}.zip", version )), &[( "origin", version )]);
	}
	fixtures::write_bundle( &second.path().join( "demo.calc.sub.9.0.0.zip" ), &[( "origin", "other package" )]);
	let store = DirectoryBundleStore::new([ first.path(), second.path() ]);

	assert_eq!( store.latest_version( "demo.calc" ).expect( "Failed to list versions" ).as_deref(), Some( "1.10.0-beta" ));
	std::fs::remove_file( second.path().join( "demo.calc.1.10.0-beta.zip" )).expect( "Failed to remove bundle" );
	assert_eq!( store.latest_version( "demo.calc" ).expect( "Failed to list versions" ).as_deref(), Some( "1.2.3.4" ));

}
