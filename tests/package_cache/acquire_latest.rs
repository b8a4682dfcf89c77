use wasm_hotload::{ AcquireError, DirectoryBundleStore, PackageCache };
use crate::fixtures ;

#[test]
fn acquire_latest_picks_highest_version() {

	let repository = fixtures::temp_dir();
	let root = fixtures::temp_dir();
	for version in [ "1.2.0", "1.10.0", "1.9.3" ] {
		fixtures::publish_calculator( repository.path(), &fixtures::package_key( "demo.calc", version ), fixtures::adding_calculator() );
	}
	let cache = PackageCache::new( root.path(), DirectoryBundleStore::new([ repository.path() ]));

	let ( key, path ) = cache.acquire_latest( "demo.calc" ).expect( "Failed to acquire latest version" );
	assert_eq!( key.version(), "1.10.0" );
	assert_eq!( path, root.path().join( "demo.calc.1.10.0" ));
	assert!( path.join( "calc.wat" ).is_file() );

}

#[test]
fn acquire_latest_of_unknown_package() {

	let repository = fixtures::temp_dir();
	let root = fixtures::temp_dir();
	let cache = PackageCache::new( root.path(), DirectoryBundleStore::new([ repository.path() ]));

	match cache.acquire_latest( "demo.calc" ) {
		Err( AcquireError::PackageNotFound( id )) => assert_eq!( id, "demo.calc" ),
		value => panic!( "Expected PackageNotFound error, found: {:#?}", value ),
	}

}
