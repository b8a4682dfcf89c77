use std::sync::Arc ;
use wasm_hotload::PackageCache ;
use crate::fixtures::{ self, CountingStore };

#[test]
fn pre_populated_package_is_returned_without_fetching() {

	let root = fixtures::temp_dir();
	let existing = root.path().join( "demo.pkg.1.0.0" );
	std::fs::create_dir_all( &existing ).expect( "Failed to create package directory" );

	let store = Arc::new( CountingStore::new() );
	let cache = PackageCache::new( root.path(), Arc::clone( &store ));
	let path = cache.acquire( &fixtures::package_key( "demo.pkg", "1.0.0" )).expect( "Failed to acquire package" );

	assert_eq!( path, existing );
	assert_eq!( store.fetches(), 0 );

}
