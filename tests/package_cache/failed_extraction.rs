use std::sync::Arc ;
use std::time::Duration ;
use wasm_hotload::{ AcquireError, AcquireOptions, PackageCache };
use crate::fixtures::{ self, CountingStore };

#[test]
fn corrupted_archive_is_cleaned_up_and_retried() {

	fixtures::init_tracing();
	let root = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.broken", "1.0.0" );
	let store = Arc::new( CountingStore::new() );
	store.insert_raw( &key, b"definitely not a zip archive".to_vec() );
	let cache = PackageCache::new( root.path(), Arc::clone( &store ))
		.with_options( AcquireOptions { deadline: Duration::from_millis( 250 ), poll_interval: Duration::from_millis( 25 )});

	match cache.acquire( &key ) {
		Err( AcquireError::Timeout { last_error: Some( last_error ), .. }) => assert!( last_error.contains( "demo.broken" ), "{}", last_error ),
		value => panic!( "Expected Timeout error, found: {:#?}", value ),
	}
	assert!( store.fetches() > 1, "Extraction was not retried" );
	assert!( fixtures::entries( root.path() ).is_empty(), "Partial package left behind: {:?}", fixtures::entries( root.path() ));

}

#[test]
fn retry_succeeds_once_the_archive_is_fixed() {

	let root = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.fixed", "1.0.0" );
	let store = Arc::new( CountingStore::new() );
	store.insert_raw( &key, Vec::new() );
	let cache = PackageCache::new( root.path(), Arc::clone( &store ))
		.with_options( AcquireOptions { deadline: Duration::from_secs( 10 ), poll_interval: Duration::from_millis( 50 )});

	let repaired = CountingStore::new().with_calculator( &key, fixtures::adding_calculator() );
	let acquired = std::thread::scope(| scope | {
		let acquirer = scope.spawn(|| cache.acquire( &key ));
		std::thread::sleep( Duration::from_millis( 120 ));
		let scratch = fixtures::temp_dir();
		let archive = wasm_hotload::BundleStore::fetch_bundle( &repaired, &key, scratch.path() ).expect( "Failed to fetch repaired bundle" );
		store.insert_raw( &key, std::fs::read( archive ).expect( "Failed to read repaired bundle" ));
		acquirer.join().expect( "Acquirer panicked" )
	});

	let path = acquired.expect( "Failed to acquire package" );
	assert!( path.join( "bundle.toml" ).is_file() );
	assert!( store.fetches() > 1 );

}
