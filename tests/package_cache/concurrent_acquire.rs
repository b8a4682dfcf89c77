use std::sync::Arc ;
use std::time::Duration ;
use wasm_hotload::{ PackageCache, lock_path };
use crate::fixtures::{ self, CountingStore };

#[test]
fn concurrent_acquire_fetches_once() {

	fixtures::init_tracing();
	let root = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.pkg", "1.0.0" );
	let store = Arc::new( CountingStore::with_delay( Duration::from_millis( 100 ))
		.with_calculator( &key, fixtures::adding_calculator() ));
	let cache = PackageCache::new( root.path(), Arc::clone( &store ));

	let paths = std::thread::scope(| scope | {
		let handles = ( 0..8 )
			.map(|_| scope.spawn(|| cache.acquire( &key )))
			.collect::<Vec<_>>();
		handles.into_iter()
			.map(| handle | handle.join().expect( "Acquirer panicked" ).expect( "Failed to acquire package" ))
			.collect::<Vec<_>>()
	});

	let expected = root.path().join( "demo.pkg.1.0.0" );
	assert!( paths.iter().all(| path | *path == expected ), "Acquirers disagree: {:#?}", paths );
	assert_eq!( store.fetches(), 1 );
	assert!( expected.join( "bundle.toml" ).is_file() );
	assert!( expected.join( "calc.wat" ).is_file() );
	assert!( !lock_path( &expected ).exists(), "Lock file left behind" );
	assert_eq!( fixtures::entries( root.path() ), vec![ "demo.pkg.1.0.0".to_string() ]);

}

#[test]
fn acquire_after_unpack_is_a_directory_check() {

	let root = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.pkg", "1.0" );
	let store = Arc::new( CountingStore::new().with_calculator( &key, fixtures::adding_calculator() ));
	let cache = PackageCache::new( root.path(), Arc::clone( &store ));

	let first = cache.acquire( &key ).expect( "Failed to acquire package" );
	let second = cache.acquire( &key ).expect( "Failed to acquire package" );

	assert_eq!( first, second );
	assert_eq!( first, cache.package_path( &key ));
	assert_eq!( store.fetches(), 1 );

}
