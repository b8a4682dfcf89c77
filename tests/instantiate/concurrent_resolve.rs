use std::sync::Arc ;
use std::time::Duration ;
use wasm_hotload::{ InstantiatorKey, IntoVal };
use crate::fixtures::{ self, Calculator, CountingStore };

#[test]
fn concurrent_resolution_publishes_one_factory_set() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let host = fixtures::host::<dyn Calculator>( CountingStore::with_delay( Duration::from_millis( 100 ))
		.with_calculator( &key, fixtures::adding_calculator() ));
	let instantiator = InstantiatorKey::for_package( key, "calc" ).expect( "Invalid key" );

	let resolved = std::thread::scope(| scope | {
		let handles = ( 0..8 )
			.map(|_| scope.spawn(|| host.factory.resolve( &instantiator )))
			.collect::<Vec<_>>();
		handles.into_iter()
			.map(| handle | handle.join().expect( "Resolver panicked" ).expect( "Failed to resolve" ))
			.collect::<Vec<_>>()
	});

	let first = &resolved[ 0 ];
	assert!( resolved.iter().all(| factories | Arc::ptr_eq( factories, first )));
	assert!( Arc::ptr_eq( first, &host.factory.cached( &instantiator ).expect( "Key was not cached" )));
	assert_eq!( host.store.fetches(), 1 );
	assert_eq!( host.factory.len(), 1 );

}

#[test]
fn concurrent_instantiation_shares_the_context() {

	let key = fixtures::package_key( "demo.calc", "1.0.0" );
	let host = fixtures::host::<dyn Calculator>( CountingStore::with_delay( Duration::from_millis( 50 ))
		.with_calculator( &key, fixtures::adding_calculator() ));
	let instantiator = InstantiatorKey::for_package( key, "calc" ).expect( "Invalid key" );

	let results = std::thread::scope(| scope | {
		let handles = ( 0..6_i32 )
			.map(| offset | {
				let factory = &host.factory ;
				let instantiator = &instantiator ;
				scope.spawn( move || {
					let calculator = factory.instantiate( instantiator, &[ offset.into_val() ]).expect( "Failed to instantiate" );
					calculator.calculate( offset, 1 ).expect( "Call failed" )
				})
			})
			.collect::<Vec<_>>();
		handles.into_iter().map(| handle | handle.join().expect( "Caller panicked" )).collect::<Vec<_>>()
	});

	assert_eq!( results, vec![ 1, 3, 5, 7, 9, 11 ]);
	assert_eq!( host.store.fetches(), 1 );
	let factories = host.factory.cached( &instantiator ).expect( "Key was not cached" );
	assert_eq!( factories.context().live_instances(), 0 );

}
