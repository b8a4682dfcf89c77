use std::path::Path ;
use std::sync::Arc ;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::time::Duration ;
use wasm_hotload::{ AcquireError, AcquireOptions, ArchiveError, ArchiveFormat, PackageCache, ZipFormat };
use crate::fixtures::{ self, CountingStore };

/// Unpacks zip archives, counting them.
#[derive( Default )]
struct CountingFormat {
	extractions: AtomicUsize,
}

impl ArchiveFormat for CountingFormat {
	fn extract( &self, archive: &Path, destination: &Path ) -> Result<(), ArchiveError> {
		self.extractions.fetch_add( 1, Ordering::SeqCst );
		ZipFormat.extract( archive, destination )
	}
}

/// Treats the archive as a single artifact file, the way a store serving bare
/// components would.
struct BareArtifact ;

impl ArchiveFormat for BareArtifact {
	fn extract( &self, archive: &Path, destination: &Path ) -> Result<(), ArchiveError> {
		std::fs::copy( archive, destination.join( "calc.wat" ))?;
		std::fs::write( destination.join( "bundle.toml" ), fixtures::CALC_MANIFEST )?;
		Ok(())
	}
}

#[test]
fn configured_format_unpacks_the_bundle() {

	let root = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.pkg", "1.0.0" );
	let format = Arc::new( CountingFormat::default() );
	let cache = PackageCache::new( root.path(), CountingStore::new().with_calculator( &key, fixtures::adding_calculator() ))
		.with_archive_format( ArcFormat( Arc::clone( &format )));

	let path = cache.acquire( &key ).expect( "Failed to acquire package" );
	cache.acquire( &key ).expect( "Failed to acquire package" );

	assert!( path.join( "calc.wat" ).is_file() );
	assert_eq!( format.extractions.load( Ordering::SeqCst ), 1 );

}

#[test]
fn non_zip_bundles_are_unpacked_by_their_format() {

	let root = fixtures::temp_dir();
	let key = fixtures::package_key( "demo.bare", "1.0.0" );
	let store = CountingStore::new();
	store.insert_raw( &key, fixtures::adding_calculator().as_bytes().to_vec() );
	let cache = PackageCache::new( root.path(), store ).with_archive_format( BareArtifact );

	let path = cache.acquire( &key ).expect( "Failed to acquire package" );
	assert_eq!( std::fs::read_to_string( path.join( "calc.wat" )).expect( "Failed to read artifact" ), fixtures::adding_calculator() );
	assert_eq!( fixtures::entries( &path ), vec![ "bundle.toml".to_string(), "calc.wat".to_string() ]);

	// The default zip format would have rejected the same bytes.
	let zip_root = fixtures::temp_dir();
	let zip_store = CountingStore::new();
	zip_store.insert_raw( &key, fixtures::adding_calculator().as_bytes().to_vec() );
	let zip_cache = PackageCache::new( zip_root.path(), zip_store )
		.with_options( AcquireOptions { deadline: Duration::from_millis( 100 ), poll_interval: Duration::from_millis( 20 )});
	match zip_cache.acquire( &key ) {
		Err( AcquireError::Timeout { last_error: Some( _ ), .. }) => {}
		value => panic!( "Expected Timeout error, found: {:#?}", value ),
	}

}

/// Shares one format between the cache and the test.
struct ArcFormat( Arc<CountingFormat> );

impl ArchiveFormat for ArcFormat {
	fn extract( &self, archive: &Path, destination: &Path ) -> Result<(), ArchiveError> {
		self.0.extract( archive, destination )
	}
}
