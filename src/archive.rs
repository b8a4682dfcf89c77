use std::fs::File ;
use std::path::Path ;
use thiserror::Error ;



#[derive( Debug, Error )]
pub enum ArchiveError {
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
	#[error( "Zip error: {0}" )] Zip( #[from] zip::result::ZipError ),
	#[error( "Corrupted archive: {0}" )] Corrupted( String ),
}

/// Unpacks a bundle archive.
///
/// `destination` exists and is empty when `extract` is called. Implementations
/// need not clean up after a failure, the caller discards the directory.
pub trait ArchiveFormat: Send + Sync {
	/// # Errors
	/// Any [`ArchiveError`] raised while reading or writing.
	fn extract( &self, archive: &Path, destination: &Path ) -> Result<(), ArchiveError> ;
}

/// Zip archives, the format `DirectoryBundleStore` publishes.
#[derive( Debug, Clone, Copy, Default )]
pub struct ZipFormat ;

impl ArchiveFormat for ZipFormat {
	fn extract( &self, archive: &Path, destination: &Path ) -> Result<(), ArchiveError> {
		let mut archive = zip::ZipArchive::new( File::open( archive )? )?;
		if archive.len() == 0 { return Err( ArchiveError::Corrupted( "archive has no entries".to_string() )) }
		archive.extract( destination )?;
		Ok(())
	}
}
