use std::path::Path ;
use wasmtime::Engine ;
use wasmtime::component::Component ;



/// Turns a plugin artifact on disk into a compiled component.
///
/// This is the only place plugin code is compiled. Hosts that keep precompiled
/// artifacts, or that want to verify signatures first, supply their own.
pub trait Materializer: Send + Sync {
	/// # Errors
	/// Any error raised while reading or compiling the artifact.
	fn materialize( &self, engine: &Engine, artifact: &Path ) -> Result<Component, wasmtime::Error> ;
}

/// Compiles binary or text components with the engine's configuration.
#[derive( Debug, Clone, Copy, Default )]
pub struct ComponentMaterializer ;

impl ComponentMaterializer {
	/// File extensions recognised as plugin artifacts.
	pub const EXTENSIONS: [&'static str; 2] = [ "wasm", "wat" ];
}

impl Materializer for ComponentMaterializer {
	fn materialize( &self, engine: &Engine, artifact: &Path ) -> Result<Component, wasmtime::Error> {
		let bytes = std::fs::read( artifact )?;
		Component::new( engine, bytes )
	}
}
