//! Voxel scene interchange.
//!
//! A [`Context`] owns a registry of named formats and a stack of outstanding
//! errors. Scenes are converted to and from [`Payload`]s by name:
//!
//! ```
//! let mut ctx = gvox::Context::new();
//! let scene = gvox::Scene::from_node(gvox::SceneNode::new(4, 4, 4));
//! let payload = ctx.serialize(&scene, "gvox_u32_palette").unwrap();
//! assert_eq!(ctx.parse(&payload, "gvox_u32_palette").unwrap(), scene);
//! ```

#[cfg(test)]
mod tests;

mod error;
#[cfg(feature = "file-io")]
mod file_io;
pub mod formats;
mod results;
mod scene;
mod wire;

pub use error::{ErrorType, GvoxError};
#[cfg(feature = "file-io")]
pub use file_io::FileHeader;
pub use scene::{Payload, Scene, SceneNode, Voxel};

use fxhash::FxHashMap;
use results::ResultStack;

bitflags::bitflags! {
    /// Operations a format is able to perform.
    pub struct FormatCapabilities: u32 {
        const PARSE = 1 << 0;
        const SERIALIZE = 1 << 1;
    }
}

/// Associates a format with the name it is registered under.
pub trait NamedFormat {
    fn name() -> &'static str;
}

/// Describes a format that can be registered with [`Context::register_format`].
pub trait FormatDescriptor: NamedFormat {
    type Handler: FormatHandler;
}

/// The operations of a format. One handler is created per context when the
/// format is registered and is destroyed when it is replaced or the context is
/// dropped.
///
/// Only [`FormatHandler::create`] is required. A format that leaves
/// `create_payload` or `parse_payload` unimplemented fails with
/// [`ErrorType::FailedToLoadFormat`] when that operation is first used.
pub trait FormatHandler: Sized + Send + 'static {
    fn create() -> Result<Self, GvoxError>;

    fn destroy(self) -> Result<(), GvoxError> {
        Ok(())
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities::all()
    }

    fn create_payload(&mut self, _scene: &Scene) -> Result<Payload, GvoxError> {
        Err(GvoxError::failed_to_load_format(
            "format does not implement serialization",
        ))
    }

    fn parse_payload(&mut self, _payload: &Payload) -> Result<Scene, GvoxError> {
        Err(GvoxError::failed_to_load_format(
            "format does not implement parsing",
        ))
    }

    fn destroy_payload(&mut self, payload: Payload) {
        drop(payload);
    }
}

/// Object safe view of a [`FormatHandler`], as stored in the registry.
trait ErasedHandler: Send {
    fn erased_capabilities(&self) -> FormatCapabilities;
    fn erased_create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError>;
    fn erased_parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError>;
    fn erased_destroy_payload(&mut self, payload: Payload);
    fn erased_destroy(self: Box<Self>) -> Result<(), GvoxError>;
}

impl<H: FormatHandler> ErasedHandler for H {
    fn erased_capabilities(&self) -> FormatCapabilities {
        self.capabilities()
    }

    fn erased_create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        self.create_payload(scene)
    }

    fn erased_parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        self.parse_payload(payload)
    }

    fn erased_destroy_payload(&mut self, payload: Payload) {
        self.destroy_payload(payload)
    }

    fn erased_destroy(self: Box<Self>) -> Result<(), GvoxError> {
        (*self).destroy()
    }
}

type HandlerFactory = Box<dyn FnOnce() -> Result<Box<dyn ErasedHandler>, GvoxError> + Send>;

/// A format registration record: a unique name and the means to create the
/// format's handler.
pub struct FormatLoaderInfo {
    name: String,
    create: HandlerFactory,
}

impl FormatLoaderInfo {
    /// Record for a statically described format.
    pub fn of<D: FormatDescriptor>() -> Self {
        Self::with_name::<D::Handler>(D::name())
    }

    /// Record registering handler type `H` under an arbitrary name.
    pub fn with_name<H: FormatHandler>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: Box::new(|| {
                H::create().map(|handler| Box::new(handler) as Box<dyn ErasedHandler>)
            }),
        }
    }

    /// Record registering an already constructed handler.
    pub fn from_handler<H: FormatHandler>(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            create: Box::new(move || Ok(Box::new(handler) as Box<dyn ErasedHandler>)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for FormatLoaderInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatLoaderInfo")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Maximum number of errors kept on the result stack. Older errors are
    /// discarded first.
    pub max_results: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_results: 64 }
    }
}

pub struct Context {
    formats: FxHashMap<String, Box<dyn ErasedHandler>>,
    results: ResultStack,
    #[cfg(feature = "file-io")]
    root_paths: Vec<std::path::PathBuf>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Context {
            formats: FxHashMap::default(),
            results: ResultStack::new(config.max_results),
            #[cfg(feature = "file-io")]
            root_paths: Vec::new(),
        }
    }

    /// Pushes the error of a failed call onto the result stack.
    fn record<T>(&mut self, result: Result<T, GvoxError>) -> Result<T, GvoxError> {
        if let Err(e) = &result {
            log::debug!("{e}");
            self.results.push(e.clone());
        }
        result
    }

    fn insert_format(&mut self, info: FormatLoaderInfo) -> Result<(), GvoxError> {
        let FormatLoaderInfo { name, create } = info;
        let handler = create().map_err(|e| {
            GvoxError::failed_to_load_format(format!(
                "failed to create format '{name}': {}",
                e.message()
            ))
        })?;
        if let Some(old) = self.formats.insert(name.clone(), handler) {
            log::debug!("replacing format '{name}'");
            if let Err(e) = old.erased_destroy() {
                log::warn!("failed to destroy replaced format '{name}': {e}");
            }
        } else {
            log::debug!("registered format '{name}'");
        }
        Ok(())
    }

    /// Registers a statically described format, replacing any format with the
    /// same name. The replaced handler is destroyed immediately.
    pub fn register_format<D: FormatDescriptor>(&mut self) -> Result<(), GvoxError> {
        self.register_format_info(FormatLoaderInfo::of::<D>())
    }

    pub fn register_format_info(&mut self, info: FormatLoaderInfo) -> Result<(), GvoxError> {
        let result = self.insert_format(info);
        self.record(result)
    }

    fn load_builtin(&mut self, name: &str) -> Result<(), GvoxError> {
        match formats::builtin(name) {
            Some(info) => {
                log::trace!("loading built-in format '{name}'");
                self.insert_format(info)
            }
            None => Err(GvoxError::failed_to_load_format(format!(
                "no format named '{name}' is registered or built in"
            ))),
        }
    }

    /// Makes a built-in format available without explicit registration. Does
    /// nothing if a format with that name is already registered.
    pub fn load_format(&mut self, name: &str) -> Result<(), GvoxError> {
        if self.formats.contains_key(name) {
            return Ok(());
        }
        let result = self.load_builtin(name);
        self.record(result)
    }

    pub fn has_format(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    /// Names of the registered formats, sorted.
    pub fn format_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn format_capabilities(&self, name: &str) -> Option<FormatCapabilities> {
        self.formats.get(name).map(|handler| handler.erased_capabilities())
    }

    fn resolve(&mut self, name: &str) -> Result<&mut (dyn ErasedHandler + 'static), GvoxError> {
        if !self.formats.contains_key(name) {
            self.load_builtin(name)?;
        }
        match self.formats.get_mut(name) {
            Some(handler) => Ok(handler.as_mut()),
            None => Err(GvoxError::failed_to_load_format(format!(
                "format '{name}' is not registered"
            ))),
        }
    }

    fn parse_impl(&mut self, payload: &Payload, src_format: &str) -> Result<Scene, GvoxError> {
        let handler = self.resolve(src_format)?;
        if !handler.erased_capabilities().contains(FormatCapabilities::PARSE) {
            return Err(GvoxError::failed_to_load_format(format!(
                "format '{src_format}' cannot parse payloads"
            )));
        }
        handler.erased_parse_payload(payload)
    }

    fn serialize_impl(&mut self, scene: &Scene, dst_format: &str) -> Result<Payload, GvoxError> {
        let handler = self.resolve(dst_format)?;
        if !handler.erased_capabilities().contains(FormatCapabilities::SERIALIZE) {
            return Err(GvoxError::failed_to_load_format(format!(
                "format '{dst_format}' cannot serialize scenes"
            )));
        }
        handler.erased_create_payload(scene)
    }

    /// Decodes `payload` with the format named `src_format`. On failure exactly
    /// one error is pushed onto the result stack.
    pub fn parse(&mut self, payload: &Payload, src_format: &str) -> Result<Scene, GvoxError> {
        let result = self.parse_impl(payload, src_format);
        self.record(result)
    }

    /// Encodes `scene` with the format named `dst_format`. On failure exactly
    /// one error is pushed onto the result stack.
    pub fn serialize(&mut self, scene: &Scene, dst_format: &str) -> Result<Payload, GvoxError> {
        let result = self.serialize_impl(scene, dst_format);
        self.record(result)
    }

    /// Like [`Context::serialize`], appending the encoded bytes to `dst`.
    /// Returns the number of bytes written. `dst` is untouched on failure.
    pub fn serialize_into(
        &mut self,
        scene: &Scene,
        dst_format: &str,
        dst: &mut Vec<u8>,
    ) -> Result<usize, GvoxError> {
        let payload = self.serialize(scene, dst_format)?;
        dst.extend_from_slice(payload.as_bytes());
        let written = payload.as_bytes().len();
        if let Some(handler) = self.formats.get_mut(dst_format) {
            handler.erased_destroy_payload(payload);
        }
        Ok(written)
    }

    /// Hands a payload produced by `format` back to it for release.
    pub fn destroy_payload(&mut self, payload: Payload, format: &str) -> Result<(), GvoxError> {
        let result = self
            .resolve(format)
            .map(|handler| handler.erased_destroy_payload(payload));
        self.record(result)
    }

    pub fn destroy_scene(&self, scene: Scene) {
        drop(scene);
    }

    /// Kind of the most recent outstanding error, if any.
    pub fn result(&self) -> Option<ErrorType> {
        self.results.top_type()
    }

    /// `0` when no error is outstanding, otherwise the negative code of the
    /// most recent error.
    pub fn result_code(&self) -> i32 {
        self.result().map_or(0, ErrorType::code)
    }

    pub fn result_message(&self) -> Option<&str> {
        self.results.top().map(GvoxError::message)
    }

    /// Copies the most recent error message into `buf`, truncating if it does
    /// not fit, and returns the full message length. Call with an empty buffer
    /// first to learn the required size.
    pub fn copy_result_message(&self, buf: &mut [u8]) -> usize {
        let message = self.result_message().unwrap_or_default().as_bytes();
        let n = message.len().min(buf.len());
        buf[..n].copy_from_slice(&message[..n]);
        message.len()
    }

    pub fn pop_result(&mut self) -> Option<GvoxError> {
        self.results.pop()
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        for (name, handler) in self.formats.drain() {
            if let Err(e) = handler.erased_destroy() {
                log::warn!("failed to destroy format '{name}': {e}");
            }
        }
        self.results.clear();
    }
}
