//! Extension handler registration and the per-slice registry composed from a package and its
//! direct dependencies.

use crate::{
    arch::Arch,
    error::{BuildError, Result},
    resource::Resource,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Sink a handler uses to emit resources for the file it was invoked on.
pub struct CompileSink<'a> {
    resources: &'a mut Vec<Resource>,
}

impl<'a> CompileSink<'a> {
    pub fn new(resources: &'a mut Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.push(resource);
    }
}

/// Transforms one source file of a recognized extension into zero or more [`Resource`]s.
///
/// Handlers are invoked synchronously; the [`CompileSink`] passed to [`compile`](Self::compile) is
/// only valid for the duration of that call.
pub trait ExtensionHandler: Send + Sync {
    /// Invoked once per matching source file.
    fn compile(
        &self,
        sink: &mut CompileSink<'_>,
        source_bytes: &[u8],
        serve_path: &str,
        arch: Arch,
    ) -> Result<()>;
}

/// Emits the file's bytes unchanged as a `js` resource. Used for the `js` extension when a
/// package registers it explicitly rather than relying on the handler-less static fallback.
pub struct PassthroughJsHandler;

impl ExtensionHandler for PassthroughJsHandler {
    fn compile(
        &self,
        sink: &mut CompileSink<'_>,
        source_bytes: &[u8],
        serve_path: &str,
        _arch: Arch,
    ) -> Result<()> {
        sink.add_resource(Resource::js(serve_path, source_bytes.to_vec()));
        Ok(())
    }
}

/// Emits the file's bytes unchanged as a `css` resource.
pub struct PassthroughCssHandler;

impl ExtensionHandler for PassthroughCssHandler {
    fn compile(
        &self,
        sink: &mut CompileSink<'_>,
        source_bytes: &[u8],
        serve_path: &str,
        _arch: Arch,
    ) -> Result<()> {
        sink.add_resource(Resource::css(serve_path, source_bytes.to_vec()));
        Ok(())
    }
}

/// Forces a file to be emitted as a `static` resource regardless of extension-registry presence;
/// useful for packages that want handler bookkeeping (e.g. size logging) without transforming the
/// bytes.
pub struct StaticFileHandler;

impl ExtensionHandler for StaticFileHandler {
    fn compile(
        &self,
        sink: &mut CompileSink<'_>,
        source_bytes: &[u8],
        serve_path: &str,
        _arch: Arch,
    ) -> Result<()> {
        sink.add_resource(Resource::static_file(serve_path, source_bytes.to_vec()));
        Ok(())
    }
}

/// Maps a file extension (without the leading dot) to the handler that compiles it, tagged with
/// the name of the package that registered it so conflicts can be reported by name.
#[derive(Clone)]
pub struct ExtensionRegistry {
    handlers: BTreeMap<String, (String, Arc<dyn ExtensionHandler>)>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Registers `handler` for `extension` under `provider`'s name.
    ///
    /// Fails if this registry (i.e. the same package) already has a handler for `extension`;
    /// registering twice within one package is a configuration error distinct from the
    /// cross-package [`BuildError::ExtensionConflict`] raised by [`Self::compose`].
    pub fn register(
        &mut self,
        extension: impl Into<String>,
        provider: impl Into<String>,
        handler: Arc<dyn ExtensionHandler>,
    ) -> Result<()> {
        let extension = extension.into();
        if self.handlers.contains_key(&extension) {
            return Err(BuildError::config(format!(
                "extension \".{extension}\" is already registered"
            )));
        }
        self.handlers.insert(extension, (provider.into(), handler));
        Ok(())
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn ExtensionHandler>> {
        self.handlers.get(extension).map(|(_, h)| h)
    }

    pub fn provider(&self, extension: &str) -> Option<&str> {
        self.handlers.get(extension).map(|(p, _)| p.as_str())
    }

    /// Builds the effective registry for a slice: the union of `own` and every dependency
    /// registry in `deps`. Two distinct handlers for the same extension is a fatal
    /// [`BuildError::ExtensionConflict`] naming both providers.
    pub fn compose<'a>(
        own: &ExtensionRegistry,
        deps: impl IntoIterator<Item = &'a ExtensionRegistry>,
    ) -> Result<ExtensionRegistry> {
        let mut merged = own.clone();
        for dep in deps {
            for (ext, (provider, handler)) in &dep.handlers {
                match merged.handlers.get(ext) {
                    None => {
                        merged.handlers.insert(ext.clone(), (provider.clone(), handler.clone()));
                    }
                    Some((existing_provider, _)) if existing_provider != provider => {
                        return Err(BuildError::ExtensionConflict {
                            extension: ext.clone(),
                            first: existing_provider.clone(),
                            second: provider.clone(),
                        });
                    }
                    Some(_) => {
                        // Same provider registering the same extension via two dependency paths;
                        // not a conflict.
                    }
                }
            }
        }
        Ok(merged)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_merges_disjoint_registries() {
        let mut a = ExtensionRegistry::new();
        a.register("less", "x", Arc::new(PassthroughCssHandler)).unwrap();
        let mut b = ExtensionRegistry::new();
        b.register("coffee", "y", Arc::new(PassthroughJsHandler)).unwrap();

        let merged = ExtensionRegistry::compose(&a, [&b]).unwrap();
        assert!(merged.get("less").is_some());
        assert!(merged.get("coffee").is_some());
    }

    #[test]
    fn compose_fails_on_conflicting_providers() {
        let mut x = ExtensionRegistry::new();
        x.register("less", "x", Arc::new(PassthroughCssHandler)).unwrap();
        let mut y = ExtensionRegistry::new();
        y.register("less", "y", Arc::new(PassthroughCssHandler)).unwrap();

        let empty = ExtensionRegistry::new();
        let err = ExtensionRegistry::compose(&empty, [&x, &y]).unwrap_err();
        match err {
            BuildError::ExtensionConflict { extension, first, second } => {
                assert_eq!(extension, "less");
                assert_eq!(first, "x");
                assert_eq!(second, "y");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
