//! [`Resource`]: the tagged record a compile handler emits for one source file.

use serde::{Deserialize, Serialize};

/// The kind of a compiled resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Js,
    Css,
    Head,
    Body,
    Static,
}

impl ResourceKind {
    /// `head`, `body` and `css` resources only make sense on the client; `css` for a non-client
    /// arch is silently dropped (a documented legacy quirk, see design notes), `head`/`body` are
    /// fatal.
    pub const fn is_client_only(self) -> bool {
        matches!(self, Self::Css | Self::Head | Self::Body)
    }
}

/// A single unit of compiled output: one source file's worth of served content (or an HTML-segment
/// fragment that isn't served directly).
#[derive(Clone, Debug)]
pub struct Resource {
    pub kind: ResourceKind,
    pub data: Vec<u8>,
    /// Absolute-style served path, slash-normalized. Unused (and ignored) for `head`/`body`.
    pub serve_path: Option<String>,
}

impl Resource {
    pub fn static_file(serve_path: impl Into<String>, data: Vec<u8>) -> Self {
        Self { kind: ResourceKind::Static, data, serve_path: Some(serve_path.into()) }
    }

    pub fn js(serve_path: impl Into<String>, data: Vec<u8>) -> Self {
        Self { kind: ResourceKind::Js, data, serve_path: Some(serve_path.into()) }
    }

    pub fn css(serve_path: impl Into<String>, data: Vec<u8>) -> Self {
        Self { kind: ResourceKind::Css, data, serve_path: Some(serve_path.into()) }
    }

    pub fn head(data: Vec<u8>) -> Self {
        Self { kind: ResourceKind::Head, data, serve_path: None }
    }

    pub fn body(data: Vec<u8>) -> Self {
        Self { kind: ResourceKind::Body, data, serve_path: None }
    }
}
