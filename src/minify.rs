//! The opaque minifier contract (spec §1: "treated as opaque transformers with a documented
//! contract"). This crate never implements actual JS/CSS minification; it defines the trait seam
//! and a passthrough default used whenever [`crate::config::BundleOptions::minify`] is `false`.

/// Transforms concatenated client js into minified js. Implementations may assume the input is
/// valid, already-linked js (the concatenation [`crate::bundle::Bundle::write_to_directory`]
/// produces); they must not change the set of globals the bundle's linked code relies on.
pub trait JsMinifier: Send + Sync {
    fn minify(&self, source: &[u8]) -> crate::error::Result<Vec<u8>>;
}

/// Transforms concatenated client css into minified css.
pub trait CssMinifier: Send + Sync {
    fn minify(&self, source: &[u8]) -> crate::error::Result<Vec<u8>>;
}

/// Returns the input unchanged. Used when minification is disabled rather than special-casing
/// "no minifier" throughout the write path.
pub struct PassthroughMinifier;

impl JsMinifier for PassthroughMinifier {
    fn minify(&self, source: &[u8]) -> crate::error::Result<Vec<u8>> {
        Ok(source.to_vec())
    }
}

impl CssMinifier for PassthroughMinifier {
    fn minify(&self, source: &[u8]) -> crate::error::Result<Vec<u8>> {
        Ok(source.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input_unchanged() {
        let m = PassthroughMinifier;
        assert_eq!(JsMinifier::minify(&m, b"var x=1;").unwrap(), b"var x=1;");
        assert_eq!(CssMinifier::minify(&m, b"a{color:red}").unwrap(), b"a{color:red}");
    }
}
