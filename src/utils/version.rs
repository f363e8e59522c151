//! Version information

/// Crate version baked in at build time
pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
