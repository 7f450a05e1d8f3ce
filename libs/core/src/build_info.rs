//! Build metadata captured at compile time.

/// Short git commit hash of the build, or `unknown` outside a git checkout.
pub const GIT_HASH: &str = env!("VDBENCH_GIT_HASH");

/// RFC 3339 timestamp of the build.
pub const BUILD_TIMESTAMP: &str = env!("VDBENCH_BUILD_TIMESTAMP");

/// Format the one-line banner printed by binaries at startup.
///
/// ```
/// let line = vdbench_core::build_info::banner("vdbench", "0.1.0");
/// assert!(line.starts_with("Run on vdbench v0.1.0"));
/// ```
pub fn banner(name: &str, version: &str) -> String {
    format!("Run on {} v{} ({}, built {})", name, version, GIT_HASH, BUILD_TIMESTAMP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_contains_git_hash() {
        let line = banner("vdbench", "1.2.3");
        assert!(line.starts_with("Run on vdbench v1.2.3 ("));
        assert!(line.contains(GIT_HASH));
    }

    #[test]
    fn test_metadata_not_empty() {
        assert!(!GIT_HASH.is_empty());
        assert!(!BUILD_TIMESTAMP.is_empty());
    }
}
