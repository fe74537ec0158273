//! Qualified tool names.
//!
//! Tools from every server share one flat namespace on the model side, so
//! each raw tool name is prefixed with an identifier derived from its
//! server's URL: `identity + "__" + raw_name`.

use std::collections::HashSet;

/// Maximum length of a server identity before trimming.
pub const MAX_IDENTITY_LEN: usize = 40;

/// Separator between server identity and raw tool name.
pub const SEPARATOR: &str = "__";

/// Turn a server URL into an identifier-safe prefix.
///
/// Every character outside `[A-Za-z0-9]` becomes `_`, the result is cut to
/// [`MAX_IDENTITY_LEN`] characters and trimmed of `_` on both ends.
pub fn sanitize(url: &str) -> String {
    let replaced: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_IDENTITY_LEN)
        .collect();
    replaced.trim_matches('_').to_string()
}

/// Build a qualified tool name.
pub fn qualified_name(identity: &str, raw_name: &str) -> String {
    format!("{}{}{}", identity, SEPARATOR, raw_name)
}

/// Assigns distinct identities to servers.
///
/// The first server with a given sanitized URL keeps it unchanged; later
/// ones get `_2`, `_3`, ... so two URLs that only differ after the
/// truncation point still route to different sessions.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    taken: HashSet<String>,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identity for `url`.
    pub fn allocate(&mut self, url: &str) -> String {
        let mut base = sanitize(url);
        if base.is_empty() {
            base = "server".to_string();
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}
