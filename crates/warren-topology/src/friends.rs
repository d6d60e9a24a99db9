//! Friends-file parsing.
//!
//! The file is a whitespace-separated list of peer identities in base32.
//! Tokens that do not parse are skipped with a logged offset; an empty or
//! absent file is fine; a file that exists but cannot be read is an
//! error.

use std::path::Path;

use warren_types::PeerId;

use crate::{Result, TopologyError};

/// Parse friends-file content. Bad tokens are skipped and logged with
/// their byte offset.
pub fn parse(content: &str) -> Vec<PeerId> {
    let mut friends = Vec::new();
    let mut offset = 0usize;
    for token in content.split_whitespace() {
        // Offsets refer to the original buffer for log readability.
        let token_offset = content[offset..]
            .find(token)
            .map(|o| offset + o)
            .unwrap_or(offset);
        offset = token_offset + token.len();

        match token.parse::<PeerId>() {
            Ok(peer) => friends.push(peer),
            Err(error) => {
                tracing::warn!(offset = token_offset, %error, "skipping malformed friends entry");
            }
        }
    }
    friends
}

/// Read and parse a friends file.
pub fn load(path: &Path) -> Result<Vec<PeerId>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse(&content)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(TopologyError::FriendsFileUnreadable(format!(
            "{}: {error}",
            path.display()
        ))),
    }
}
