//! Backend variants other than the router adapter.
//!
//! | scheme | type |
//! |---|---|
//! | `fs` | [`FsEndpoint`] |
//! | `db` | [`MemoryEndpoint`] |
//! | `http`, `https` | [`RemoteEndpoint`] over a [`RemoteConnector`] |
//! | `s3` | [`S3Endpoint`] over an [`ObjectStoreConnector`] |

pub mod fs;
pub mod memory;
pub mod object_store;
pub mod remote;
pub mod s3;

pub use fs::FsEndpoint;
pub use memory::MemoryEndpoint;
pub use object_store::{MemoryObjectStore, MemoryObjectStoreConnector, ObjectInfo, ObjectStore, ObjectStoreConnector};
pub use remote::{MemoryRemoteConnector, RemoteConnector, RemoteEndpoint};
pub use s3::S3Endpoint;

/// Hex BLAKE3 digest used as a leaf etag.
pub(crate) fn content_etag(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_etag_is_stable() {
        assert_eq!(content_etag(b"abc"), content_etag(b"abc"));
        assert_ne!(content_etag(b"abc"), content_etag(b"abd"));
        assert_eq!(content_etag(b"").len(), 64);
    }
}
