//! Package archives - tar.gz packing on the host, extraction on the client
//!
//! ```text
//! host: updates/1.2.0/...  ──write_package──▶  1.2.0/... (tar.gz)
//! client: 1.2.0/... (tar.gz) ──extract──▶  app/...   (wrapper stripped)
//! ```

mod packager;
mod unpacker;

pub use packager::{stream_package, write_package, write_package_file, PackageStream, CHUNK_SIZE};
pub use unpacker::{extract, extract_file};
