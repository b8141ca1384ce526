#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod norm;
pub mod source;
pub mod traits;
pub mod types;

pub use chunker::{ChunkSpan, Chunker};
pub use error::{Error, Result};
pub use norm::{normalize, normalize_batch};
pub use traits::{DocumentSource, Embedder, VectorIndex};
