//! Text splitting for indexing and for citable source chunks

mod chunker;

pub use chunker::{SentenceSplitter, TextSpan};
