//! derlem - semantic passage retrieval over a document corpus.
//!
//! derlem chunks scraped documents, embeds them through a pluggable
//! provider, and persists a flat inner-product vector store per
//! provider+model pair. Queries run through metadata filter planning,
//! filtered nearest-neighbor search, optional relevance re-ranking, MMR
//! diversification and source dedup; multi-query fusion merges several
//! query variants into one ranked list.
//!
//! # Quick start
//!
//! ```no_run
//! use derlem::{DataDir, Retriever, Settings};
//! use derlem::categories::CategoryCatalog;
//! use derlem::embedding::HttpEmbedder;
//! use derlem::retriever::SearchRequest;
//!
//! let settings = Settings::from_env();
//! let data_dir = DataDir::resolve(None).unwrap();
//! let embedder = HttpEmbedder::new(settings.embedding.clone()).unwrap();
//!
//! let mut retriever = Retriever::new(
//!     data_dir,
//!     settings,
//!     Box::new(embedder),
//!     None,
//!     CategoryCatalog::builtin(),
//! );
//!
//! let mut request = SearchRequest::new("özgür irade ve determinizm");
//! request.category = Some("Metafizik".to_string());
//! let results = retriever.search(&request).unwrap();
//! for doc in &results {
//!     println!("[{:.3}] {}", doc.score, doc.metadata.doc.title);
//! }
//! ```

pub mod categories;
pub mod chunking;
pub mod cli;
pub mod context;
pub mod corpus;
pub mod data_dir;
pub mod dates;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod meta;
pub mod mmr;
pub mod reranker;
pub mod retriever;
pub mod settings;
pub mod store;
pub mod vector_index;

pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use retriever::Retriever;
pub use settings::Settings;
pub use store::{IndexStore, StoreConfig};
