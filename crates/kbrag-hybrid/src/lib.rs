//! kbrag-hybrid
//!
//! The per-query pipeline: fast paths, query expansion, hybrid lexical and
//! vector fusion, reranking and the relevance guard, over an atomically
//! swappable index snapshot.

pub mod candidate;
pub mod expander;
pub mod fastpath;
pub mod fusion;
pub mod guard;
pub mod llm;
pub mod overlap;
pub mod pipeline;
pub mod rerank;
pub mod router;
pub mod snapshot;

pub use candidate::{Candidate, CandidateOrigin, FastPathKind, ScoreBreakdown};
pub use guard::{BypassReason, GuardDecision, GuardSignals, LowRelevance, RelevanceGuard, LOW_RELEVANCE};
pub use llm::OpenAiClient;
pub use overlap::LexicalOverlapClassifier;
pub use pipeline::{Collaborators, Jump, Passage, QueryRequest, RetrievalPipeline, RetrievalResult};
pub use router::ThemeRouter;
pub use snapshot::{IndexSnapshot, SnapshotHandle, SnapshotInfo};
