pub mod api;
pub mod approval;
pub mod audit;
pub mod email;
pub mod llm;
pub mod ml;
pub mod retrieval;
pub mod shared;
pub mod triage;
