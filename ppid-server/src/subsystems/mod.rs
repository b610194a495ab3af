pub mod curation;
pub mod dispatch;
pub mod escalation;
pub mod governor;
pub mod intent;
pub mod recap;
pub mod responder;
pub mod retriever;
pub mod sessions;
