pub mod add_documents;
pub mod context;
pub mod provision;
pub mod search;
