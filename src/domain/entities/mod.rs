pub mod collection;
pub mod document;
