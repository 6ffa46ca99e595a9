pub mod openai;
pub mod tei;
