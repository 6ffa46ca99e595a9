pub mod consistency;
pub mod index;
pub mod metric;
pub mod score_threshold;
