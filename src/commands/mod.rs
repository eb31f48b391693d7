pub mod compare;
pub mod score;
pub mod summarize;
