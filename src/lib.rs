// lib.rs
pub mod chrom_sizes;
pub mod classify;
pub mod coalescence;
pub mod column_entry;
pub mod commands;
pub mod error;
pub mod external;
pub mod summary;
pub mod tree;
