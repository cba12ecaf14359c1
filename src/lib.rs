pub mod analyzer;
pub mod data;
pub mod error;
pub mod index;
pub mod matcher;
pub mod operator;
pub mod plan;
