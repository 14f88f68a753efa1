pub mod node;
pub mod patch;
