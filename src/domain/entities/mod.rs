pub mod order;
pub mod position;
