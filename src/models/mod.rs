pub mod donation;
pub mod draw;
