pub mod payload;
pub mod session;
pub mod slot;
