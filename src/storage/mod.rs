pub mod connection;
pub mod entity;
pub mod repository;
pub mod seeds;

pub use connection::establish_connection;
