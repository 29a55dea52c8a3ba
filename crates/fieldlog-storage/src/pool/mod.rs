//! Connection management. fieldlog writes through a single connection;
//! the engine is small enough that a read pool buys nothing.

pub mod pragmas;
pub mod write_connection;

pub use write_connection::WriteConnection;
