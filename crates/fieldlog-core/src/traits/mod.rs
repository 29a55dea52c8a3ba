pub mod remote_store;

pub use remote_store::RemoteStore;
