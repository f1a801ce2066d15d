#[cfg(feature = "integration_nexia")]
pub mod nexia;

#[cfg(feature = "integration_nexia")]
pub use nexia::NexiaConfig;
