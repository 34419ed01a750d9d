//! Scheduled job implementations.

pub mod acquisition;
pub mod assembly;

pub use acquisition::AcquisitionJob;
pub use assembly::AssemblyJob;
