pub mod enrichers;
pub mod manager;
pub mod traits;

pub use manager::EnrichmentManager;
pub use traits::Enricher;
