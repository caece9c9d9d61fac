pub mod discovery;
pub mod enrichment;
