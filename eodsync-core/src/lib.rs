//! eodsync core — incremental end-of-day price sync pipeline.
//!
//! One `pipeline::run` does the whole job:
//! - Resolve the tracked symbol set (remote query feed ∪ manual list)
//! - Fetch new EOD closes from the day after the cache ends, in paginated
//!   symbol batches on a bounded worker pool
//! - Merge fetched rows into the CSV cache (observed closes only)
//! - Forward-fill every symbol through today and publish the result as a
//!   CSV table
//!
//! The seams are traits: PriceSource for the vendor, SymbolSource for the
//! feed, CacheStore for storage, TableSink for the destination. Production
//! wires MarketStack and Dune into all four; tests wire scripts and memory.

pub mod cache;
pub mod config;
pub mod dune;
pub mod marketstack;
pub mod pipeline;
pub mod publish;
pub mod reconcile;
pub mod resolver;
pub mod series;
pub mod source;
