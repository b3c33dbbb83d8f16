//! Product-research agent with a durable task queue and tiered memory.
//!
//! Prospect ingests product-research requests (a keyword or an investment
//! range), enriches each one through an external AI analysis call, and
//! persists structured results. Every submitted request is processed exactly
//! once, in submission order, with durable status tracking; prior analyses
//! feed into new ones so the agent gets smarter over time.
//!
//! # Architecture
//!
//! - **Storage**: a single SQLite database (WAL mode) holding the task
//!   queue, the append-only analysis history, terminal results, and the
//!   status-transition log
//! - **Queue**: strict FIFO with per-task mutual exclusion, attempt
//!   bookkeeping, and capped exponential backoff on retry
//! - **Memory**: a bounded in-process recency cache in front of the durable
//!   history, consulted cache-first with a fingerprint similarity fallback
//! - **Worker**: a single consumer driving claim → recall → analyze →
//!   remember → complete, with all retries delegated to the queue
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, migrations, and health checks
//! - [`error`] — Error taxonomy for the queue, memory tiers, and analyzer
//! - [`queue`] — The durable FIFO task queue and its types
//! - [`memory`] — Tiered memory: short-term cache and long-term history
//! - [`analyzer`] — The external analysis trait and its HTTP backend
//! - [`sink`] — Best-effort export of terminal results
//! - [`worker`] — The single-consumer analysis worker

pub mod analyzer;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod queue;
pub mod sink;
pub mod worker;
