// # cfddns-core
//
// Core library for the Cloudflare DDNS reconciler.
//
// ## Architecture Overview
//
// This library provides the core functionality for one reconciliation run:
// - **IpSource**: Trait for asking one echo service for the public address
// - **IpResolver**: Ordered fallback over IpSources, per address family
// - **DnsProvider**: Trait for reading and updating records via provider APIs
// - **StateStore**: Trait for the advisory address cache
// - **Reconciler**: Orchestrates resolve → read → compare → update
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Run-Once**: Each invocation converges every record once and exits
// 3. **Live Verification**: The provider is the source of truth; the cache is a hint
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Failure Isolation**: One record's failure never blocks another

pub mod traits;
pub mod engine;
pub mod config;
pub mod error;
pub mod resolver;
pub mod retry;
pub mod state;

// Re-export core types for convenience
pub use traits::{IpSource, DnsProvider, StateStore};
pub use engine::{Outcome, Reconciler, RecordOutcome, RunReport};
pub use config::{Config, RawConfig, RecordType, TargetRecord};
pub use error::{Error, Result};
pub use resolver::{IpResolver, ResolvedAddress};
pub use retry::BackoffPolicy;
pub use state::{MemoryStateStore, FileStateStore};
