// ═══════════════════════════════════════════════════════════
// whereami — chained country lookups on a single-threaded scheduler
// ═══════════════════════════════════════════════════════════
//
//  scheduler   microtask / timer / I/O completion queues
//  task        single-settlement tasks and their chaining
//  combinator  all, race, any, all_settled
//  timer       delay, deadline, with_timeout
//  fetch       HTTP GET → classified JSON task
//  model       typed payloads (GeoResult, CountrySummary)
//  location    coordinates, geolocation seam, REPL triggers
//  resolver    the lookup chains
//  render      renderer seam + terminal cards
//  batch       several independent lookups at once
//  config      TOML file + overrides
// ═══════════════════════════════════════════════════════════

pub mod batch;
pub mod combinator;
pub mod config;
pub mod error;
pub mod fetch;
pub mod location;
pub mod model;
pub mod render;
pub mod resolver;
pub mod scheduler;
pub mod task;
pub mod timer;

pub use batch::BatchMode;
pub use config::{Config, ConfigError};
pub use error::{LookupError, Outcome};
pub use fetch::{Fetcher, HttpResponse, Transport, UreqTransport};
pub use location::{FixedPosition, Geolocation, Trigger};
pub use model::{CountrySummary, GeoResult, LocationQuery};
pub use render::{RenderContext, Renderer, TerminalRenderer, Variant};
pub use resolver::{Endpoints, Resolver};
pub use scheduler::{Scheduler, TimerId, WorkerPanic};
pub use task::{Settler, Task};
