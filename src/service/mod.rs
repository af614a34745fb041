//! Service Layer
//!
//! - **Facade** (`facade.rs`) - Read-through / write-behind entry point
//! - **Single flight** (`single_flight.rs`) - Coalesces concurrent misses per key
//! - **Ticker** (`ticker.rs`) - Background flush and sweep loop

mod facade;
mod single_flight;
mod ticker;

pub use facade::{CacheFacade, CacheFacadeBuilder, HealthSnapshot, SweepReport};
pub use single_flight::{Flight, FlightGuard, LoadOutcome, SingleFlight, Waiter};
pub use ticker::Ticker;
