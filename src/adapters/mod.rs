//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  BackingStore │ OriginMap │ EventPublisher │ DeadLetterSink │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryBackingStore │ PgBackingStore │ InMemoryOriginMap  │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector            │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata::adapters::{InMemoryBackingStore, InMemoryOriginMap};
//! use strata::{CacheFacade, StrataConfig};
//!
//! let backing = Arc::new(InMemoryBackingStore::new());
//! let facade = CacheFacade::builder(StrataConfig::default(), backing)
//!     .origin(Arc::new(InMemoryOriginMap::new()))
//!     .build()?;
//! ```

mod event_publisher;
mod memory;
mod origin;

#[cfg(feature = "postgres")]
mod postgres;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use memory::InMemoryBackingStore;
pub use origin::InMemoryOriginMap;

#[cfg(feature = "postgres")]
pub use postgres::{PgBackingStore, SCHEMA};
