//! Itemstore Core - Domain logic for paginated, observable item lists
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `Record`, `RecordId`, `FetchOptions`, `BatchCursor`, `StoreError`
//! - **Port definitions** - Traits for adapters: `DataStore`, `ChangeNotifier`
//! - **Use cases** - `ItemsController` (paging, CRUD mediation, invalidation)
//! - **In-memory stores** - `ArrayStore` and `KeyValueStore`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data and query helpers with no I/O.
//! Ports define trait interfaces that adapter crates (`itemstore-sqlite`,
//! `itemstore-web`) implement. The controller drives a store through the
//! `DataStore` port and reports structural changes through `ChangeNotifier`.

pub mod config;
pub mod domain;
pub mod ports;
pub mod stores;
pub mod usecases;
