//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the controller
//! depends on, but whose backend implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`DataStore`] - Uniform fetch/insert/update/delete over one backend
//! - [`ChangeNotifier`] - Structural change events flowing out of the controller

pub mod change_notifier;
pub mod data_store;

pub use change_notifier::{ChangeEvent, ChangeNotifier, ChannelNotifier, EventLog, NotifierHub};
pub use data_store::{validate_fetch, DataStore, FetchedBatch};
