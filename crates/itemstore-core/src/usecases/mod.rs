//! Use cases (interactors) for itemstore
//!
//! This module contains the application use cases that orchestrate
//! domain types and port interfaces.
//!
//! ## Use Cases
//!
//! - [`ItemsController`] - Paged list ownership, CRUD mediation, invalidation

pub mod items_controller;

pub use items_controller::{
    ControllerState, ItemsController, MutationOutcome, NoConnectionHandler, PageOutcome,
    PendingOperation,
};
