#![deny(missing_docs)]

//! # escrow-core — Foundational Types for the Remittance Escrow
//!
//! This crate defines the primitives every other crate in the workspace
//! depends on. It has no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** A seller [`Address`] is not
//!    a raw string, an [`EscrowId`] is not a [`TradeId`], and an [`Amount`]
//!    is always denominated in the asset's smallest unit.
//!
//! 2. **Injected policy.** The arbitrator identity, amount cap, and deadline
//!    windows live in [`EscrowConfig`] and are handed to records at creation
//!    time rather than compiled in.
//!
//! 3. **Structured errors with `thiserror`.** No `Box<dyn Error>`, no
//!    `.unwrap()` outside tests.

pub mod amount;
pub mod config;
pub mod error;
pub mod identity;
pub mod temporal;

pub use amount::Amount;
pub use config::EscrowConfig;
pub use error::{ConfigError, ValidationError};
pub use identity::{Address, EscrowId, TradeId};
pub use temporal::Timestamp;
