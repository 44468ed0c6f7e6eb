//! German capital-gains tax engine core: Abgeltungsteuer + Solidaritaetszuschlag
//! + optional Kirchensteuer, the InvStG Vorabpauschale regime, Teilfreistellung,
//! Bestandsschutz legacy exemption, and Verlustverrechnung loss offsetting,
//! applied to a FIFO lot ledger built from an externally-supplied transaction
//! and price history.
//!
//! The crate never parses the source portfolio file, renders CSV, or talks to
//! a GUI — those remain external collaborators (see SPEC_FULL.md §1). It
//! consumes the plain value objects in [`model`] and returns the plain result
//! records in [`vorabpauschale`], [`allowance`], and [`payout`].

pub mod allocator;
pub mod allowance;
pub mod config;
pub mod construct;
pub mod error;
pub mod ledger;
pub mod legacy;
pub mod loss_pool;
pub mod model;
pub mod money;
pub mod params;
pub mod payout;
pub mod price;
pub mod vorabpauschale;

pub use config::{Config, FilingStatus};
pub use error::{EngineError, Result};
pub use ledger::FifoLedger;
pub use model::{FundType, Portfolio, Price, Security, Transaction, TransactionKind};
pub use params::{tax_parameters, TaxParameters};
