//! Support layer for two ARM debug-probe host services: semihosting
//! request dispatch and CoreSight TPIU/SWO trace control.
//!
//! This crate does not own a probe driver, a debug access port, a command
//! interpreter, or a transport to a remote debug frontend. Those roles are
//! expressed as traits in [`collab`] and [`target`]; a host binary wires a
//! concrete implementation of each in before driving [`semihosting::SemihostingState::dispatch`]
//! or [`tpiu::TpiuSwoController`].
//!
//! Specification: ARM semihosting 2.0, ARM CoreSight TPIU/SWO architecture.

#![warn(missing_docs)]

pub mod collab;
pub mod error;
pub mod mem_codec;
pub mod semihosting;
pub mod target;
pub mod tpiu;

pub use error::{Error, Result};
pub use target::{Endian, Target};
