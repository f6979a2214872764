//! Fondo - sales backend for numbered wallpaper drops
//!
//! This library provides the core functionality for the Fondo shop:
//! purchase storage, payment provider integration (Wompi, Mercado Pago),
//! idempotent webhook ingestion and the scheduled reconciliation sweep that
//! drives every purchase to a terminal payment state.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod payments;
pub mod reconcile;
pub mod transition;
