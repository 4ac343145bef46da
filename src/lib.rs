//! Market-intelligence analytics core: scores raw mentions of an
//! instrument into a consensus sentiment signal, fuses it with technical
//! indicators into a trading recommendation, audits predictions against
//! observed prices, and dispatches threshold alerts.
//!
//! Surrounding glue (REST routing, persistence wiring, auth, websocket
//! transport) lives outside this crate; collection, pricing, storage and
//! notification are consumed through the traits in [`external`] and
//! [`store`].

pub mod config;
pub mod errors;
pub mod external;
pub mod logging;
pub mod models;
pub mod services;
pub mod store;
