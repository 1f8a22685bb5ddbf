#![forbid(unsafe_code)]

pub mod catalog;
pub mod cli;
pub mod diagnostics;
pub mod inspect;
pub mod logging;
pub mod model;
pub mod report;
pub mod sheet;
pub mod store;
pub mod taxonomy;
pub mod transactions;
