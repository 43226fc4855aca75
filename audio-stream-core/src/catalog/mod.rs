pub mod format_negotiator;
pub mod port_catalog;
