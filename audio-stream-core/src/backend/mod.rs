pub mod simulated;
pub mod simulated_client;
