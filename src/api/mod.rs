pub mod coingecko;
pub mod rpc;
