pub mod balance;

// Re-export commonly used types
pub use balance::{token_symbol, BalanceRecord, PortfolioTotals};
