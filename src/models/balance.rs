use std::collections::HashMap;

/// Resolved balances for one wallet, decimal-converted and priced.
/// Immutable once returned by the fetcher.
#[derive(Debug, Clone)]
pub struct BalanceRecord {
    /// 1-based position in the input batch.
    pub index: usize,
    pub address: String,
    pub sui: f64,
    pub staked: f64,
    /// Aftermath liquid-staked SUI held under its own token type.
    pub af_sui: f64,
    /// Volo liquid-staked SUI (CERT).
    pub v_sui: f64,
    /// Token type -> decimal balance.
    pub tokens: HashMap<String, f64>,
    /// Native + staked + liquid-staked wrappers.
    pub total_sui: f64,
    /// Fiat value across everything with a known positive price.
    pub total_value: f64,
}

/// Portfolio-wide running sums. Mutated only by whoever folds completed
/// records, never by workers directly.
#[derive(Debug)]
pub struct PortfolioTotals {
    pub sui: f64,
    pub staked: f64,
    pub af_sui: f64,
    pub v_sui: f64,
    pub tokens: HashMap<String, f64>,
    pub total_value: f64,
}

impl PortfolioTotals {
    pub fn new(token_types: &[String]) -> Self {
        Self {
            sui: 0.0,
            staked: 0.0,
            af_sui: 0.0,
            v_sui: 0.0,
            tokens: token_types.iter().map(|t| (t.clone(), 0.0)).collect(),
            total_value: 0.0,
        }
    }

    pub fn fold(&mut self, record: &BalanceRecord) {
        self.sui += record.sui;
        self.staked += record.staked;
        self.af_sui += record.af_sui;
        self.v_sui += record.v_sui;
        for (token, balance) in &record.tokens {
            *self.tokens.entry(token.clone()).or_insert(0.0) += balance;
        }
        self.total_value += record.total_value;
    }

    pub fn total_sui(&self) -> f64 {
        self.sui + self.staked + self.af_sui + self.v_sui
    }
}

/// Derives the display symbol from a fully-qualified token type: the last
/// `::` segment, or the whole string when undelimited.
pub fn token_symbol(token_type: &str) -> String {
    let parts: Vec<&str> = token_type.split("::").collect();
    if parts.len() > 1 {
        parts[parts.len() - 1].to_string()
    } else {
        token_type.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_last_path_segment() {
        assert_eq!(token_symbol("0x2::sui::SUI"), "SUI");
        assert_eq!(
            token_symbol("0xdba...::cert::CERT"),
            "CERT"
        );
    }

    #[test]
    fn undelimited_type_is_its_own_symbol() {
        assert_eq!(token_symbol("PLAINTOKEN"), "PLAINTOKEN");
    }

    #[test]
    fn fold_accumulates_per_token_and_totals() {
        let tokens = vec!["0x2::usdc::USDC".to_string()];
        let mut totals = PortfolioTotals::new(&tokens);
        let record = BalanceRecord {
            index: 1,
            address: "0xabc".to_string(),
            sui: 10.0,
            staked: 2.0,
            af_sui: 1.0,
            v_sui: 0.5,
            tokens: [("0x2::usdc::USDC".to_string(), 25.0)].into_iter().collect(),
            total_sui: 13.5,
            total_value: 40.0,
        };
        totals.fold(&record);
        totals.fold(&record);
        assert_eq!(totals.sui, 20.0);
        assert_eq!(totals.tokens["0x2::usdc::USDC"], 50.0);
        assert_eq!(totals.total_sui(), 27.0);
        assert_eq!(totals.total_value, 80.0);
    }
}
