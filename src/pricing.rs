use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price of one model in USD per 1M tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input + output_tokens as f64 * self.output) / 1_000_000.0
    }
}

/// Model identifier to price lookup; unknown models are free
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert("gpt-4o-mini".to_string(), ModelPrice { input: 0.15, output: 0.60 });
        // Locally hosted models have no per-token price
        for local in ["qwen2.5-14b", "gemma-2-9b", "ax-4.0-light"] {
            prices.insert(local.to_string(), ModelPrice::default());
        }
        Self { prices }
    }
}

impl PricingTable {
    /// Built-in prices with `overrides` taking precedence
    pub fn with_overrides(overrides: &HashMap<String, ModelPrice>) -> Self {
        let mut table = Self::default();
        table
            .prices
            .extend(overrides.iter().map(|(model, price)| (model.clone(), *price)));
        table
    }

    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or_default()
    }

    pub fn get(&self, model: &str) -> Option<&ModelPrice> {
        self.prices.get(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_cost() {
        let table = PricingTable::default();
        let cost = table.price_for("gpt-4o-mini").cost(1_000_000, 500_000);
        assert!((cost - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PricingTable::default();
        assert_eq!(table.price_for("mystery-model").cost(10_000, 10_000), 0.0);
        assert!(table.get("mystery-model").is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("gpt-4o-mini".to_string(), ModelPrice { input: 1.0, output: 2.0 });
        overrides.insert("gemini-2.0-flash".to_string(), ModelPrice { input: 0.1, output: 0.4 });

        let table = PricingTable::with_overrides(&overrides);
        assert_eq!(table.price_for("gpt-4o-mini").input, 1.0);
        assert_eq!(table.price_for("gemini-2.0-flash").output, 0.4);
        assert_eq!(table.price_for("gemma-2-9b"), ModelPrice::default());
    }
}
