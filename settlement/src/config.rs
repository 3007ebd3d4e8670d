//! Configuration for the payment settlement pipeline

use serde::{Deserialize, Serialize};

/// Settlement pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Telegram Stars price table
    pub stars_tiers: Vec<StarsTier>,

    /// UPI price table
    pub upi_tiers: Vec<UpiTier>,

    /// Shared secret for UPI webhook signatures
    ///
    /// The provider signs the notification body with HMAC-SHA256 over this
    /// secret; an empty secret refuses every notification.
    pub upi_webhook_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "settlement-pipeline".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            // 100 Stars = 70 credits is the sole supported tier; extend the
            // table when the storefront adds bundles
            stars_tiers: vec![StarsTier {
                stars: 100,
                credits: 70,
            }],
            // Rs.59 = 23 credits
            upi_tiers: vec![UpiTier {
                amount_inr: 59,
                credits: 23,
            }],
            upi_webhook_secret: String::new(),
        }
    }
}

/// One accepted Telegram Stars purchase tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarsTier {
    /// Stars amount as delivered in the payment notification
    pub stars: u64,

    /// Credits granted for this tier
    pub credits: u64,
}

/// One accepted UPI purchase tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpiTier {
    /// Order amount in whole rupees
    pub amount_inr: u64,

    /// Credits granted for this tier
    pub credits: u64,
}

impl Config {
    /// Credits for a Stars payment, None if the amount matches no tier
    pub fn stars_credits(&self, stars: u64) -> Option<u64> {
        self.stars_tiers
            .iter()
            .find(|t| t.stars == stars)
            .map(|t| t.credits)
    }

    /// Credits for a UPI payment, None if the amount matches no tier
    pub fn upi_credits(&self, amount_inr: u64) -> Option<u64> {
        self.upi_tiers
            .iter()
            .find(|t| t.amount_inr == amount_inr)
            .map(|t| t.credits)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(secret) = std::env::var("UPI_WEBHOOK_SECRET") {
            config.upi_webhook_secret = secret;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let config = Config::default();
        assert_eq!(config.stars_credits(100), Some(70));
        assert_eq!(config.stars_credits(50), None);
        assert_eq!(config.upi_credits(59), Some(23));
        assert_eq!(config.upi_credits(100), None);
    }
}
