//! User Account Types

use serde::{Deserialize, Serialize};

/// In-game currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Stars,
    Ton,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stars => write!(f, "STARS"),
            Self::Ton => write!(f, "TON"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARS" => Ok(Self::Stars),
            "TON" => Ok(Self::Ton),
            _ => Err(format!("unknown currency: {}", s)),
        }
    }
}

/// A user's balance pair, returned alongside every settlement result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Stars balance (whole Stars)
    pub stars_balance: u64,
    /// TON balance (nanotons)
    pub ton_balance: u64,
}

impl Balances {
    pub fn of(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Stars => self.stars_balance,
            Currency::Ton => self.ton_balance,
        }
    }
}

/// A player account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user ID
    pub id: i64,
    /// Telegram identity, when known
    pub telegram_id: Option<i64>,
    /// Telegram username, when known
    pub username: Option<String>,
    /// Linked wallet address (canonical form)
    pub wallet_address: Option<String>,
    /// Stars balance (whole Stars)
    pub stars_balance: u64,
    /// TON balance (nanotons)
    pub ton_balance: u64,
    /// Timestamp when the account was created
    pub created_at: u64,
    /// Timestamp of last balance update
    pub updated_at: u64,
}

impl UserRecord {
    pub fn balances(&self) -> Balances {
        Balances {
            stars_balance: self.stars_balance,
            ton_balance: self.ton_balance,
        }
    }

    pub fn balance_of(&self, currency: Currency) -> u64 {
        self.balances().of(currency)
    }

    /// Account age in hours, relative to `now`
    pub fn age_hours(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at) / 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_round_trip() {
        assert_eq!("STARS".parse::<Currency>().unwrap(), Currency::Stars);
        assert_eq!("TON".parse::<Currency>().unwrap(), Currency::Ton);
        assert_eq!(Currency::Ton.to_string(), "TON");
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn test_balance_of() {
        let balances = Balances {
            stars_balance: 100,
            ton_balance: 2_000_000_000,
        };
        assert_eq!(balances.of(Currency::Stars), 100);
        assert_eq!(balances.of(Currency::Ton), 2_000_000_000);
    }
}
