use serde::{Deserialize, Serialize};

use fieldcrm_core::{DomainError, DomainResult};

/// A billable work code and what it pays, in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateDefinition {
    pub code: String,
    pub amount: u64,
}

impl RateDefinition {
    pub fn new(code: impl Into<String>, amount: u64) -> Self {
        Self {
            code: code.into(),
            amount,
        }
    }
}

/// Admin-maintained rate table. Order is significant: pattern resolution
/// picks the first matching code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCatalog {
    rates: Vec<RateDefinition>,
}

impl RateCatalog {
    /// Rejects blank and case-insensitively duplicated codes.
    pub fn new(rates: Vec<RateDefinition>) -> DomainResult<Self> {
        for (i, rate) in rates.iter().enumerate() {
            if rate.code.trim().is_empty() {
                return Err(DomainError::validation("rate code cannot be empty"));
            }
            if rates[..i].iter().any(|r| r.code.eq_ignore_ascii_case(&rate.code)) {
                return Err(DomainError::validation(format!("duplicate rate code '{}'", rate.code)));
            }
        }
        Ok(Self { rates })
    }

    pub fn get(&self, code: &str) -> Option<&RateDefinition> {
        self.rates.iter().find(|r| r.code.eq_ignore_ascii_case(code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RateDefinition> {
        self.rates.iter()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let catalog = RateCatalog::new(vec![RateDefinition::new("GNIAZDO", 5)]).unwrap();
        assert_eq!(catalog.get("gniazdo").map(|r| r.amount), Some(5));
        assert!(catalog.get("gniazd").is_none());
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let err = RateCatalog::new(vec![RateDefinition::new("PION", 3), RateDefinition::new("pion", 4)]).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("expected Validation error"),
        }
    }
}
