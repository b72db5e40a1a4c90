//! Quality-control input rules.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use factoryerp_core::{DomainError, DomainResult};

/// How an out-of-range defective quantity is handled.
///
/// `Reject` surfaces a validation error to the inspector. `Clamp` silently moves
/// the value into `[0, received]`, matching the legacy behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcInputPolicy {
    #[default]
    Reject,
    Clamp,
}

impl FromStr for QcInputPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "clamp" => Ok(Self::Clamp),
            other => Err(DomainError::validation(format!(
                "unknown qc policy '{other}' (expected 'reject' or 'clamp')"
            ))),
        }
    }
}

/// Resolve the defective quantity to store for a line that received `received`.
pub fn normalize_defective(
    received: Decimal,
    requested: Decimal,
    policy: QcInputPolicy,
) -> DomainResult<Decimal> {
    if requested >= Decimal::ZERO && requested <= received {
        return Ok(requested);
    }
    match policy {
        QcInputPolicy::Clamp => Ok(requested.clamp(Decimal::ZERO, received)),
        QcInputPolicy::Reject => Err(DomainError::validation(format!(
            "defective quantity {requested} must be between 0 and received quantity {received}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_value_passes_through() {
        let v = normalize_defective(Decimal::from(100), Decimal::from(20), QcInputPolicy::Reject);
        assert_eq!(v.unwrap(), Decimal::from(20));
    }

    #[test]
    fn reject_policy_refuses_out_of_range() {
        let err = normalize_defective(Decimal::from(10), Decimal::from(11), QcInputPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(
            normalize_defective(Decimal::from(10), Decimal::from(-1), QcInputPolicy::Reject)
                .is_err()
        );
    }

    #[test]
    fn clamp_policy_moves_into_bounds() {
        let high = normalize_defective(Decimal::from(10), Decimal::from(50), QcInputPolicy::Clamp);
        assert_eq!(high.unwrap(), Decimal::from(10));
        let low = normalize_defective(Decimal::from(10), Decimal::from(-3), QcInputPolicy::Clamp);
        assert_eq!(low.unwrap(), Decimal::ZERO);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("Clamp".parse::<QcInputPolicy>().unwrap(), QcInputPolicy::Clamp);
        assert_eq!(" reject ".parse::<QcInputPolicy>().unwrap(), QcInputPolicy::Reject);
        assert!("lenient".parse::<QcInputPolicy>().is_err());
    }
}
