//! Closed vocabularies for detection output.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockwatch_core::DomainError;

/// Class of irregularity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    LowStock,
    Theft,
    Shrinkage,
    UnauthorizedAccess,
    UnusualMovement,
    ExpiryRisk,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 6] = [
        AnomalyType::LowStock,
        AnomalyType::Theft,
        AnomalyType::Shrinkage,
        AnomalyType::UnauthorizedAccess,
        AnomalyType::UnusualMovement,
        AnomalyType::ExpiryRisk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyType::LowStock => "low_stock",
            AnomalyType::Theft => "theft",
            AnomalyType::Shrinkage => "shrinkage",
            AnomalyType::UnauthorizedAccess => "unauthorized_access",
            AnomalyType::UnusualMovement => "unusual_movement",
            AnomalyType::ExpiryRisk => "expiry_risk",
        }
    }

    /// Human label ("low stock").
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }

    /// Stock left the building without a ledger entry.
    pub fn is_loss(self) -> bool {
        matches!(self, AnomalyType::Theft | AnomalyType::Shrinkage)
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "unauthorized" => Ok(AnomalyType::UnauthorizedAccess),
            "unusual_activity" | "movement_spike" => Ok(AnomalyType::UnusualMovement),
            other => AnomalyType::ALL
                .into_iter()
                .find(|t| t.as_str() == other)
                .ok_or_else(|| DomainError::validation(format!("unknown anomaly type '{s}'"))),
        }
    }
}

/// Triage priority, ordered from least to most urgent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Raises an operator alert when merged.
    pub fn is_alerting(self) -> bool {
        self >= Severity::High
    }

    /// Map a normalized score (1.0 = at threshold) onto a severity band.
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() || score >= 3.0 {
            Severity::Critical
        } else if score >= 2.0 {
            Severity::High
        } else if score >= 1.25 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(DomainError::validation(format!("unknown severity '{s}'"))),
        }
    }
}

/// A detection pass the pipeline can request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPass {
    /// Broad scan: low stock, movement spikes, shrinkage.
    General,
    /// Loss-focused scan over the latest transaction history.
    Theft,
}

impl DetectionPass {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionPass::General => "general",
            DetectionPass::Theft => "theft",
        }
    }
}

impl fmt::Display for DetectionPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionPass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" | "anomaly" | "anomalies" => Ok(DetectionPass::General),
            "theft" | "theft_focused" => Ok(DetectionPass::Theft),
            _ => Err(DomainError::validation(format!("unknown detection pass '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_type_parsing_normalizes_separators_and_aliases() {
        assert_eq!("Low Stock".parse::<AnomalyType>().unwrap(), AnomalyType::LowStock);
        assert_eq!("unauthorized-access".parse::<AnomalyType>().unwrap(), AnomalyType::UnauthorizedAccess);
        assert_eq!("unauthorized".parse::<AnomalyType>().unwrap(), AnomalyType::UnauthorizedAccess);
        assert!("alien_invasion".parse::<AnomalyType>().is_err());
    }

    #[test]
    fn label_replaces_underscores() {
        assert_eq!(AnomalyType::UnauthorizedAccess.label(), "unauthorized access");
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::High.is_alerting());
        assert!(!Severity::Medium.is_alerting());
    }

    #[test]
    fn severity_from_score_bands() {
        assert_eq!(Severity::from_score(1.0), Severity::Low);
        assert_eq!(Severity::from_score(1.5), Severity::Medium);
        assert_eq!(Severity::from_score(2.5), Severity::High);
        assert_eq!(Severity::from_score(9.0), Severity::Critical);
        assert_eq!(Severity::from_score(f64::NAN), Severity::Critical);
    }

    #[test]
    fn detection_pass_accepts_route_style_names() {
        assert_eq!("theft_focused".parse::<DetectionPass>().unwrap(), DetectionPass::Theft);
        assert_eq!("General".parse::<DetectionPass>().unwrap(), DetectionPass::General);
    }
}
