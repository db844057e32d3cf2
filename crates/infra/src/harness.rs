//! Scenario harness: seeds fixture products with scripted histories and runs
//! the detection pass each scenario is meant to trip.
//!
//! Fixtures are named with the reserved `"Test Product - "` prefix, which the
//! catalog refuses for real products, so [`ScenarioHarness::cleanup`] can
//! never remove production data.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockwatch_ai::DetectionSummary;
use stockwatch_anomalies::DetectionPass;
use stockwatch_core::{ExpectedVersion, ProductId, UserId};
use stockwatch_inventory::{FIXTURE_NAME_PREFIX, NewProduct, Product, TransactionType};

use crate::error::PipelineError;
use crate::ledger::StockLedger;
use crate::orchestrator::{MutationOrchestrator, MutationRequest, PartialFailure};
use crate::registry::MergeReport;
use crate::store::{ProductFilter, ProductStore, bounded};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    LowStock,
    Theft,
    Shrinkage,
    UnauthorizedAccess,
    General,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::LowStock,
        Scenario::Theft,
        Scenario::Shrinkage,
        Scenario::UnauthorizedAccess,
        Scenario::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::LowStock => "low_stock",
            Scenario::Theft => "theft",
            Scenario::Shrinkage => "shrinkage",
            Scenario::UnauthorizedAccess => "unauthorized_access",
            Scenario::General => "general",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Scenario::LowStock => "Low Stock Detection",
            Scenario::Theft => "Theft Detection",
            Scenario::Shrinkage => "Shrinkage Detection",
            Scenario::UnauthorizedAccess => "Unauthorized Access Detection",
            Scenario::General => "General Anomaly Detection",
        }
    }

    /// The pass this scenario exercises.
    pub fn pass(self) -> DetectionPass {
        match self {
            Scenario::Theft | Scenario::UnauthorizedAccess => DetectionPass::Theft,
            Scenario::LowStock | Scenario::Shrinkage | Scenario::General => DetectionPass::General,
        }
    }

    fn fixture(self) -> NewProduct {
        let (suffix, quantity, minimum_stock, price) = match self {
            Scenario::LowStock => ("Low Stock", 5, 10, Decimal::new(2999, 2)),
            Scenario::Theft => ("Theft Scenario", 100, 10, Decimal::new(9999, 2)),
            Scenario::Shrinkage => ("Shrinkage", 200, 10, Decimal::new(4999, 2)),
            Scenario::UnauthorizedAccess => ("Unauthorized Access", 50, 5, Decimal::new(7999, 2)),
            Scenario::General => ("General", 25, 10, Decimal::new(1999, 2)),
        };
        NewProduct {
            name: format!("{FIXTURE_NAME_PREFIX}{suffix}"),
            category: "Test".to_string(),
            quantity,
            price,
            minimum_stock: Some(minimum_stock),
            expiry_date: None,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.as_str() == normalized)
            .ok_or_else(|| PipelineError::validation(format!("unknown scenario '{s}'")))
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRunResult {
    pub scenario: Scenario,
    pub title: &'static str,
    pub fixture_product_id: ProductId,
    pub anomalies_detected: u64,
    pub alerts_generated: u64,
    pub detections: Vec<DetectionSummary>,
    pub merged: MergeReport,
    pub partial_failures: Vec<PartialFailure>,
}

pub struct ScenarioHarness {
    products: Arc<dyn ProductStore>,
    ledger: Arc<StockLedger>,
    orchestrator: Arc<MutationOrchestrator>,
    /// Stands in for a single employee in scripted histories.
    actor: UserId,
    timeout: Duration,
}

impl ScenarioHarness {
    pub fn new(
        products: Arc<dyn ProductStore>,
        ledger: Arc<StockLedger>,
        orchestrator: Arc<MutationOrchestrator>,
        timeout: Duration,
    ) -> Self {
        Self {
            products,
            ledger,
            orchestrator,
            actor: UserId::new(),
            timeout,
        }
    }

    pub async fn run_scenario(&self, scenario: Scenario) -> Result<DetectionRunResult, PipelineError> {
        self.run_scenario_as(scenario, self.actor).await
    }

    /// Run `scenario` with its scripted manual movements attributed to `actor`.
    pub async fn run_scenario_as(
        &self,
        scenario: Scenario,
        actor: UserId,
    ) -> Result<DetectionRunResult, PipelineError> {
        tracing::info!(%scenario, %actor, "running detection scenario");
        let product = Product::create(ProductId::new(), scenario.fixture(), Utc::now())?;
        let product_id = product.id_typed();
        bounded("products.insert", self.timeout, self.products.insert(product)).await?;

        match scenario {
            Scenario::LowStock | Scenario::General => {}
            Scenario::Theft => {
                self.sell(product_id, 10).await?;
                // Should be 90 if only the sale occurred.
                self.unexplained_set(product_id, |_| 85).await?;
            }
            Scenario::Shrinkage => {
                for i in 0..8 {
                    self.sell(product_id, 2).await?;
                    if i % 2 == 0 {
                        self.unexplained_set(product_id, |q| q - 1).await?;
                    }
                }
            }
            Scenario::UnauthorizedAccess => {
                for target in (44..50).rev() {
                    let request = MutationRequest::set(product_id, target)
                        .with_reason("Cycle count correction")
                        .with_actor(actor)
                        .without_detection();
                    self.orchestrator.execute(request).await.map_err(|f| f.error)?;
                }
            }
        }

        let round = self.orchestrator.detect_and_merge(&[scenario.pass()]).await?;
        let anomalies_detected = round.detections.iter().map(|d| d.anomalies_detected).sum();
        let alerts_generated = round.detections.iter().map(|d| d.alerts_generated).sum();

        Ok(DetectionRunResult {
            scenario,
            title: scenario.title(),
            fixture_product_id: product_id,
            anomalies_detected,
            alerts_generated,
            detections: round.detections,
            merged: round.merged,
            partial_failures: round.partial_failures,
        })
    }

    async fn sell(&self, product_id: ProductId, quantity: i64) -> Result<(), PipelineError> {
        let request = MutationRequest::delta(product_id, TransactionType::Sale, quantity)
            .with_reason("Test customer purchase")
            .without_detection();
        self.orchestrator.execute(request).await.map_err(|f| f.error)?;
        Ok(())
    }

    /// Move the on-hand count without a ledger entry (simulated physical loss).
    async fn unexplained_set(&self, product_id: ProductId, to: impl FnOnce(i64) -> i64) -> Result<(), PipelineError> {
        let guard = self.ledger.lock(product_id).await;
        let current = self.ledger.current(&guard).await?;
        let next = current.with_unledgered_quantity(to(current.quantity()), Utc::now())?;
        bounded(
            "products.save",
            self.timeout,
            self.products.save(next, ExpectedVersion::Exact(current.version())),
        )
        .await?;
        Ok(())
    }

    /// Delete every fixture product. Returns how many were removed.
    ///
    /// A product that fails to delete is logged and skipped.
    pub async fn cleanup(&self) -> Result<usize, PipelineError> {
        let fixtures = bounded(
            "products.list",
            self.timeout,
            self.products.list(&ProductFilter {
                name_prefix: Some(FIXTURE_NAME_PREFIX.to_string()),
                ..ProductFilter::default()
            }),
        )
        .await?;

        let mut removed = 0;
        for product in fixtures {
            let id = product.id_typed();
            let _guard = self.ledger.lock(id).await;
            match bounded("products.delete", self.timeout, self.products.delete(id)).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(product_id = %id, error = %e, "could not delete test product"),
            }
        }
        tracing::info!(removed, "cleaned up test products");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names_parse_loosely() {
        assert_eq!("low-stock".parse::<Scenario>().unwrap(), Scenario::LowStock);
        assert_eq!("Unauthorized Access".parse::<Scenario>().unwrap(), Scenario::UnauthorizedAccess);
        assert!("flood".parse::<Scenario>().is_err());
    }

    #[test]
    fn scenarios_route_to_their_pass() {
        assert_eq!(Scenario::Theft.pass(), DetectionPass::Theft);
        assert_eq!(Scenario::UnauthorizedAccess.pass(), DetectionPass::Theft);
        assert_eq!(Scenario::Shrinkage.pass(), DetectionPass::General);
    }

    #[test]
    fn fixtures_carry_the_reserved_prefix() {
        for s in Scenario::ALL {
            assert!(s.fixture().name.starts_with(FIXTURE_NAME_PREFIX));
        }
    }
}
