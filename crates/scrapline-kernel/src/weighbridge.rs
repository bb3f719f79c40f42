//! Net weight reconciliation for weighbridge readings.

use serde::{Deserialize, Serialize};

use crate::config::WeighbridgeConfig;
use crate::error::{KernelError, KernelResult};

/// Outcome of reconciling a gross and a tare reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightReconciliation {
    pub net_weight: f64,
    pub discrepancy_percentage: f64,
    pub requires_supervisor_approval: bool,
}

/// Pure calculator; holds only the reference tare-to-gross ratio.
///
/// The discrepancy is `|tare / gross - reference| * 100`, a heuristic for
/// loads whose tare is far from the usual share of the gross reading. It is
/// not a comparison against a declared weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightReconciliationEngine {
    reference_tare_ratio: f64,
}

impl Default for WeightReconciliationEngine {
    fn default() -> Self {
        Self {
            reference_tare_ratio: 0.5,
        }
    }
}

impl WeightReconciliationEngine {
    pub fn new(reference_tare_ratio: f64) -> Self {
        Self {
            reference_tare_ratio,
        }
    }

    pub fn from_config(config: &WeighbridgeConfig) -> Self {
        Self::new(config.reference_tare_ratio)
    }

    pub fn reference_tare_ratio(&self) -> f64 {
        self.reference_tare_ratio
    }

    /// Reconcile `gross` and `tare`.
    ///
    /// Fails with `InvalidWeight` when either reading is non-finite or not
    /// positive, or when `tare >= gross`.
    pub fn calculate_net_weight(
        &self,
        gross: f64,
        tare: f64,
        discrepancy_threshold_percent: f64,
    ) -> KernelResult<WeightReconciliation> {
        validate_reading("gross", gross)?;
        validate_reading("tare", tare)?;
        if tare >= gross {
            return Err(KernelError::InvalidWeight(format!(
                "tare weight {tare} must be less than gross weight {gross}"
            )));
        }
        if !discrepancy_threshold_percent.is_finite() {
            return Err(KernelError::Validation(
                "discrepancy threshold must be finite".into(),
            ));
        }

        let net_weight = gross - tare;
        let discrepancy_percentage = ((tare / gross) - self.reference_tare_ratio).abs() * 100.0;

        Ok(WeightReconciliation {
            net_weight,
            discrepancy_percentage,
            requires_supervisor_approval: discrepancy_percentage > discrepancy_threshold_percent,
        })
    }
}

/// A single reading must be finite and strictly positive.
pub(crate) fn validate_reading(label: &str, weight: f64) -> KernelResult<()> {
    if !weight.is_finite() {
        return Err(KernelError::InvalidWeight(format!(
            "{label} weight must be finite, got {weight}"
        )));
    }
    if weight <= 0.0 {
        return Err(KernelError::InvalidWeight(format!(
            "{label} weight must be positive, got {weight}"
        )));
    }
    Ok(())
}
