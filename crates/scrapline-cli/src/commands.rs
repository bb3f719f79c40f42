use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use scrapline_kernel::{content_hash, KernelConfig, WeightReconciliationEngine};
use scrapline_types::GatePassCredential;
use serde::Serialize;

use crate::output::{print_success, print_warning, print_with, OutputFormat};

pub fn net_weight(
    config: &KernelConfig,
    gross: f64,
    tare: f64,
    threshold: Option<f64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let threshold = threshold.unwrap_or(config.weighbridge.discrepancy_threshold_percent);
    let result = WeightReconciliationEngine::from_config(&config.weighbridge)
        .calculate_net_weight(gross, tare, threshold)?;

    print_with(&result, format, |r| {
        println!("Net weight:   {:.2}", r.net_weight);
        println!("Discrepancy:  {:.2}% (threshold {threshold:.2}%)", r.discrepancy_percentage);
        if r.requires_supervisor_approval {
            print_warning("Supervisor approval required");
        } else {
            print_success("Within threshold");
        }
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileDigest {
    path: String,
    file_hash: String,
    file_size: u64,
}

pub async fn hash_file(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let digest = FileDigest {
        path: path.display().to_string(),
        file_hash: content_hash(&bytes),
        file_size: bytes.len() as u64,
    };
    print_with(&digest, format, |d| {
        println!("{}  {} ({} bytes)", d.file_hash, d.path, d.file_size);
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PassReport {
    credential: GatePassCredential,
    checked_at: DateTime<Utc>,
    expired: bool,
    remaining_minutes: i64,
}

pub async fn inspect_pass(payload: &str, format: OutputFormat) -> anyhow::Result<()> {
    let raw = match payload.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {path}"))?,
        None => payload.to_string(),
    };
    let credential = GatePassCredential::from_payload(raw.trim())
        .context("Invalid QR code format")?;

    let now = Utc::now();
    let report = PassReport {
        expired: credential.is_expired_at(now),
        remaining_minutes: (credential.expires_at - now).num_minutes(),
        checked_at: now,
        credential,
    };

    print_with(&report, format, |r| {
        println!("Transaction:  {}", r.credential.transaction_id);
        println!("Vehicle:      {}", r.credential.vehicle_number);
        println!("Generated:    {}", r.credential.generated_at.to_rfc3339());
        println!("Expires:      {}", r.credential.expires_at.to_rfc3339());
        println!("Nonce:        {}", r.credential.nonce);
        if r.expired {
            print_warning("Gate pass expired; exit needs a supervisor override");
        } else {
            print_success(&format!("Valid for another {} minutes", r.remaining_minutes));
        }
    })
}
