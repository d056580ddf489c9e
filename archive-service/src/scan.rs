//! Demand-field diagnostics.
//!
//! Bills only carry `Demand_kw` for tariffs with demand charges. Running the
//! scan before a bulk load shows which meters need the 15-column bills
//! projection.

use serde::Serialize;
use utility_client::{domain::DEMAND_KW_COLUMN, ApiError, DatasetKind, MeterDataProvider};

use crate::{
    sources::{active_meters, fetch_dataset},
    table::Table,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DemandFieldStatus {
    Present,
    /// The bills export has no demand column.
    Absent,
    /// The bills export could not be fetched or parsed.
    Unavailable { error: String },
}

impl DemandFieldStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }
}

pub fn demand_field_status(table: &Table) -> DemandFieldStatus {
    match table.column(DEMAND_KW_COLUMN) {
        Ok(_) => DemandFieldStatus::Present,
        Err(_) => DemandFieldStatus::Absent,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemandProbe {
    pub meter_uid: String,
    #[serde(flatten)]
    pub status: DemandFieldStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DemandScan {
    pub probes: Vec<DemandProbe>,
}

/// Printable scan result: the lacking list first, then every probe.
#[derive(Debug, Serialize)]
pub struct DemandScanReport<'a> {
    pub lacking_demand: Vec<&'a str>,
    pub probes: &'a [DemandProbe],
}

impl DemandScan {
    pub fn report(&self) -> DemandScanReport<'_> {
        DemandScanReport {
            lacking_demand: self.lacking_demand(),
            probes: &self.probes,
        }
    }

    /// Meters without a usable demand field, absent or unavailable alike.
    pub fn lacking_demand(&self) -> Vec<&str> {
        self.probes
            .iter()
            .filter(|p| !p.status.is_present())
            .map(|p| p.meter_uid.as_str())
            .collect()
    }

    /// Meters whose bills export was read and has no demand column.
    pub fn absent(&self) -> Vec<&str> {
        self.probes
            .iter()
            .filter(|p| p.status == DemandFieldStatus::Absent)
            .map(|p| p.meter_uid.as_str())
            .collect()
    }

    /// Meters that could not be probed, with the error text.
    pub fn unavailable(&self) -> Vec<(&str, &str)> {
        self.probes
            .iter()
            .filter_map(|p| match &p.status {
                DemandFieldStatus::Unavailable { error } => Some((p.meter_uid.as_str(), error.as_str())),
                _ => None,
            })
            .collect()
    }
}

pub async fn probe_demand_field<P>(provider: &P, meter_uid: &str) -> DemandFieldStatus
where
    P: MeterDataProvider + ?Sized,
{
    match fetch_dataset(provider, meter_uid, DatasetKind::Bills).await {
        Ok(table) => demand_field_status(&table),
        Err(e) => {
            tracing::warn!(meter_uid, error = %e, "could not probe demand field");
            DemandFieldStatus::Unavailable { error: e.to_string() }
        }
    }
}

/// Probes every active meter's bills export in directory order.
///
/// Only a failed directory lookup is an error; per-meter failures are
/// recorded as [`DemandFieldStatus::Unavailable`].
pub async fn scan_demand_fields<P>(provider: &P) -> Result<DemandScan, ApiError>
where
    P: MeterDataProvider + ?Sized,
{
    let mut scan = DemandScan::default();

    for meter_uid in active_meters(provider).await? {
        let status = probe_demand_field(provider, &meter_uid).await;
        scan.probes.push(DemandProbe { meter_uid, status });
    }

    tracing::info!(
        scanned = scan.probes.len(),
        lacking = scan.lacking_demand().len(),
        unavailable = scan.unavailable().len(),
        "demand field scan complete"
    );
    Ok(scan)
}
