use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Name of the optional demand-charge column in the bills CSV.
pub const DEMAND_KW_COLUMN: &str = "Demand_kw";

/// The two datasets the provider exports per meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Bills,
    Intervals,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Bills, DatasetKind::Intervals];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bills => "bills",
            Self::Intervals => "intervals",
        }
    }

    /// Path of the CSV download endpoint, relative to the API base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Bills => "files/meters_bills_csv",
            Self::Intervals => "files/intervals_csv",
        }
    }

    pub fn schema(self) -> &'static DatasetSchema {
        match self {
            Self::Bills => &BILLS_SCHEMA,
            Self::Intervals => &INTERVALS_SCHEMA,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown dataset kind '{0}' (expected 'bills' or 'intervals')")]
pub struct UnknownDatasetKind(pub String);

impl FromStr for DatasetKind {
    type Err = UnknownDatasetKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bills" => Ok(Self::Bills),
            "intervals" => Ok(Self::Intervals),
            _ => Err(UnknownDatasetKind(s.to_string())),
        }
    }
}

/// Normalization hint attached to an archived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub coercion: Coercion,
    /// Present only for some tariffs; its absence is a schema fact, not an error.
    pub optional: bool,
}

impl ColumnSpec {
    const fn text(name: &'static str) -> Self {
        Self {
            name,
            coercion: Coercion::Text,
            optional: false,
        }
    }

    const fn integer(name: &'static str) -> Self {
        Self {
            name,
            coercion: Coercion::Integer,
            optional: false,
        }
    }

    const fn optional_text(name: &'static str) -> Self {
        Self {
            name,
            coercion: Coercion::Text,
            optional: true,
        }
    }
}

/// Ordered set of columns archived for one dataset kind.
#[derive(Debug)]
pub struct DatasetSchema {
    pub kind: DatasetKind,
    pub columns: &'static [ColumnSpec],
}

impl DatasetSchema {
    /// Column names in archival order, optional columns included only when
    /// `include_optional` is set.
    pub fn column_names(&self, include_optional: bool) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| include_optional || !c.optional)
            .map(|c| c.name)
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

pub static BILLS_SCHEMA: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Bills,
    columns: &[
        ColumnSpec::text("meter_uid"),
        ColumnSpec::text("utility"),
        ColumnSpec::text("utility_service_id"),
        ColumnSpec::text("utility_billing_account"),
        ColumnSpec::text("utility_service_address"),
        ColumnSpec::text("utility_meter_number"),
        ColumnSpec::text("utility_tariff_name"),
        ColumnSpec::text("bill_start_date"),
        ColumnSpec::text("bill_end_date"),
        ColumnSpec::text("bill_days"),
        ColumnSpec::text("bill_statement_date"),
        ColumnSpec::text("bill_total_kWh"),
        ColumnSpec::text("bill_total"),
        ColumnSpec::text("bill_volume"),
        ColumnSpec::text("bill_total_unit"),
        ColumnSpec::optional_text(DEMAND_KW_COLUMN),
    ],
};

pub static INTERVALS_SCHEMA: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Intervals,
    columns: &[
        ColumnSpec::integer("meter_uid"),
        ColumnSpec::text("utility"),
        ColumnSpec::integer("utility_service_id"),
        ColumnSpec::text("utility_service_address"),
        ColumnSpec::integer("utility_meter_number"),
        ColumnSpec::text("utility_tariff_name"),
        ColumnSpec::text("interval_start"),
        ColumnSpec::text("interval_end"),
        ColumnSpec::integer("interval_kWh"),
        ColumnSpec::integer("net_kWh"),
        ColumnSpec::text("source"),
        ColumnSpec::text("updated"),
        ColumnSpec::text("interval_timezone"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bills_schema_has_fifteen_required_plus_demand() {
        let required = BILLS_SCHEMA.column_names(false);
        let full = BILLS_SCHEMA.column_names(true);

        assert_eq!(required.len(), 15);
        assert_eq!(full.len(), 16);
        assert_eq!(full.last(), Some(&DEMAND_KW_COLUMN));
        assert!(!required.contains(&DEMAND_KW_COLUMN));
    }

    #[test]
    fn intervals_schema_has_thirteen_columns() {
        let cols = INTERVALS_SCHEMA.column_names(true);
        assert_eq!(cols.len(), 13);
        assert_eq!(cols[0], "meter_uid");
        assert_eq!(cols[12], "interval_timezone");
        assert_eq!(
            INTERVALS_SCHEMA.column("net_kWh").map(|c| c.coercion),
            Some(Coercion::Integer)
        );
    }

    #[test]
    fn dataset_kind_parses_case_insensitively() {
        assert_eq!("Bills".parse::<DatasetKind>(), Ok(DatasetKind::Bills));
        assert_eq!(" intervals ".parse::<DatasetKind>(), Ok(DatasetKind::Intervals));
        assert!("usage".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn each_kind_resolves_to_its_own_schema() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.schema().kind, kind);
        }
        assert_eq!(DatasetKind::Intervals.schema().column_names(true).len(), 13);
    }
}
