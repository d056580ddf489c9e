use serde::Deserialize;
use utility_client::domain::{Coercion, DatasetKind, DatasetSchema};

use crate::{
    pipeline::{Envelope, PipelineError, Transform},
    scan::demand_field_status,
    table::{SchemaError, Table},
};

/// Whether a bills projection carries the optional `Demand_kw` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandField {
    Included,
    Excluded,
}

/// How the batch picks a [`DemandField`] for each meter's bills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandPolicy {
    /// Probe each fetched table for the demand column.
    #[default]
    Detect,
    Include,
    Exclude,
}

/// Projects `table` onto `schema` and applies the integer coercion hints.
pub fn normalize(table: &Table, schema: &DatasetSchema, include_optional: bool) -> Result<Table, SchemaError> {
    let columns = schema.column_names(include_optional);
    let mut out = table.select(&columns)?;

    for col in schema.columns.iter().filter(|c| c.coercion == Coercion::Integer) {
        if out.has_column(col.name) {
            out.map_column(col.name, coerce_integer)?;
        }
    }

    Ok(out)
}

/// 16 columns with demand, 15 without. Never inspects the table to decide.
pub fn normalize_bills(table: &Table, demand: DemandField) -> Result<Table, SchemaError> {
    normalize(table, DatasetKind::Bills.schema(), demand == DemandField::Included)
}

pub fn normalize_intervals(table: &Table) -> Result<Table, SchemaError> {
    normalize(table, DatasetKind::Intervals.schema(), true)
}

/// Best-effort integer rendering: `12.0` becomes `12`. Anything that is not
/// an integral number is left alone.
pub fn coerce_integer(cell: &str) -> Option<String> {
    if cell.parse::<i64>().is_ok() {
        return None;
    }
    let v: f64 = cell.parse().ok()?;
    // Past 2^53 an f64 no longer round-trips every integer.
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        Some((v as i64).to_string())
    } else {
        None
    }
}

/// Pipeline stage that normalizes each envelope according to its kind.
#[derive(Clone, Default)]
pub struct DatasetNormalization {
    demand: DemandPolicy,
}

impl DatasetNormalization {
    pub fn new(demand: DemandPolicy) -> Self {
        Self { demand }
    }

    fn demand_for(&self, table: &Table) -> DemandField {
        match self.demand {
            DemandPolicy::Include => DemandField::Included,
            DemandPolicy::Exclude => DemandField::Excluded,
            DemandPolicy::Detect if demand_field_status(table).is_present() => DemandField::Included,
            DemandPolicy::Detect => DemandField::Excluded,
        }
    }
}

#[async_trait::async_trait]
impl Transform<Table, Table> for DatasetNormalization {
    async fn apply(&self, input: Envelope<Table>) -> Result<Envelope<Table>, PipelineError> {
        let schema = input.kind.schema();
        let include_optional = match schema.kind {
            DatasetKind::Bills => self.demand_for(&input.payload) == DemandField::Included,
            DatasetKind::Intervals => true,
        };
        let result = normalize(&input.payload, schema, include_optional);

        match result {
            Ok(table) => Ok(Envelope {
                payload: table,
                ..input
            }),
            Err(source) => {
                metrics::counter!("normalization_schema_errors_total", "dataset" => input.kind.as_str())
                    .increment(1);
                tracing::error!(meter_uid = %input.meter_uid, dataset = %input.kind, error = %source, "schema drift");
                Err(PipelineError::Schema {
                    meter_uid: input.meter_uid,
                    kind: input.kind,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use utility_client::domain::{BILLS_SCHEMA, DEMAND_KW_COLUMN, INTERVALS_SCHEMA};

    use super::*;
    use crate::test_support::{bills_csv, intervals_csv, table};

    fn parse(csv: &str) -> Table {
        Table::read_csv(csv.as_bytes()).unwrap().0
    }

    fn envelope(kind: DatasetKind, payload: Table) -> Envelope<Table> {
        Envelope {
            meter_uid: "1001".to_string(),
            kind,
            payload,
            received_at: SystemTime::now(),
        }
    }

    #[test]
    fn bills_with_demand_projects_sixteen_columns() {
        let raw = parse(&bills_csv("1001", 4, true));
        let out = normalize_bills(&raw, DemandField::Included).unwrap();

        assert_eq!(out.headers(), BILLS_SCHEMA.column_names(true).as_slice());
        assert_eq!(out.headers().len(), 16);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn bills_without_demand_projects_fifteen_columns() {
        let raw = parse(&bills_csv("1001", 4, true));
        let out = normalize_bills(&raw, DemandField::Excluded).unwrap();

        assert_eq!(out.headers().len(), 15);
        assert!(!out.has_column(DEMAND_KW_COLUMN));
    }

    #[test]
    fn with_demand_on_table_lacking_it_is_a_missing_column_error() {
        let raw = parse(&bills_csv("1001", 4, false));
        let err = normalize_bills(&raw, DemandField::Included).unwrap_err();

        assert!(matches!(err, SchemaError::MissingColumn { ref column, .. } if column == DEMAND_KW_COLUMN));
    }

    #[test]
    fn intervals_yield_thirteen_ordered_columns() {
        let raw = parse(&intervals_csv("1001", 3));
        assert_eq!(raw.headers().len(), 14);

        let out = normalize_intervals(&raw).unwrap();
        assert_eq!(out.headers(), INTERVALS_SCHEMA.column_names(true).as_slice());
        assert_eq!(out.len(), 3);
        assert_eq!(out.rows()[0][0], "1001");
    }

    #[test]
    fn intervals_apply_lossless_integer_coercion() {
        let raw = parse(&intervals_csv("1001", 3));
        let out = normalize_intervals(&raw).unwrap();

        let kwh: Vec<&str> = out.column("interval_kWh").unwrap().collect();
        let net: Vec<&str> = out.column("net_kWh").unwrap().collect();
        assert_eq!(kwh, ["0", "1", "2"]);
        assert_eq!(net, ["0.25", "0.25", "0.25"]);
    }

    #[test]
    fn coercion_never_fails() {
        assert_eq!(coerce_integer("12.0"), Some("12".to_string()));
        assert_eq!(coerce_integer("-3.00"), Some("-3".to_string()));
        assert_eq!(coerce_integer("42"), None);
        assert_eq!(coerce_integer("1.5"), None);
        assert_eq!(coerce_integer(""), None);
        assert_eq!(coerce_integer("N/A"), None);
        assert_eq!(coerce_integer("NaN"), None);
        assert_eq!(coerce_integer("1e300"), None);
    }

    #[test]
    fn intervals_missing_a_column_fail() {
        let raw = table(&["meter_uid", "utility"], &[&["1001", "PG&E"]]);
        assert!(normalize_intervals(&raw).is_err());
    }

    #[tokio::test]
    async fn detect_policy_follows_table_contents() {
        let stage = DatasetNormalization::new(DemandPolicy::Detect);

        let with = stage
            .apply(envelope(DatasetKind::Bills, parse(&bills_csv("1001", 1, true))))
            .await
            .unwrap();
        let without = stage
            .apply(envelope(DatasetKind::Bills, parse(&bills_csv("1001", 1, false))))
            .await
            .unwrap();

        assert_eq!(with.payload.headers().len(), 16);
        assert_eq!(without.payload.headers().len(), 15);
    }

    #[tokio::test]
    async fn pinned_include_policy_reports_schema_error() {
        let stage = DatasetNormalization::new(DemandPolicy::Include);
        let res = stage
            .apply(envelope(DatasetKind::Bills, parse(&bills_csv("1001", 1, false))))
            .await;

        assert!(matches!(res, Err(PipelineError::Schema { kind: DatasetKind::Bills, .. })));
    }

    #[tokio::test]
    async fn intervals_envelope_uses_the_intervals_schema() {
        let stage = DatasetNormalization::new(DemandPolicy::Exclude);
        let out = stage
            .apply(envelope(DatasetKind::Intervals, parse(&intervals_csv("1001", 2))))
            .await
            .unwrap();

        assert_eq!(out.payload.headers(), INTERVALS_SCHEMA.column_names(true).as_slice());
        assert_eq!(out.payload.len(), 2);
    }
}
