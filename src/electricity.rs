// Electricity extract normalizer.
//
// One delimited file per load, one row per invoice line. The pipeline is:
// whitelist check -> ACTIVA status gate -> lenient numeric coercion ->
// date/region/voltage derivation -> CanonicalRecord. Unparsable numeric
// cells zero-fill and the row is kept; rows only drop when a hard
// derivation (status, date, region) fails.

use crate::error::LoadError;
use crate::reference::{region_for_province, voltage_for_tariff};
use crate::sniff::{classify_source, DeclaredKind};
use crate::types::{CanonicalRecord, CostBreakdown, EnergyType, LoadStats, RawElectricityRow};
use crate::util::{parse_date_dayfirst, parse_decimal, DecimalConvention};
use chrono::Datelike;
use csv::{ReaderBuilder, Trim};

/// Columns an electricity extract must carry. The first one missing is
/// reported by name.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "CUPS",
    "Estado de factura",
    "Fecha desde",
    "Provincia",
    "Nombre suministro",
    "Tarifa de acceso",
    "Consumo activa total (kWh)",
    "Base imponible (€)",
];

/// Optional cost-component columns; older extracts do not carry them.
pub const BREAKDOWN_COLUMNS: [&str; 5] = [
    "Coste energía (€)",
    "Coste potencia (€)",
    "Impuestos (€)",
    "Alquiler de equipos (€)",
    "Otros conceptos (€)",
];

/// Zero-filling coercion for a mandatory numeric cell. A non-empty cell
/// that fails to parse counts as coerced.
fn coerce(stats: &mut LoadStats, cell: Option<&str>, convention: DecimalConvention) -> f64 {
    match parse_decimal(cell, convention) {
        Some(v) => v,
        None => {
            if cell.is_some_and(|s| !s.trim().is_empty()) {
                stats.coerced_cells += 1;
            }
            0.0
        }
    }
}

/// Coercion for an optional breakdown component: absent or empty stays
/// absent, a malformed non-empty cell zero-fills.
fn coerce_component(
    stats: &mut LoadStats,
    cell: Option<&str>,
    convention: DecimalConvention,
) -> Option<f64> {
    let cell = cell.map(str::trim).filter(|s| !s.is_empty())?;
    match parse_decimal(Some(cell), convention) {
        Some(v) => Some(v),
        None => {
            stats.coerced_cells += 1;
            Some(0.0)
        }
    }
}

/// Normalize an electricity extract into canonical records.
pub fn normalize_electricity(
    text: &str,
    dataset: &str,
) -> Result<(Vec<CanonicalRecord>, LoadStats), LoadError> {
    let desc = classify_source(text, DeclaredKind::Electricity, dataset)?;
    let body: String = text
        .lines()
        .skip(desc.header_line)
        .collect::<Vec<_>>()
        .join("\n");

    let mut rdr = ReaderBuilder::new()
        .delimiter(desc.delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| LoadError::Csv {
            dataset: dataset.to_string(),
            cause: e,
        })?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(LoadError::MissingColumn {
                dataset: dataset.to_string(),
                column: column.to_string(),
            });
        }
    }
    let has_breakdown = BREAKDOWN_COLUMNS
        .iter()
        .any(|c| headers.iter().any(|h| h == *c));

    let mut stats = LoadStats::default();
    let mut records = Vec::new();

    for result in rdr.deserialize::<RawElectricityRow>() {
        stats.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                stats.parse_errors += 1;
                continue;
            }
        };

        let active = row
            .status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("ACTIVA"));
        if !active {
            stats.dropped_status += 1;
            continue;
        }

        let Some(invoice_date) = parse_date_dayfirst(row.date_from.as_deref()) else {
            stats.dropped_undated += 1;
            continue;
        };

        let province = row.province.unwrap_or_default().trim().to_string();
        let Some(region) = region_for_province(&province) else {
            stats.dropped_unmapped_province += 1;
            continue;
        };

        let consumption_kwh =
            coerce(&mut stats, row.consumption_kwh.as_deref(), desc.decimal).max(0.0);
        let cost_total = coerce(&mut stats, row.taxable_base.as_deref(), desc.decimal);

        let cost_breakdown = has_breakdown.then(|| CostBreakdown {
            energy: coerce_component(&mut stats, row.cost_energy.as_deref(), desc.decimal),
            power: coerce_component(&mut stats, row.cost_power.as_deref(), desc.decimal),
            taxes: coerce_component(&mut stats, row.cost_taxes.as_deref(), desc.decimal),
            rental: coerce_component(&mut stats, row.cost_rental.as_deref(), desc.decimal),
            other: coerce_component(&mut stats, row.cost_other.as_deref(), desc.decimal),
        });

        records.push(CanonicalRecord {
            invoice_date,
            year: invoice_date.year(),
            month: invoice_date.month(),
            supply_id: row.cups.unwrap_or_default().trim().to_string(),
            site_name: row.site_name.unwrap_or_default().trim().to_string(),
            province,
            region: region.to_string(),
            energy_type: EnergyType::Electricity,
            voltage_class: Some(voltage_for_tariff(
                row.tariff.as_deref().unwrap_or_default(),
            )),
            consumption_kwh,
            cost_total,
            cost_breakdown,
        });
        stats.kept_rows += 1;
    }

    Ok((records, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoltageClass;
    use chrono::NaiveDate;

    const HEADER: &str = "CUPS,Estado de factura,Fecha desde,Provincia,Nombre suministro,\
Tarifa de acceso,Consumo activa total (kWh),Base imponible (€)";

    fn extract(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn scenario_a_two_active_rows_survive() {
        let text = extract(&[
            "ES001,ANULADA,15/01/2024,Madrid,Centro Norte,3.0TD,50,10",
            "ES002,ACTIVA,15/01/2024,Madrid,Centro Norte,3.0TD,100,20",
            "ES003,ACTIVA,15/02/2024,Madrid,Centro Sur,6.1TD,200,40",
        ]);
        let (records, stats) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(stats.dropped_status, 1);
        for r in &records {
            assert_eq!(r.region, "Comunidad de Madrid");
            assert_eq!(r.energy_type, EnergyType::Electricity);
        }
        let total_kwh: f64 = records.iter().map(|r| r.consumption_kwh).sum();
        let total_cost: f64 = records.iter().map(|r| r.cost_total).sum();
        assert_eq!(total_kwh, 300.0);
        assert_eq!(total_cost, 60.0);
    }

    #[test]
    fn status_gate_is_case_insensitive() {
        let text = extract(&[
            "ES001,activa,15/01/2024,Madrid,Centro,2.0TD,10,1",
            "ES002,Activa,15/01/2024,Madrid,Centro,2.0TD,10,1",
            "ES003,PENDIENTE,15/01/2024,Madrid,Centro,2.0TD,10,1",
            "ES004,,15/01/2024,Madrid,Centro,2.0TD,10,1",
        ]);
        let (records, stats) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(stats.dropped_status, 2);
    }

    #[test]
    fn missing_required_column_is_named() {
        let text = "CUPS,Estado de factura,Provincia\nES1,ACTIVA,Madrid\n";
        let err = normalize_electricity(text, "facturas.csv").unwrap_err();
        match err {
            LoadError::MissingColumn { dataset, column } => {
                assert_eq!(dataset, "facturas.csv");
                assert_eq!(column, "Fecha desde");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unlisted_columns_are_ignored() {
        let text = format!(
            "{HEADER},Comentario interno\nES1,ACTIVA,15/01/2024,Madrid,Centro,2.0TD,10,1,algo\n"
        );
        let (records, _) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn malformed_numbers_zero_fill_and_keep_the_row() {
        let text = extract(&[
            "ES001,ACTIVA,15/01/2024,Madrid,Centro,2.0TD,no-data,20",
            "ES002,ACTIVA,15/01/2024,Madrid,Centro,2.0TD,-5,20",
        ]);
        let (records, stats) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].consumption_kwh, 0.0);
        assert_eq!(records[0].cost_total, 20.0);
        // Negative consumption clamps to zero without dropping the row.
        assert_eq!(records[1].consumption_kwh, 0.0);
        assert_eq!(stats.coerced_cells, 1);
    }

    #[test]
    fn thousands_separators_parse() {
        let text = extract(&["ES001,ACTIVA,15/01/2024,Madrid,Centro,2.0TD,\"1,234.5\",\"2,000.25\""]);
        let (records, _) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records[0].consumption_kwh, 1234.5);
        assert_eq!(records[0].cost_total, 2000.25);
    }

    #[test]
    fn unmapped_province_drops_the_record() {
        let text = extract(&[
            "ES001,ACTIVA,15/01/2024,Unknown Province,Centro,2.0TD,10,1",
            "ES002,ACTIVA,15/01/2024,Sevilla,Centro,2.0TD,10,1",
        ]);
        let (records, stats) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region, "Andalucía");
        assert_eq!(stats.dropped_unmapped_province, 1);
    }

    #[test]
    fn unparsable_date_drops_the_record() {
        let text = extract(&[
            "ES001,ACTIVA,not-a-date,Madrid,Centro,2.0TD,10,1",
            "ES002,ACTIVA,05/03/2024,Madrid,Centro,2.0TD,10,1",
        ]);
        let (records, stats) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(stats.dropped_undated, 1);
        assert_eq!(records[0].invoice_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(records[0].year, 2024);
        assert_eq!(records[0].month, 3);
    }

    #[test]
    fn voltage_class_derives_and_never_drops() {
        let text = extract(&[
            "ES001,ACTIVA,15/01/2024,Madrid,Centro,6.2TD,10,1",
            "ES002,ACTIVA,15/01/2024,Madrid,Centro,9.9XX,10,1",
        ]);
        let (records, _) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records[0].voltage_class, Some(VoltageClass::HighVoltage));
        assert_eq!(records[1].voltage_class, Some(VoltageClass::Undefined));
    }

    #[test]
    fn tab_delimited_extracts_parse() {
        let text = format!(
            "{}\n{}",
            HEADER.replace(',', "\t"),
            "ES001\tACTIVA\t15/01/2024\tMadrid\tCentro\t2.0TD\t10\t1"
        );
        let (records, _) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].supply_id, "ES001");
    }

    #[test]
    fn quoted_province_with_comma_maps() {
        let text = extract(&["ES001,ACTIVA,15/01/2024,\"Balears, Illes\",Centro,2.0TD,10,1"]);
        let (records, _) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records[0].region, "Islas Baleares");
    }

    #[test]
    fn breakdown_absent_when_extract_has_no_component_columns() {
        let text = extract(&["ES001,ACTIVA,15/01/2024,Madrid,Centro,2.0TD,10,1"]);
        let (records, _) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(records[0].cost_breakdown, None);
    }

    #[test]
    fn breakdown_components_parse_and_empty_cells_stay_absent() {
        let text = format!(
            "{HEADER},Coste energía (€),Coste potencia (€),Impuestos (€),\
Alquiler de equipos (€),Otros conceptos (€)\n\
ES001,ACTIVA,15/01/2024,Madrid,Centro,2.0TD,10,20,12.5,4.0,,1.5,bad\n"
        );
        let (records, stats) = normalize_electricity(&text, "test").unwrap();
        let b = records[0].cost_breakdown.unwrap();
        assert_eq!(b.energy, Some(12.5));
        assert_eq!(b.power, Some(4.0));
        assert_eq!(b.taxes, None);
        assert_eq!(b.rental, Some(1.5));
        assert_eq!(b.other, Some(0.0));
        assert_eq!(stats.coerced_cells, 1);
    }

    #[test]
    fn normalization_is_idempotent() {
        let text = extract(&[
            "ES001,ACTIVA,15/01/2024,Madrid,Centro Norte,3.0TD,100,20",
            "ES002,ACTIVA,15/02/2024,Girona,Centro Este,6.1TD,bad,40",
        ]);
        let (a, sa) = normalize_electricity(&text, "test").unwrap();
        let (b, sb) = normalize_electricity(&text, "test").unwrap();
        assert_eq!(a, b);
        assert_eq!(sa, sb);
    }
}
