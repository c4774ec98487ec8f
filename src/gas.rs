// Gas normalizers.
//
// Two source shapes feed the same canonical schema:
//
// - Long format: one delimited file, one row per supply per month, same
//   pipeline as the electricity extract but with comma-decimal numbers.
// - Wide report format: a pair of report files (consumption, cost), one row
//   per supply with a column per month, banner lines above the header and a
//   grand-total footer below the data. Rows wrapped across physical lines
//   are stitched back together, the month columns are melted to long form,
//   and the two sides are outer-joined on (site, supply, province, year,
//   month) with zero fill.
//
// Report failures never escape `normalize_gas_report`: an unusable side is
// logged and contributes nothing, per the degrade-don't-abort contract.

use crate::error::LoadError;
use crate::reference::{month_from_abbrev, region_for_province};
use crate::sniff::{classify_source, DeclaredKind};
use crate::types::{CanonicalRecord, EnergyType, LoadStats, RawGasRow};
use crate::util::{parse_date_dayfirst, parse_decimal};
use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, Trim};
use std::collections::BTreeMap;
use tracing::warn;

/// Columns a long-format gas extract must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "CUPS",
    "Estado de factura",
    "Fecha desde",
    "Provincia",
    "Nombre suministro",
    "Consumo (kWh)",
    "Base imponible (€)",
];

/// Join key of one melted report observation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObservationKey {
    site_name: String,
    supply_id: String,
    province: String,
    year: i32,
    month: u32,
}

/// Normalize a long-format gas extract into canonical records.
pub fn normalize_gas_long(
    text: &str,
    dataset: &str,
) -> Result<(Vec<CanonicalRecord>, LoadStats), LoadError> {
    let desc = classify_source(text, DeclaredKind::GasLong, dataset)?;
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

    let mut stats = LoadStats::default();
    let mut records = Vec::new();

    for result in rdr.deserialize::<RawGasRow>() {
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

        let consumption_kwh = match parse_decimal(row.consumption_kwh.as_deref(), desc.decimal) {
            Some(v) => v.max(0.0),
            None => {
                if row.consumption_kwh.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                    stats.coerced_cells += 1;
                }
                0.0
            }
        };
        let cost_total = match parse_decimal(row.taxable_base.as_deref(), desc.decimal) {
            Some(v) => v,
            None => {
                if row.taxable_base.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                    stats.coerced_cells += 1;
                }
                0.0
            }
        };

        records.push(CanonicalRecord {
            invoice_date,
            year: invoice_date.year(),
            month: invoice_date.month(),
            supply_id: row.cups.unwrap_or_default().trim().to_string(),
            site_name: row.site_name.unwrap_or_default().trim().to_string(),
            province,
            region: region.to_string(),
            energy_type: EnergyType::Gas,
            voltage_class: None,
            consumption_kwh,
            cost_total,
            cost_breakdown: None,
        });
        stats.kept_rows += 1;
    }

    Ok((records, stats))
}

/// Interpret a report column label as a month column.
///
/// A `.1` suffix marks the duplicated block for the following year
/// (`ene` is January of the base year, `ene.1` January of base year + 1).
fn month_column(label: &str) -> Option<(u32, i32)> {
    let label = label.trim();
    let (base, offset) = match label.rsplit_once('.') {
        Some((base, "1")) => (base, 1),
        _ => (label, 0),
    };
    month_from_abbrev(base).map(|m| (m, offset))
}

/// Parse one wide report file into melted (key, value) observations.
fn parse_report(
    text: &str,
    base_year: i32,
    dataset: &str,
) -> Result<(Vec<(ObservationKey, f64)>, LoadStats), LoadError> {
    let desc = classify_source(text, DeclaredKind::GasReport, dataset)?;
    let lines: Vec<&str> = text.lines().collect();
    let header = lines[desc.header_line];
    let end = desc.footer_line.unwrap_or(lines.len());
    let delimiter = desc.delimiter as char;

    let mut stats = LoadStats::default();

    // Structural repair: a line opens a new logical row only when its first
    // field is a bare sequence number; anything else is a wrapped
    // continuation of the previous row. Noise above the first record is
    // discarded.
    let mut logical: Vec<String> = Vec::new();
    for raw in &lines[desc.header_line + 1..end] {
        if raw.trim().is_empty() {
            continue;
        }
        let first = raw.split(delimiter).next().unwrap_or("").trim();
        if !first.is_empty() && first.chars().all(|c| c.is_ascii_digit()) {
            logical.push((*raw).to_string());
        } else if let Some(prev) = logical.last_mut() {
            prev.push_str(raw);
            stats.repaired_lines += 1;
        }
    }

    let block = format!("{}\n{}", header, logical.join("\n"));
    let mut rdr = ReaderBuilder::new()
        .delimiter(desc.delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(block.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| LoadError::Csv {
            dataset: dataset.to_string(),
            cause: e,
        })?
        .clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| LoadError::MissingColumn {
                dataset: dataset.to_string(),
                column: name.to_string(),
            })
    };
    let site_col = find("Nombre suministro")?;
    let cups_col = find("CUPS")?;
    let province_col = find("Provincia")?;

    let month_cols: Vec<(usize, u32, i32)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| month_column(h).map(|(m, o)| (i, m, o)))
        .collect();
    if month_cols.is_empty() {
        return Err(LoadError::Format {
            dataset: dataset.to_string(),
            reason: "no month columns found".to_string(),
        });
    }

    let mut observations = Vec::new();
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(_) => {
                stats.parse_errors += 1;
                continue;
            }
        };
        stats.total_rows += 1;
        let site_name = record.get(site_col).unwrap_or_default().trim().to_string();
        let supply_id = record.get(cups_col).unwrap_or_default().trim().to_string();
        let province = record.get(province_col).unwrap_or_default().trim().to_string();

        for (idx, month, year_offset) in &month_cols {
            let cell = record.get(*idx);
            let value = match parse_decimal(cell, desc.decimal) {
                Some(v) => v,
                None => {
                    if cell.is_some_and(|s| !s.trim().is_empty()) {
                        stats.coerced_cells += 1;
                    }
                    0.0
                }
            };
            observations.push((
                ObservationKey {
                    site_name: site_name.clone(),
                    supply_id: supply_id.clone(),
                    province: province.clone(),
                    year: base_year + year_offset,
                    month: *month,
                },
                value,
            ));
        }
    }

    Ok((observations, stats))
}

fn absorb(into: &mut LoadStats, from: LoadStats) {
    into.total_rows += from.total_rows;
    into.coerced_cells += from.coerced_cells;
    into.repaired_lines += from.repaired_lines;
    into.parse_errors += from.parse_errors;
}

/// Normalize a paired wide gas report (consumption file + cost file).
///
/// Never fails: a side that cannot be parsed is logged and treated as
/// empty, and the outer join fills the missing metric with zero. The
/// degenerate case (neither side usable, or nothing survives the melt)
/// yields an empty record set.
pub fn normalize_gas_report(
    consumption_text: &str,
    cost_text: &str,
    base_year: i32,
    dataset: &str,
) -> (Vec<CanonicalRecord>, LoadStats) {
    let mut stats = LoadStats::default();

    let consumption = match parse_report(consumption_text, base_year, dataset) {
        Ok((obs, s)) => {
            absorb(&mut stats, s);
            obs
        }
        Err(e) => {
            warn!("skipping consumption side of {dataset}: {e}");
            Vec::new()
        }
    };
    let cost = match parse_report(cost_text, base_year, dataset) {
        Ok((obs, s)) => {
            absorb(&mut stats, s);
            obs
        }
        Err(e) => {
            warn!("skipping cost side of {dataset}: {e}");
            Vec::new()
        }
    };

    if consumption.is_empty() && cost.is_empty() {
        warn!("no data rows survived in {dataset}");
        return (Vec::new(), stats);
    }

    // Outer join; a key present on one side only keeps the other metric at
    // zero. BTreeMap keeps the output order deterministic.
    let mut joined: BTreeMap<ObservationKey, (f64, f64)> = BTreeMap::new();
    for (key, value) in consumption {
        joined.entry(key).or_insert((0.0, 0.0)).0 += value;
    }
    for (key, value) in cost {
        joined.entry(key).or_insert((0.0, 0.0)).1 += value;
    }

    let mut records = Vec::new();
    for (key, (kwh, cost)) in joined {
        // Lenient retention: drop only when both metrics are non-positive.
        if kwh <= 0.0 && cost <= 0.0 {
            stats.dropped_empty += 1;
            continue;
        }
        let Some(region) = region_for_province(&key.province) else {
            stats.dropped_unmapped_province += 1;
            continue;
        };
        // Reports carry no daily granularity: anchor on the first of month.
        let Some(invoice_date) = NaiveDate::from_ymd_opt(key.year, key.month, 1) else {
            continue;
        };
        records.push(CanonicalRecord {
            invoice_date,
            year: key.year,
            month: key.month,
            supply_id: key.supply_id,
            site_name: key.site_name,
            province: key.province,
            region: region.to_string(),
            energy_type: EnergyType::Gas,
            voltage_class: None,
            consumption_kwh: kwh.max(0.0),
            cost_total: cost,
            cost_breakdown: None,
        });
        stats.kept_rows += 1;
    }

    if records.is_empty() {
        warn!("no data rows survived in {dataset}");
    }
    (records, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_HEADER: &str = "CUPS;Estado de factura;Fecha desde;Provincia;\
Nombre suministro;Consumo (kWh);Base imponible (€)";

    #[test]
    fn long_format_parses_comma_decimals() {
        let text = format!(
            "{LONG_HEADER}\nES-G1;ACTIVA;01/03/2024;Madrid;Centro Norte;1.234,5;56,25\n"
        );
        let (records, stats) = normalize_gas_long(&text, "gas").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(stats.kept_rows, 1);
        let r = &records[0];
        assert_eq!(r.consumption_kwh, 1234.5);
        assert_eq!(r.cost_total, 56.25);
        assert_eq!(r.energy_type, EnergyType::Gas);
        assert_eq!(r.voltage_class, None);
        assert_eq!(r.region, "Comunidad de Madrid");
        assert_eq!(r.year, 2024);
        assert_eq!(r.month, 3);
    }

    #[test]
    fn long_format_applies_status_and_region_gates() {
        let text = format!(
            "{LONG_HEADER}\n\
             ES-G1;ANULADA;01/03/2024;Madrid;Centro;10;5\n\
             ES-G2;ACTIVA;01/03/2024;Narnia;Centro;10;5\n\
             ES-G3;activa;01/03/2024;Lugo;Centro;10;5\n"
        );
        let (records, stats) = normalize_gas_long(&text, "gas").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region, "Galicia");
        assert_eq!(stats.dropped_status, 1);
        assert_eq!(stats.dropped_unmapped_province, 1);
    }

    #[test]
    fn long_format_missing_column_is_named() {
        let text = "CUPS;Provincia\nES1;Madrid\n";
        let err = normalize_gas_long(text, "gas.csv").unwrap_err();
        match err {
            LoadError::MissingColumn { column, .. } => {
                assert_eq!(column, "Estado de factura");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn report(rows: &[&str]) -> String {
        let mut s = String::from(
            "Informe mensual de consumos\nEjercicio\n\
             Nº;Nombre suministro;CUPS;Provincia;ene;feb;mar;abr;may;jun;jul;ago;sep;oct;nov;dic",
        );
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s.push_str("\nTotal general;;;;;;;;;;;;;;;\n");
        s
    }

    #[test]
    fn scenario_b_reshape_and_join() {
        let consumption = report(&["1;Centro A;S1;Barcelona;10;20;0;0;0;0;0;0;0;0;0;0"]);
        let cost = report(&["1;Centro A;S1;Barcelona;5;8;0;0;0;0;0;0;0;0;0;0"]);
        let (records, stats) = normalize_gas_report(&consumption, &cost, 2024, "informe");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].month, 1);
        assert_eq!(records[0].consumption_kwh, 10.0);
        assert_eq!(records[0].cost_total, 5.0);
        assert_eq!(records[1].month, 2);
        assert_eq!(records[1].consumption_kwh, 20.0);
        assert_eq!(records[1].cost_total, 8.0);
        for r in &records {
            assert_eq!(r.region, "Cataluña");
            assert_eq!(r.energy_type, EnergyType::Gas);
            assert_eq!(r.invoice_date.day(), 1);
            assert_eq!(r.year, 2024);
        }
        assert_eq!(stats.dropped_empty, 10);
    }

    #[test]
    fn melt_preserves_the_monthly_totals() {
        let consumption = report(&["1;Centro A;S1;Girona;1;2;3;4;5;6;7;8;9;10;11;12"]);
        let cost = report(&["1;Centro A;S1;Girona;0;0;0;0;0;0;0;0;0;0;0;0"]);
        let (records, _) = normalize_gas_report(&consumption, &cost, 2024, "informe");
        assert_eq!(records.len(), 12);
        let total: f64 = records.iter().map(|r| r.consumption_kwh).sum();
        assert_eq!(total, 78.0);
        let months: Vec<u32> = records.iter().map(|r| r.month).collect();
        assert_eq!(months, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn wrapped_rows_are_repaired() {
        let consumption = "Banner\n\
            Nº;Nombre suministro;CUPS;Provincia;ene;feb\n\
            1;Centro Asis\n\
            tencial;S1;Sevilla;10,5;20\n\
            2;Centro B;S2;Sevilla;1;2\n\
            Total general;;;;;\n";
        let cost = "Nº;Nombre suministro;CUPS;Provincia;ene;feb\nTotal general;;;;;\n";
        let (records, stats) = normalize_gas_report(consumption, cost, 2024, "informe");
        assert_eq!(stats.repaired_lines, 1);
        assert_eq!(records.len(), 4);
        assert!(records.iter().any(|r| r.site_name == "Centro Asistencial"
            && r.consumption_kwh == 10.5));
    }

    #[test]
    fn footer_truncates_the_data_block() {
        let consumption = "Nº;Nombre suministro;CUPS;Provincia;ene\n\
            1;Centro A;S1;Madrid;10\n\
            Total general;;;;999\n\
            1;Centro fantasma;S9;Madrid;500\n";
        let cost = "Nº;Nombre suministro;CUPS;Provincia;ene\nTotal general;;;;\n";
        let (records, _) = normalize_gas_report(consumption, cost, 2024, "informe");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].consumption_kwh, 10.0);
    }

    #[test]
    fn duplicated_month_block_maps_to_next_year() {
        let consumption = "Nº;Nombre suministro;CUPS;Provincia;ene;ene.1\n\
            1;Centro A;S1;Madrid;10;30\n";
        let cost = "Nº;Nombre suministro;CUPS;Provincia;ene;ene.1\n\
            1;Centro A;S1;Madrid;5;15\n";
        let (records, _) = normalize_gas_report(consumption, cost, 2023, "informe");
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].year, records[0].month), (2023, 1));
        assert_eq!(records[0].consumption_kwh, 10.0);
        assert_eq!((records[1].year, records[1].month), (2024, 1));
        assert_eq!(records[1].consumption_kwh, 30.0);
        assert_eq!(records[1].cost_total, 15.0);
    }

    #[test]
    fn outer_join_zero_fills_the_missing_side() {
        let consumption = report(&["1;Centro A;S1;Madrid;10;0;0;0;0;0;0;0;0;0;0;0"]);
        // The cost report is structurally broken: no header line at all.
        let cost = "esto no es un informe\n";
        let (records, _) = normalize_gas_report(&consumption, cost, 2024, "informe");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].consumption_kwh, 10.0);
        assert_eq!(records[0].cost_total, 0.0);
    }

    #[test]
    fn row_with_cost_but_no_consumption_is_retained() {
        let consumption = report(&["1;Centro A;S1;Madrid;0;0;0;0;0;0;0;0;0;0;0;0"]);
        let cost = report(&["1;Centro A;S1;Madrid;7,5;0;0;0;0;0;0;0;0;0;0;0"]);
        let (records, _) = normalize_gas_report(&consumption, &cost, 2024, "informe");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].consumption_kwh, 0.0);
        assert_eq!(records[0].cost_total, 7.5);
    }

    #[test]
    fn unrepairable_pair_yields_empty_not_error() {
        let (records, stats) =
            normalize_gas_report("banner only\n", "also banner\n", 2024, "informe");
        assert!(records.is_empty());
        assert_eq!(stats.kept_rows, 0);
    }

    #[test]
    fn report_normalization_is_idempotent() {
        let consumption = report(&["1;Centro A;S1;Barcelona;10;20;0;0;0;0;0;0;0;0;0;0"]);
        let cost = report(&["1;Centro A;S1;Barcelona;5;8;0;0;0;0;0;0;0;0;0;0"]);
        let (a, sa) = normalize_gas_report(&consumption, &cost, 2024, "informe");
        let (b, sb) = normalize_gas_report(&consumption, &cost, 2024, "informe");
        assert_eq!(a, b);
        assert_eq!(sa, sb);
    }
}
