// Filter & aggregation engine.
//
// Every view is a pure function of (records, FilterConfig). The
// configuration travels explicitly through each call; nothing about the
// user's selection is ambient state. Monthly views are always reindexed
// against the full 12-month template so a missing month shows up as an
// explicit zero instead of silently shifting series out of alignment.

use crate::reference::CO2_FACTOR_T_PER_MWH;
use crate::types::{
    BreakdownRow, CanonicalRecord, CostComponents, DashboardTotals, EnergyType,
    MonthComparisonRow, MonthlyPoint, VoltageClass, VoltageSliceRow,
};
use std::collections::{BTreeMap, HashSet};

/// Energy-type predicate; `Both` disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyFilter {
    Electricity,
    Gas,
    Both,
}

/// Grouping key of the primary breakdown view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Province,
    Region,
    Site,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAggregation {
    Monthly,
    /// Collapse the year into a single bucket (month 13).
    AnnualCumulative,
}

/// Bucket number used for the collapsed whole-year view.
pub const ANNUAL_BUCKET: u32 = 13;

/// One interaction's worth of filter selections.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Exact-match year, required.
    pub year: i32,
    pub energy_type: EnergyFilter,
    /// Allowed regions. An empty selection is a valid selection and yields
    /// an empty result, not "all".
    pub regions: Vec<String>,
    /// When disabled, `sites` is ignored entirely.
    pub site_filter_enabled: bool,
    pub sites: Vec<String>,
    /// Applied to electricity rows only; gas rows are never excluded by it.
    pub voltage_classes: Vec<VoltageClass>,
    /// Explicit override of the grouping key; `None` uses the default rule.
    pub group_by: Option<GroupBy>,
    pub time_aggregation: TimeAggregation,
}

impl FilterConfig {
    /// Everything-selected configuration for one year: both energy types,
    /// the given regions, no site restriction, all voltage classes, monthly.
    pub fn for_year(year: i32, regions: Vec<String>) -> Self {
        FilterConfig {
            year,
            energy_type: EnergyFilter::Both,
            regions,
            site_filter_enabled: false,
            sites: Vec::new(),
            voltage_classes: vec![
                VoltageClass::HighVoltage,
                VoltageClass::LowVoltage,
                VoltageClass::Undefined,
            ],
            group_by: None,
            time_aggregation: TimeAggregation::Monthly,
        }
    }

    /// Default grouping rule: Site when the site filter is active with a
    /// non-empty selection, Region otherwise.
    pub fn effective_group_by(&self) -> GroupBy {
        if let Some(group_by) = self.group_by {
            group_by
        } else if self.site_filter_enabled && !self.sites.is_empty() {
            GroupBy::Site
        } else {
            GroupBy::Region
        }
    }

    fn bucket(&self, month: u32) -> u32 {
        match self.time_aggregation {
            TimeAggregation::Monthly => month,
            TimeAggregation::AnnualCumulative => ANNUAL_BUCKET,
        }
    }
}

/// Apply every configured predicate and return the surviving records.
pub fn apply_filters<'a>(
    records: &'a [CanonicalRecord],
    cfg: &FilterConfig,
) -> Vec<&'a CanonicalRecord> {
    records
        .iter()
        .filter(|r| {
            if r.year != cfg.year {
                return false;
            }
            let energy_ok = match cfg.energy_type {
                EnergyFilter::Both => true,
                EnergyFilter::Electricity => r.energy_type == EnergyType::Electricity,
                EnergyFilter::Gas => r.energy_type == EnergyType::Gas,
            };
            if !energy_ok {
                return false;
            }
            if !cfg.regions.iter().any(|allowed| allowed == &r.region) {
                return false;
            }
            if cfg.site_filter_enabled && !cfg.sites.iter().any(|s| s == &r.site_name) {
                return false;
            }
            match r.energy_type {
                EnergyType::Gas => true,
                EnergyType::Electricity => cfg
                    .voltage_classes
                    .contains(&r.voltage_class.unwrap_or(VoltageClass::Undefined)),
            }
        })
        .collect()
}

/// Headline KPIs over the filtered set.
pub fn totals(rows: &[&CanonicalRecord]) -> DashboardTotals {
    let mut electricity_kwh = 0.0;
    let mut electricity_cost = 0.0;
    let mut gas_kwh = 0.0;
    let mut gas_cost = 0.0;
    let mut supplies: HashSet<&str> = HashSet::new();
    for r in rows {
        match r.energy_type {
            EnergyType::Electricity => {
                electricity_kwh += r.consumption_kwh;
                electricity_cost += r.cost_total;
            }
            EnergyType::Gas => {
                gas_kwh += r.consumption_kwh;
                gas_cost += r.cost_total;
            }
        }
        supplies.insert(r.supply_id.as_str());
    }
    let total_kwh = electricity_kwh + gas_kwh;
    let total_cost = electricity_cost + gas_cost;
    DashboardTotals {
        electricity_kwh,
        electricity_cost,
        gas_kwh,
        gas_cost,
        active_supplies: supplies.len(),
        co2_tonnes: electricity_kwh * CO2_FACTOR_T_PER_MWH / 1000.0,
        average_unit_cost: if total_kwh == 0.0 {
            0.0
        } else {
            total_cost / total_kwh
        },
    }
}

/// Primary breakdown: (time bucket, group key) sums, ordered by bucket then
/// consumption descending (chart series render largest-first).
pub fn grouped_breakdown(rows: &[&CanonicalRecord], cfg: &FilterConfig) -> Vec<BreakdownRow> {
    let group_by = cfg.effective_group_by();
    let mut acc: BTreeMap<(u32, &str), (f64, f64)> = BTreeMap::new();
    for r in rows {
        let group = match group_by {
            GroupBy::Province => r.province.as_str(),
            GroupBy::Region => r.region.as_str(),
            GroupBy::Site => r.site_name.as_str(),
        };
        let e = acc.entry((cfg.bucket(r.month), group)).or_insert((0.0, 0.0));
        e.0 += r.consumption_kwh;
        e.1 += r.cost_total;
    }
    let mut out: Vec<BreakdownRow> = acc
        .into_iter()
        .map(|((month, group), (consumption_kwh, cost))| BreakdownRow {
            month,
            group: group.to_string(),
            consumption_kwh,
            cost,
        })
        .collect();
    out.sort_by(|a, b| {
        a.month
            .cmp(&b.month)
            .then(b.consumption_kwh.total_cmp(&a.consumption_kwh))
            .then_with(|| a.group.cmp(&b.group))
    });
    out
}

/// Consumption/cost split by voltage class over the electricity rows.
pub fn voltage_distribution(rows: &[&CanonicalRecord]) -> Vec<VoltageSliceRow> {
    let classes = [
        VoltageClass::HighVoltage,
        VoltageClass::LowVoltage,
        VoltageClass::Undefined,
    ];
    let mut out = Vec::new();
    for class in classes {
        let mut consumption_kwh = 0.0;
        let mut cost = 0.0;
        let mut seen = false;
        for r in rows {
            if r.energy_type == EnergyType::Electricity && r.voltage_class == Some(class) {
                consumption_kwh += r.consumption_kwh;
                cost += r.cost_total;
                seen = true;
            }
        }
        if seen {
            out.push(VoltageSliceRow {
                voltage: class.to_string(),
                consumption_kwh,
                cost,
            });
        }
    }
    out
}

fn reindex(rows: &[&CanonicalRecord], energy: EnergyType) -> [(f64, f64); 12] {
    let mut months = [(0.0, 0.0); 12];
    for r in rows {
        if r.energy_type == energy {
            let slot = &mut months[r.month as usize - 1];
            slot.0 += r.consumption_kwh;
            slot.1 += r.cost_total;
        }
    }
    months
}

/// Monthly evolution, reindexed: exactly 12 entries per selected energy
/// type, zero-filled for months with no matching records.
pub fn monthly_series(rows: &[&CanonicalRecord], cfg: &FilterConfig) -> Vec<MonthlyPoint> {
    let energies: &[EnergyType] = match cfg.energy_type {
        EnergyFilter::Electricity => &[EnergyType::Electricity],
        EnergyFilter::Gas => &[EnergyType::Gas],
        EnergyFilter::Both => &[EnergyType::Electricity, EnergyType::Gas],
    };
    let mut out = Vec::with_capacity(energies.len() * 12);
    for &energy_type in energies {
        let months = reindex(rows, energy_type);
        for (i, (consumption_kwh, cost)) in months.into_iter().enumerate() {
            out.push(MonthlyPoint {
                month: i as u32 + 1,
                energy_type,
                consumption_kwh,
                cost,
            });
        }
    }
    out
}

/// Current year vs prior year, both reindexed against the 12-month template
/// and paired by month number (not by row position, so differing row order
/// or missing months in either year cannot misalign the pairs).
pub fn year_comparison(records: &[CanonicalRecord], cfg: &FilterConfig) -> Vec<MonthComparisonRow> {
    let current_rows = apply_filters(records, cfg);
    let mut prior_cfg = cfg.clone();
    prior_cfg.year = cfg.year - 1;
    let prior_rows = apply_filters(records, &prior_cfg);

    let sum_both = |rows: &[&CanonicalRecord]| {
        let e = reindex(rows, EnergyType::Electricity);
        let g = reindex(rows, EnergyType::Gas);
        let mut months = [(0.0, 0.0); 12];
        for i in 0..12 {
            months[i] = (e[i].0 + g[i].0, e[i].1 + g[i].1);
        }
        months
    };
    let current = sum_both(&current_rows);
    let prior = sum_both(&prior_rows);

    (0..12)
        .map(|i| MonthComparisonRow {
            month: i as u32 + 1,
            current_kwh: current[i].0,
            prior_kwh: prior[i].0,
            current_cost: current[i].1,
            prior_cost: prior[i].1,
        })
        .collect()
}

/// Summed electricity cost components over the filtered set. Records
/// without a breakdown (or with absent components) contribute zero here and
/// only here.
pub fn cost_components(rows: &[&CanonicalRecord]) -> CostComponents {
    let mut out = CostComponents::default();
    for r in rows {
        if r.energy_type != EnergyType::Electricity {
            continue;
        }
        if let Some(b) = &r.cost_breakdown {
            out.energy += b.energy.unwrap_or(0.0);
            out.power += b.power.unwrap_or(0.0);
            out.taxes += b.taxes.unwrap_or(0.0);
            out.rental += b.rental.unwrap_or(0.0);
            out.other += b.other.unwrap_or(0.0);
        }
    }
    out
}
