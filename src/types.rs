use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// Energy carrier of a billing line-item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnergyType {
    Electricity,
    Gas,
}

impl fmt::Display for EnergyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyType::Electricity => write!(f, "Electricidad"),
            EnergyType::Gas => write!(f, "Gas"),
        }
    }
}

/// Voltage classification derived from the access tariff. Electricity only;
/// unknown tariff codes classify as `Undefined` and are never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoltageClass {
    HighVoltage,
    LowVoltage,
    Undefined,
}

impl fmt::Display for VoltageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoltageClass::HighVoltage => write!(f, "Alta Tensión"),
            VoltageClass::LowVoltage => write!(f, "Baja Tensión"),
            VoltageClass::Undefined => write!(f, "No definido"),
        }
    }
}

/// Cost sub-components of an electricity invoice line. A component the
/// extract did not carry stays `None`; the breakdown view treats `None` as 0
/// but nothing else does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub energy: Option<f64>,
    pub power: Option<f64>,
    pub taxes: Option<f64>,
    pub rental: Option<f64>,
    pub other: Option<f64>,
}

/// One normalized billing line-item. Every surviving record has its region,
/// year and month populated; rows failing any derivation are excluded during
/// normalization instead of kept with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub invoice_date: NaiveDate,
    pub year: i32,
    pub month: u32,
    /// CUPS of the metering point; business key for distinct-supply counts.
    pub supply_id: String,
    pub site_name: String,
    pub province: String,
    pub region: String,
    pub energy_type: EnergyType,
    /// `Some` for electricity (possibly `Undefined`), `None` for gas.
    pub voltage_class: Option<VoltageClass>,
    pub consumption_kwh: f64,
    pub cost_total: f64,
    pub cost_breakdown: Option<CostBreakdown>,
}

/// Raw electricity extract row, field names as the portal exports them.
/// Everything is `Option<String>`: coercion happens in the normalizer, not
/// during deserialization.
#[derive(Debug, Deserialize)]
pub struct RawElectricityRow {
    #[serde(rename = "CUPS")]
    pub cups: Option<String>,
    #[serde(rename = "Estado de factura")]
    pub status: Option<String>,
    #[serde(rename = "Fecha desde")]
    pub date_from: Option<String>,
    #[serde(rename = "Provincia")]
    pub province: Option<String>,
    #[serde(rename = "Nombre suministro")]
    pub site_name: Option<String>,
    #[serde(rename = "Tarifa de acceso")]
    pub tariff: Option<String>,
    #[serde(rename = "Consumo activa total (kWh)")]
    pub consumption_kwh: Option<String>,
    #[serde(rename = "Base imponible (€)")]
    pub taxable_base: Option<String>,
    #[serde(rename = "Coste energía (€)", default)]
    pub cost_energy: Option<String>,
    #[serde(rename = "Coste potencia (€)", default)]
    pub cost_power: Option<String>,
    #[serde(rename = "Impuestos (€)", default)]
    pub cost_taxes: Option<String>,
    #[serde(rename = "Alquiler de equipos (€)", default)]
    pub cost_rental: Option<String>,
    #[serde(rename = "Otros conceptos (€)", default)]
    pub cost_other: Option<String>,
}

/// Raw gas extract row (long format, one row per supply per month).
#[derive(Debug, Deserialize)]
pub struct RawGasRow {
    #[serde(rename = "CUPS")]
    pub cups: Option<String>,
    #[serde(rename = "Estado de factura")]
    pub status: Option<String>,
    #[serde(rename = "Fecha desde")]
    pub date_from: Option<String>,
    #[serde(rename = "Provincia")]
    pub province: Option<String>,
    #[serde(rename = "Nombre suministro")]
    pub site_name: Option<String>,
    #[serde(rename = "Consumo (kWh)")]
    pub consumption_kwh: Option<String>,
    #[serde(rename = "Base imponible (€)")]
    pub taxable_base: Option<String>,
}

/// Per-source diagnostics accumulated while normalizing one extract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows seen in the source (physical rows for tabular files, logical
    /// rows after repair for the wide reports).
    pub total_rows: usize,
    /// CanonicalRecords produced.
    pub kept_rows: usize,
    /// Rows excluded because the invoice status was not ACTIVA.
    pub dropped_status: usize,
    /// Rows excluded because the province has no region mapping.
    pub dropped_unmapped_province: usize,
    /// Rows excluded because the invoice date failed to parse.
    pub dropped_undated: usize,
    /// Gas report rows excluded because consumption and cost were both
    /// non-positive.
    pub dropped_empty: usize,
    /// Numeric cells that failed coercion and were zero-filled.
    pub coerced_cells: usize,
    /// Wrapped physical lines merged back into their logical row.
    pub repaired_lines: usize,
    /// Rows the CSV reader could not decode at all.
    pub parse_errors: usize,
}

// ---------------------------------------------------------------------------
// Aggregated view rows consumed by the presentation layer.
// ---------------------------------------------------------------------------

/// Headline KPI block for the current filter selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTotals {
    pub electricity_kwh: f64,
    pub electricity_cost: f64,
    pub gas_kwh: f64,
    pub gas_cost: f64,
    /// Count of distinct supply ids in the filtered set.
    pub active_supplies: usize,
    /// Electricity emissions in tonnes of CO2e.
    pub co2_tonnes: f64,
    /// Cost per kWh over both carriers, 0 when there is no consumption.
    pub average_unit_cost: f64,
}

/// One bucket of the primary breakdown view (time bucket x group key).
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct BreakdownRow {
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: u32,
    #[serde(rename = "Grupo")]
    #[tabled(rename = "Grupo")]
    pub group: String,
    #[serde(rename = "Consumo_kWh")]
    #[tabled(rename = "Consumo_kWh")]
    pub consumption_kwh: f64,
    #[serde(rename = "Coste")]
    #[tabled(rename = "Coste")]
    pub cost: f64,
}

/// Consumption/cost split by voltage class (electricity rows only).
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct VoltageSliceRow {
    #[serde(rename = "Tipo de Tensión")]
    #[tabled(rename = "Tipo de Tensión")]
    pub voltage: String,
    #[serde(rename = "Consumo_kWh")]
    #[tabled(rename = "Consumo_kWh")]
    pub consumption_kwh: f64,
    #[serde(rename = "Coste")]
    #[tabled(rename = "Coste")]
    pub cost: f64,
}

/// One month of the reindexed time series. Months with no matching records
/// are present with zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct MonthlyPoint {
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: u32,
    #[serde(rename = "Energía")]
    #[tabled(rename = "Energía")]
    pub energy_type: EnergyType,
    #[serde(rename = "Consumo_kWh")]
    #[tabled(rename = "Consumo_kWh")]
    pub consumption_kwh: f64,
    #[serde(rename = "Coste")]
    #[tabled(rename = "Coste")]
    pub cost: f64,
}

/// Current-vs-prior-year pair for one month number.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct MonthComparisonRow {
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: u32,
    #[serde(rename = "Consumo_kWh")]
    #[tabled(rename = "Consumo_kWh")]
    pub current_kwh: f64,
    #[serde(rename = "Consumo_kWh_anterior")]
    #[tabled(rename = "Consumo_kWh_anterior")]
    pub prior_kwh: f64,
    #[serde(rename = "Coste")]
    #[tabled(rename = "Coste")]
    pub current_cost: f64,
    #[serde(rename = "Coste_anterior")]
    #[tabled(rename = "Coste_anterior")]
    pub prior_cost: f64,
}

/// Summed electricity cost components; absent components count as 0 here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostComponents {
    pub energy: f64,
    pub power: f64,
    pub taxes: f64,
    pub rental: f64,
    pub other: f64,
}

/// One polygon of the map view, keyed by the external vocabulary name.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct MapRow {
    #[serde(rename = "Comunidad")]
    #[tabled(rename = "Comunidad")]
    pub polygon_name: String,
    #[serde(rename = "Consumo_kWh")]
    #[tabled(rename = "Consumo_kWh")]
    pub consumption_kwh: f64,
    #[serde(rename = "Coste")]
    #[tabled(rename = "Coste")]
    pub cost: f64,
}
