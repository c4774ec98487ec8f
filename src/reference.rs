// Static lookup data shared by both normalizers.
//
// Everything here is immutable and infallible: unknown tariff codes resolve
// to `Undefined`, unknown provinces resolve to `None` (which drops the record
// downstream, see §region handling in the normalizers).

use crate::types::VoltageClass;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Province -> autonomous community, as the invoices spell the provinces
/// (INE-style names, e.g. "Balears, Illes" or "Coruña, A").
pub static PROVINCE_TO_REGION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Almería", "Andalucía"),
        ("Cádiz", "Andalucía"),
        ("Córdoba", "Andalucía"),
        ("Granada", "Andalucía"),
        ("Huelva", "Andalucía"),
        ("Jaén", "Andalucía"),
        ("Málaga", "Andalucía"),
        ("Sevilla", "Andalucía"),
        ("Huesca", "Aragón"),
        ("Teruel", "Aragón"),
        ("Zaragoza", "Aragón"),
        ("Asturias", "Principado de Asturias"),
        ("Balears, Illes", "Islas Baleares"),
        ("Araba/Álava", "País Vasco"),
        ("Bizkaia", "País Vasco"),
        ("Gipuzkoa", "País Vasco"),
        ("Las Palmas", "Canarias"),
        ("Santa Cruz de Tenerife", "Canarias"),
        ("Cantabria", "Cantabria"),
        ("Ávila", "Castilla y León"),
        ("Burgos", "Castilla y León"),
        ("León", "Castilla y León"),
        ("Palencia", "Castilla y León"),
        ("Salamanca", "Castilla y León"),
        ("Segovia", "Castilla y León"),
        ("Soria", "Castilla y León"),
        ("Valladolid", "Castilla y León"),
        ("Zamora", "Castilla y León"),
        ("Albacete", "Castilla-La Mancha"),
        ("Ciudad Real", "Castilla-La Mancha"),
        ("Cuenca", "Castilla-La Mancha"),
        ("Guadalajara", "Castilla-La Mancha"),
        ("Toledo", "Castilla-La Mancha"),
        ("Barcelona", "Cataluña"),
        ("Girona", "Cataluña"),
        ("Lleida", "Cataluña"),
        ("Tarragona", "Cataluña"),
        ("Ceuta", "Ceuta"),
        ("Badajoz", "Extremadura"),
        ("Cáceres", "Extremadura"),
        ("Coruña, A", "Galicia"),
        ("Lugo", "Galicia"),
        ("Ourense", "Galicia"),
        ("Pontevedra", "Galicia"),
        ("Rioja, La", "La Rioja"),
        ("Madrid", "Comunidad de Madrid"),
        ("Melilla", "Melilla"),
        ("Murcia", "Región de Murcia"),
        ("Navarra", "Comunidad Foral de Navarra"),
        ("Valencia/València", "Comunidad Valenciana"),
        ("Alicante/Alacant", "Comunidad Valenciana"),
        ("Castellón", "Comunidad Valenciana"),
        ("Castellón/Castelló", "Comunidad Valenciana"),
    ])
});

/// Access-tariff codes billed as high voltage.
pub const HIGH_VOLTAGE_TARIFFS: [&str; 4] = ["6.1TD", "6.2TD", "6.3TD", "6.4TD"];

/// Access-tariff codes billed as low voltage.
pub const LOW_VOLTAGE_TARIFFS: [&str; 2] = ["2.0TD", "3.0TD"];

/// Emission factor for grid electricity, tonnes of CO2e per MWh.
pub const CO2_FACTOR_T_PER_MWH: f64 = 0.25;

/// Month column labels used by the wide gas reports, calendar order.
pub const MONTH_ABBREVS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
];

/// Look up the autonomous community for a province name.
pub fn region_for_province(province: &str) -> Option<&'static str> {
    PROVINCE_TO_REGION.get(province.trim()).copied()
}

/// Classify an access tariff code. Unknown codes are `Undefined`, never an
/// error: the record is kept and only the voltage dimension stays blank.
pub fn voltage_for_tariff(code: &str) -> VoltageClass {
    let code = code.trim();
    if HIGH_VOLTAGE_TARIFFS.contains(&code) {
        VoltageClass::HighVoltage
    } else if LOW_VOLTAGE_TARIFFS.contains(&code) {
        VoltageClass::LowVoltage
    } else {
        VoltageClass::Undefined
    }
}

/// Month number (1..=12) for a local abbreviation. `sept` is accepted as the
/// four-letter variant of September.
pub fn month_from_abbrev(label: &str) -> Option<u32> {
    let label = label.trim().to_lowercase();
    if label == "sept" {
        return Some(9);
    }
    MONTH_ABBREVS
        .iter()
        .position(|m| *m == label)
        .map(|i| i as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provinces_map_to_their_community() {
        assert_eq!(region_for_province("Madrid"), Some("Comunidad de Madrid"));
        assert_eq!(region_for_province("Barcelona"), Some("Cataluña"));
        assert_eq!(region_for_province("Bizkaia"), Some("País Vasco"));
        assert_eq!(region_for_province("Balears, Illes"), Some("Islas Baleares"));
        assert_eq!(region_for_province("  Sevilla  "), Some("Andalucía"));
    }

    #[test]
    fn unknown_province_has_no_region() {
        assert_eq!(region_for_province("Unknown Province"), None);
        assert_eq!(region_for_province(""), None);
    }

    #[test]
    fn tariff_codes_classify() {
        assert_eq!(voltage_for_tariff("6.1TD"), VoltageClass::HighVoltage);
        assert_eq!(voltage_for_tariff("6.4TD"), VoltageClass::HighVoltage);
        assert_eq!(voltage_for_tariff("2.0TD"), VoltageClass::LowVoltage);
        assert_eq!(voltage_for_tariff(" 3.0TD "), VoltageClass::LowVoltage);
        assert_eq!(voltage_for_tariff("3.1A"), VoltageClass::Undefined);
        assert_eq!(voltage_for_tariff(""), VoltageClass::Undefined);
    }

    #[test]
    fn month_abbreviations_cover_the_year() {
        assert_eq!(month_from_abbrev("ene"), Some(1));
        assert_eq!(month_from_abbrev("DIC"), Some(12));
        assert_eq!(month_from_abbrev("sept"), Some(9));
        assert_eq!(month_from_abbrev("sep"), Some(9));
        assert_eq!(month_from_abbrev("enero"), None);
        assert_eq!(month_from_abbrev(""), None);
    }
}
