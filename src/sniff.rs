// Source classification.
//
// The caller always declares what a source is supposed to be (electricity
// extract, gas extract, wide gas report); the sniffer only works out the
// mechanical layout: delimiter, decimal convention and, for report files,
// where the data block starts and ends. Nothing is ever inferred from file
// names.

use crate::error::LoadError;
use crate::util::DecimalConvention;

/// What the caller says the source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredKind {
    Electricity,
    GasLong,
    GasReport,
}

/// Mechanical layout of a source, resolved once per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub delimiter: u8,
    pub decimal: DecimalConvention,
    /// Index of the header line within the raw text.
    pub header_line: usize,
    /// Index of the footer sentinel line, when one exists (reports only).
    pub footer_line: Option<usize>,
}

/// Tokens that must all appear (case-insensitively) on a report header line.
pub const REPORT_HEADER_TOKENS: [&str; 3] = ["cups", "provincia", "ene"];

/// Trailing marker after which a report carries only grand totals.
pub const REPORT_FOOTER_SENTINEL: &str = "Total general";

/// Pick the field delimiter by counting candidates on one line.
/// Ties go to the more specific separators first; a line with none of them
/// falls back to comma.
fn detect_delimiter(line: &str) -> u8 {
    let semicolons = line.matches(';').count();
    let tabs = line.matches('\t').count();
    let commas = line.matches(',').count();
    if semicolons >= tabs && semicolons >= commas && semicolons > 0 {
        b';'
    } else if tabs >= commas && tabs > 0 {
        b'\t'
    } else {
        b','
    }
}

fn is_report_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    REPORT_HEADER_TOKENS.iter().all(|t| lower.contains(t))
}

/// Determine the layout of a source given its declared kind.
///
/// For tabular kinds the header is the first non-empty line. For report
/// files the header is located by its required column tokens and the footer
/// by the sentinel phrase; a report with no recognizable header cannot be
/// processed and fails with `LoadError::Format` (the caller skips the file,
/// it does not abort the load).
pub fn classify_source(text: &str, kind: DeclaredKind, dataset: &str) -> Result<FormatDescriptor, LoadError> {
    let decimal = match kind {
        DeclaredKind::Electricity => DecimalConvention::PointDecimal,
        DeclaredKind::GasLong | DeclaredKind::GasReport => DecimalConvention::CommaDecimal,
    };

    match kind {
        DeclaredKind::Electricity | DeclaredKind::GasLong => {
            let (idx, line) = text
                .lines()
                .enumerate()
                .find(|(_, l)| !l.trim().is_empty())
                .ok_or_else(|| LoadError::Format {
                    dataset: dataset.to_string(),
                    reason: "source is empty".to_string(),
                })?;
            Ok(FormatDescriptor {
                delimiter: detect_delimiter(line),
                decimal,
                header_line: idx,
                footer_line: None,
            })
        }
        DeclaredKind::GasReport => {
            let header_line = text
                .lines()
                .position(is_report_header)
                .ok_or_else(|| LoadError::Format {
                    dataset: dataset.to_string(),
                    reason: "no header line found".to_string(),
                })?;
            let sentinel = REPORT_FOOTER_SENTINEL.to_lowercase();
            let footer_line = text
                .lines()
                .enumerate()
                .skip(header_line + 1)
                .find(|(_, l)| l.trim().to_lowercase().starts_with(&sentinel))
                .map(|(i, _)| i);
            let header = text.lines().nth(header_line).unwrap_or_default();
            Ok(FormatDescriptor {
                delimiter: detect_delimiter(header),
                decimal,
                header_line,
                footer_line,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_and_tab_and_semicolon_detect() {
        assert_eq!(detect_delimiter("CUPS,Provincia,Consumo"), b',');
        assert_eq!(detect_delimiter("CUPS\tProvincia\tConsumo"), b'\t');
        assert_eq!(detect_delimiter("CUPS;Provincia;Consumo"), b';');
        // No separator at all falls back to comma.
        assert_eq!(detect_delimiter("CUPS"), b',');
    }

    #[test]
    fn electricity_layout_is_first_content_line() {
        let text = "\n\nCUPS,Estado de factura\nES001,ACTIVA\n";
        let desc = classify_source(text, DeclaredKind::Electricity, "t").unwrap();
        assert_eq!(desc.header_line, 2);
        assert_eq!(desc.delimiter, b',');
        assert_eq!(desc.decimal, DecimalConvention::PointDecimal);
        assert_eq!(desc.footer_line, None);
    }

    #[test]
    fn gas_long_uses_comma_decimal_convention() {
        let text = "CUPS;Consumo (kWh)\nES1;10,5\n";
        let desc = classify_source(text, DeclaredKind::GasLong, "t").unwrap();
        assert_eq!(desc.decimal, DecimalConvention::CommaDecimal);
        assert_eq!(desc.delimiter, b';');
    }

    #[test]
    fn report_header_and_footer_are_located() {
        let text = "Informe de consumos\nEjercicio 2024\n\
                    Nº;Nombre suministro;CUPS;Provincia;ene;feb\n\
                    1;Centro A;ES1;Madrid;10;20\n\
                    Total general;;;;10;20\n";
        let desc = classify_source(text, DeclaredKind::GasReport, "t").unwrap();
        assert_eq!(desc.header_line, 2);
        assert_eq!(desc.footer_line, Some(4));
        assert_eq!(desc.delimiter, b';');
        assert_eq!(desc.decimal, DecimalConvention::CommaDecimal);
    }

    #[test]
    fn report_without_footer_runs_to_end() {
        let text = "Nº,Nombre suministro,CUPS,Provincia,ene\n1,Centro A,ES1,Madrid,10\n";
        let desc = classify_source(text, DeclaredKind::GasReport, "t").unwrap();
        assert_eq!(desc.header_line, 0);
        assert_eq!(desc.footer_line, None);
    }

    #[test]
    fn report_without_header_is_a_format_error() {
        let text = "just some banner\nanother banner\n";
        let err = classify_source(text, DeclaredKind::GasReport, "informe.csv").unwrap_err();
        match err {
            LoadError::Format { dataset, reason } => {
                assert_eq!(dataset, "informe.csv");
                assert!(reason.contains("header"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_tabular_source_is_a_format_error() {
        let err = classify_source("\n  \n", DeclaredKind::Electricity, "e.csv").unwrap_err();
        assert!(matches!(err, LoadError::Format { .. }));
    }
}
