// Entry point and high-level CLI flow.
//
// The binary is presentation glue around the library:
// - Option [1] loads the declared source files, printing per-source
//   diagnostics.
// - Option [2] derives the dashboard views for the latest loaded year,
//   writes them to CSV/JSON files and prints Markdown previews.
// - After generating views, the user can choose to go back to the
//   selection menu or exit.

use energia_report::output;
use energia_report::reports;
use energia_report::util::{format_int, format_number};
use energia_report::{
    geo, CanonicalStore, FilterConfig, Pipeline, Source, SourceKind, SourceLocation,
};
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

// Simple in-memory app state so sources are loaded once (and re-loads hit
// the memo cache) while views can be generated multiple times per run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        pipeline: Pipeline::new(),
        store: None,
    })
});

struct AppState {
    pipeline: Pipeline,
    store: Option<CanonicalStore>,
}

/// Print a prompt and read a single trimmed line of input.
fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Ask the user whether to go back to the view selection menu after
/// generating views.
fn prompt_back_to_menu() -> bool {
    loop {
        let resp = read_line("Back to Selection (Y/N): ").to_uppercase();
        match resp.as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Collect source declarations from the user. Kinds are always declared
/// explicitly; nothing is guessed from file names.
fn prompt_sources() -> Vec<Source> {
    let mut sources = Vec::new();

    let elec = read_line("Electricity extract path (blank to skip): ");
    if !elec.is_empty() {
        sources.push(Source {
            id: format!("electricity:{elec}"),
            kind: SourceKind::Electricity {
                location: SourceLocation::Path(PathBuf::from(elec)),
            },
        });
    }

    let gas = read_line("Gas extract path (blank to skip): ");
    if !gas.is_empty() {
        sources.push(Source {
            id: format!("gas:{gas}"),
            kind: SourceKind::GasLong {
                location: SourceLocation::Path(PathBuf::from(gas)),
            },
        });
    }

    let report = read_line("Gas report pair consumption;cost;year (blank to skip): ");
    if !report.is_empty() {
        let parts: Vec<&str> = report.split(';').map(str::trim).collect();
        match (parts.first(), parts.get(1), parts.get(2).and_then(|y| y.parse::<i32>().ok())) {
            (Some(consumption), Some(cost), Some(base_year)) if parts.len() == 3 => {
                sources.push(Source {
                    id: format!("gas-report:{consumption}"),
                    kind: SourceKind::GasReport {
                        consumption: SourceLocation::Path(PathBuf::from(consumption)),
                        cost: SourceLocation::Path(PathBuf::from(cost)),
                        base_year,
                    },
                });
            }
            _ => println!("Expected consumption;cost;year. Skipping the gas report pair."),
        }
    }

    sources
}

/// Handle option [1]: load the declared sources into the Canonical Store.
fn handle_load() {
    let sources = prompt_sources();
    if sources.is_empty() {
        println!("No sources given.\n");
        return;
    }
    let mut state = APP_STATE.lock().unwrap();
    let (store, outcomes) = state.pipeline.load(&sources);
    for o in &outcomes {
        match &o.error {
            Some(msg) => println!("  {} -> skipped: {}", o.source_id, msg),
            None => {
                println!(
                    "  {} -> {} records kept of {} rows{}",
                    o.source_id,
                    format_int(o.stats.kept_rows as i64),
                    format_int(o.stats.total_rows as i64),
                    if o.from_cache { " (cached)" } else { "" }
                );
                if o.stats.coerced_cells > 0 {
                    println!(
                        "      note: {} numeric cells zero-filled",
                        format_int(o.stats.coerced_cells as i64)
                    );
                }
            }
        }
    }
    println!(
        "Canonical store ready: {} records.\n",
        format_int(store.len() as i64)
    );
    state.store = Some(store);
}

/// Handle option [2]: derive all views for the latest loaded year, export
/// them and print previews.
fn handle_generate_views() {
    let store = {
        let state = APP_STATE.lock().unwrap();
        state.store.clone()
    };
    let Some(store) = store else {
        println!("Error: No data loaded. Please load the sources first (option 1).\n");
        return;
    };
    let Some(&year) = store.years().last() else {
        println!("The canonical store is empty: nothing to aggregate.\n");
        return;
    };

    let cfg = FilterConfig::for_year(year, store.regions());
    let rows = reports::apply_filters(store.records(), &cfg);
    println!("Generating views for {} ({} records)...\n", year, format_int(rows.len() as i64));

    let t = reports::totals(&rows);
    println!("Consumo Electricidad: {} kWh", format_number(t.electricity_kwh, 0));
    println!("Coste Electricidad:   € {}", format_number(t.electricity_cost, 2));
    println!("Consumo Gas:          {} kWh", format_number(t.gas_kwh, 0));
    println!("Coste Gas:            € {}", format_number(t.gas_cost, 2));
    println!("Suministros activos:  {}", format_int(t.active_supplies as i64));
    println!("Emisiones CO2:        {} t", format_number(t.co2_tonnes, 2));
    println!("Coste medio:          € {}/kWh\n", format_number(t.average_unit_cost, 4));
    if let Err(e) = output::write_json("summary.json", &t) {
        eprintln!("Write error: {}", e);
    }

    let breakdown = reports::grouped_breakdown(&rows, &cfg);
    if let Err(e) = output::write_csv("view_breakdown.csv", &breakdown) {
        eprintln!("Write error: {}", e);
    }
    println!("Consumo y Coste por {:?} (view_breakdown.csv)", cfg.effective_group_by());
    output::preview_table(&breakdown, 3);

    let series = reports::monthly_series(&rows, &cfg);
    if let Err(e) = output::write_csv("view_monthly.csv", &series) {
        eprintln!("Write error: {}", e);
    }
    println!("Evolución Mensual (view_monthly.csv)");
    output::preview_table(&series, 3);

    let voltage = reports::voltage_distribution(&rows);
    if let Err(e) = output::write_csv("view_voltage.csv", &voltage) {
        eprintln!("Write error: {}", e);
    }
    println!("Distribución por Tipo de Tensión (view_voltage.csv)");
    output::preview_table(&voltage, 3);

    let comparison = reports::year_comparison(store.records(), &cfg);
    if let Err(e) = output::write_csv("view_comparison.csv", &comparison) {
        eprintln!("Write error: {}", e);
    }
    println!("Comparativa Interanual (view_comparison.csv)");
    output::preview_table(&comparison, 3);

    // The map view degrades gracefully: a failed vocabulary fetch skips it
    // and everything above stands.
    match geo::fetch_region_vocabulary(geo::REGION_VOCABULARY_URL) {
        Ok(vocabulary) => {
            let resolution =
                geo::resolve_regions(&store.regions(), &vocabulary, &geo::EditDistanceMatcher);
            let map = geo::map_breakdown(&rows, &resolution);
            if let Err(e) = output::write_csv("view_map.csv", &map) {
                eprintln!("Write error: {}", e);
            }
            println!("Mapa por Comunidad (view_map.csv)");
            output::preview_table(&map, 3);
            if !resolution.unresolved.is_empty() {
                println!(
                    "Note: {} region(s) not matched to the polygon vocabulary.\n",
                    resolution.unresolved.len()
                );
            }
        }
        Err(e) => eprintln!("Map view skipped: {}\n", e),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    loop {
        println!("Select an option:");
        println!("[1] Load the sources");
        println!("[2] Generate Dashboard Views\n");
        match read_line("Enter choice: ").as_str() {
            "1" => {
                handle_load();
            }
            "2" => {
                println!();
                handle_generate_views();
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1 or 2.\n");
            }
        }
    }
}
