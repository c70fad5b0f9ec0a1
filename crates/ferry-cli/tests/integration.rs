use ferry_cli::input::Input;
use ferry_cli::output::TsvStore;
use ferry_cli::runner::Runner;
use ferry_core::store::RunStore;
use ferry_core::table::{Coordinates, Feature, Identification, Provenance};
use std::path::PathBuf;

const RT_SHIFTS: [f64; 4] = [0.0, 0.8, -0.4, 1.2];

fn coordinates(p: usize, run: usize, noise: f64) -> Coordinates {
    Coordinates {
        mz: (450.0 + 31.0 * p as f64) * (1.0 + 2E-7 * noise),
        rt: 5.0 + 1.5 * p as f64 + RT_SHIFTS[run] + 0.04 * noise,
        mobility: Some(0.8 + 0.01 * p as f64 + 0.001 * noise),
    }
}

fn noise(p: usize, run: usize) -> f64 {
    match (p + run) % 2 {
        0 => 1.0,
        _ => -1.0,
    }
}

fn write_runs(dir: &PathBuf) -> anyhow::Result<Vec<String>> {
    let store = TsvStore::new(dir);
    let mut runs = Vec::new();
    for run in 0..RT_SHIFTS.len() {
        let name = format!("sample_{}", run);
        let first = if run == 0 { 4 } else { 0 };
        let ids = (first..20)
            .map(|p| Identification {
                precursor: format!("LESLIEK{}2", p),
                sequence: format!("LESoxMLIEK{}", p),
                naked_sequence: format!("LESMLIEK{}", p),
                db_idx: p,
                charge: 2,
                score: 1.0,
                decoy: false,
                target: true,
                measured: coordinates(p, run, noise(p, run)),
                calibrated: None,
                kind: Provenance::MsMs,
                probability: None,
                feature_idx: None,
                intensity: None,
            })
            .collect::<Vec<_>>();
        let features = (0..20)
            .map(|p| Feature {
                feature_idx: p,
                charge: 2,
                apex: coordinates(p, run, 0.0),
                calibrated: None,
                intensity: 1E5,
                fwhm: Some(0.15),
                n_isotopes: Some(2),
            })
            .collect::<Vec<_>>();
        store.write_identifications(&name, &ids)?;
        store.write_features(&name, &features)?;
        runs.push(format!("/raw/{}.d", name));
    }
    Ok(runs)
}

#[test]
fn align_and_match_tsv() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("ferry-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let runs = write_runs(&dir)?;

    let json = serde_json::json!({
        "runs": runs,
        "data_directory": dir,
        "threads": 2,
    });
    let search = Input::parse(&json.to_string())?.build()?;
    let search = Runner::new(search)?.run()?;

    assert_eq!(search.output_paths.len(), 2);
    let alignment = std::fs::read_to_string(dir.join("alignment.tsv"))?;
    let mut lines = alignment.lines();
    assert_eq!(lines.next(), Some("run\tmz_offset\trt_offset\tmobility_offset"));
    assert_eq!(lines.count(), 4);

    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("results.json"))?)?;
    assert_eq!(results["matching"]["match_p_min"], 0.05);
    assert_eq!(results["align"]["modes"]["rt"], "absolute");

    let store = TsvStore::new(&dir);
    let ids = store.read_identifications("sample_0")?;
    let matched = ids
        .iter()
        .filter(|id| id.kind == Provenance::Matched)
        .collect::<Vec<_>>();
    assert_eq!(matched.len(), 4);
    assert!(matched.iter().all(|id| id.probability.unwrap() < 0.05));
    assert!(matched.iter().all(|id| id.calibrated.is_some()));
    assert_eq!(matched[0].naked_sequence, "LESMLIEK0");

    for run in 1..4 {
        let ids = store.read_identifications(&format!("sample_{}", run))?;
        assert!(ids.iter().all(|id| id.kind == Provenance::MsMs));
        assert!(ids.iter().all(|id| id.calibrated.is_some()));
    }

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn missing_run_is_reported() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("ferry-cli-missing-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    let json = serde_json::json!({
        "runs": ["nowhere.d", "nothing.d"],
        "data_directory": dir,
    });
    let search = Input::parse(&json.to_string())?.build()?;
    let err = Runner::new(search)?.run().unwrap_err();
    assert!(format!("{:#}", err).contains("nowhere"), "{:#}", err);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
