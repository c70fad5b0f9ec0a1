use ferry_core::alignment::align;
use ferry_core::distance::distance;
use ferry_core::matching::match_runs;
use ferry_core::settings::{AlignSettings, Experiment, MatchSettings};
use ferry_core::store::{MemoryStore, RunStore};
use ferry_core::table::*;

const N_PRECURSORS: usize = 30;
/// Precursors that the last run did not identify
const MISSING: usize = 6;
/// Relative m/z shift and absolute retention time shift of each run
const SHIFTS: [(f64, f64); 4] = [(0.0, 0.0), (5E-6, 1.0), (-3E-6, -0.5), (8E-6, 2.0)];
const MZ_NOISE: f64 = 2E-7;
const RT_NOISE: f64 = 0.05;

fn true_position(p: usize) -> (f64, f64) {
    (400.0 + 25.0 * p as f64, 10.0 + 2.0 * p as f64)
}

/// Alternating noise: within every pair of runs the paired differences are
/// balanced around the true offset
fn sign(p: usize, run: usize) -> f64 {
    match (p + run) % 2 {
        0 => 1.0,
        _ => -1.0,
    }
}

fn identification(p: usize, run: usize) -> Identification {
    let (mz, rt) = true_position(p);
    let (r, s) = SHIFTS[run];
    let noise = sign(p, run);
    Identification {
        precursor: format!("PEPTIDE{}K2", p),
        sequence: format!("PEPTIDE{}K", p),
        naked_sequence: format!("PEPTIDE{}K", p),
        db_idx: p,
        charge: 2,
        score: 10.0 + p as f64,
        decoy: false,
        target: true,
        measured: Coordinates {
            mz: mz * (1.0 + r) * (1.0 + MZ_NOISE * noise),
            rt: rt + s + RT_NOISE * noise,
            mobility: None,
        },
        calibrated: None,
        kind: Provenance::MsMs,
        probability: None,
        feature_idx: None,
        intensity: None,
    }
}

fn feature(p: usize, run: usize) -> Feature {
    let (mz, rt) = true_position(p);
    let (r, s) = SHIFTS[run];
    Feature {
        feature_idx: 100 + p,
        charge: 2,
        apex: Coordinates {
            mz: mz * (1.0 + r),
            rt: rt + s,
            mobility: None,
        },
        calibrated: None,
        intensity: 1000.0 * (p + 1) as f64,
        fwhm: Some(0.2),
        n_isotopes: Some(3),
    }
}

fn setup(groups: Option<&[u32]>) -> (Experiment, MemoryStore) {
    let store = MemoryStore::default();
    let paths = (0..SHIFTS.len())
        .map(|run| format!("/data/run{}.ms_data.hdf", run))
        .collect::<Vec<_>>();
    let experiment = Experiment::new(&paths, groups, 4);

    for (run, name) in experiment.names().iter().enumerate() {
        let first = match run {
            3 => MISSING,
            _ => 0,
        };
        store.insert_identifications(
            name,
            (first..N_PRECURSORS)
                .map(|p| identification(p, run))
                .collect(),
        );
        store.insert_features(
            name,
            (0..N_PRECURSORS).map(|p| feature(p, run)).collect(),
        );
    }
    (experiment, store)
}

#[test]
fn align_recovers_shifts() {
    let (experiment, store) = setup(None);
    let runs = experiment.names();

    let mut reported = Vec::new();
    let alignment = align(&store, &runs, &AlignSettings::default(), &mut |f| {
        reported.push(f)
    })
    .unwrap()
    .expect("four runs are aligned");

    // Mobility was never measured, so only mz and rt are calibrated
    assert_eq!(alignment.dimensions, vec![Dimension::Mz, Dimension::Rt]);
    assert_eq!(alignment.comparisons, 6);
    assert_eq!(reported.len(), 6);

    let mean_r = SHIFTS.iter().map(|s| s.0).sum::<f64>() / 4.0;
    let mean_s = SHIFTS.iter().map(|s| s.1).sum::<f64>() / 4.0;
    for (run, (r, s)) in SHIFTS.iter().enumerate() {
        let offsets = alignment.get(&runs[run]).unwrap();
        let mz = offsets.get(Dimension::Mz).unwrap();
        let rt = offsets.get(Dimension::Rt).unwrap();
        assert!((mz - (r - mean_r)).abs() < 1E-8, "{}: mz {}", run, mz);
        assert!((rt - (s - mean_s)).abs() < 1E-9, "{}: rt {}", run, rt);
    }

    // After calibration, runs agree with each other
    let modes = OffsetModes::new([
        (Dimension::Mz, CorrectionMode::Relative),
        (Dimension::Rt, CorrectionMode::Absolute),
    ]);
    let tables = runs
        .iter()
        .map(|run| {
            let ids = store.read_identifications(run).unwrap();
            assert!(ids.iter().all(|id| id.calibrated.is_some()));
            PrecursorTable::aggregate(&ids, Source::Calibrated)
        })
        .collect::<Vec<_>>();
    for a in 0..tables.len() {
        for b in a + 1..tables.len() {
            let d = distance(&tables[a], &tables[b], &modes);
            assert!(d.offsets[0].unwrap().abs() < 1E-8);
            assert!(d.offsets[1].unwrap().abs() < 1E-9);
        }
    }

    let features = store.read_features(&runs[3]).unwrap();
    let c = features[0].calibrated.unwrap();
    assert!((c.rt - (true_position(0).1 + mean_s)).abs() < 1E-9);
}

#[test]
fn single_run_is_not_aligned() {
    let (experiment, store) = setup(None);
    let runs = &experiment.names()[..1];
    let alignment = align(&store, runs, &AlignSettings::default(), &mut |_| {}).unwrap();
    assert!(alignment.is_none());
    let ids = store.read_identifications(&runs[0]).unwrap();
    assert!(ids.iter().all(|id| id.calibrated.is_none()));
}

#[test]
fn sequential_and_parallel_agree() {
    let (experiment, store) = setup(None);
    let runs = experiment.names();
    let settings = AlignSettings {
        parallel: false,
        ..Default::default()
    };
    let sequential = align(&store, &runs, &settings, &mut |_| {}).unwrap();

    let (_, store) = setup(None);
    let parallel = align(&store, &runs, &AlignSettings::default(), &mut |_| {}).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn align_then_match() {
    let (experiment, store) = setup(None);
    let runs = experiment.names();
    align(&store, &runs, &AlignSettings::default(), &mut |_| {}).unwrap();

    let mut reported = Vec::new();
    let summary = match_runs(&store, &experiment, &MatchSettings::default(), &mut |f| {
        reported.push(f)
    })
    .unwrap();

    assert!(summary.skipped_groups.is_empty());
    assert_eq!(
        summary.matched,
        vec![
            ("run0".to_string(), 0),
            ("run1".to_string(), 0),
            ("run2".to_string(), 0),
            ("run3".to_string(), MISSING),
        ]
    );
    assert_eq!(reported.len(), 4);
    assert!((reported[3] - 1.0).abs() < 1E-12);

    let ids = store.read_identifications("run3").unwrap();
    assert_eq!(ids.len(), N_PRECURSORS);
    let matched = ids
        .iter()
        .filter(|id| id.kind == Provenance::Matched)
        .collect::<Vec<_>>();
    assert_eq!(matched.len(), MISSING);
    for (p, id) in matched.iter().enumerate() {
        assert_eq!(id.precursor, format!("PEPTIDE{}K2", p));
        assert_eq!(id.feature_idx, Some(100 + p));
        assert_eq!(id.db_idx, p);
        assert!(id.probability.unwrap() < 0.05);
        assert!(id.target && !id.decoy);
    }
    assert!(ids
        .iter()
        .filter(|id| id.kind == Provenance::MsMs)
        .all(|id| id.probability.is_none()));

    // Matching again transfers the same identifications
    let again = match_runs(&store, &experiment, &MatchSettings::default(), &mut |_| {}).unwrap();
    assert_eq!(again, summary);
    assert_eq!(store.read_identifications("run3").unwrap(), ids);
}

#[test]
fn small_groups_are_skipped() {
    let (experiment, store) = setup(Some(&[0, 0, 1, 1]));
    let runs = experiment.names();
    align(&store, &runs, &AlignSettings::default(), &mut |_| {}).unwrap();

    let summary = match_runs(&store, &experiment, &MatchSettings::default(), &mut |_| {}).unwrap();
    assert_eq!(summary.skipped_groups, vec![0, 1]);
    assert_eq!(summary.total(), 0);

    // Neighbouring groups may contribute to each other's reference
    let settings = MatchSettings {
        group_distance: 1,
        ..Default::default()
    };
    let summary = match_runs(&store, &experiment, &settings, &mut |_| {}).unwrap();
    assert!(summary.skipped_groups.is_empty());
    assert_eq!(summary.total(), MISSING);
}
