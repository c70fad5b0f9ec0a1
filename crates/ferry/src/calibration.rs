//! Remove per-run systematic offsets from measured coordinates

use crate::table::{Dimension, Measured, OffsetModes};

/// Offsets of a single run, one per calibrated dimension
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunOffsets {
    pub offsets: Vec<(Dimension, f64)>,
}

impl RunOffsets {
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.offsets
            .iter()
            .find(|(d, _)| *d == dimension)
            .map(|(_, o)| *o)
    }
}

/// Write calibrated coordinates for every row.
///
/// Calibrated coordinates start as a copy of the measured ones; every
/// dimension with a correction mode is then corrected by the run's offset.
/// Existing calibrated values are overwritten. Dimensions that a row did
/// not measure stay unmeasured.
pub fn calibrate<T: Measured>(rows: &mut [T], offsets: &RunOffsets, modes: &OffsetModes) {
    log::trace!(
        "calibrating {} rows from {} columns",
        rows.len(),
        modes
            .dimensions()
            .iter()
            .map(|d| T::SCHEMA.column(*d))
            .collect::<Vec<_>>()
            .join(", ")
    );
    for row in rows.iter_mut() {
        let mut calibrated = *row.measured();
        for (dimension, mode) in modes.iter() {
            if let (Some(value), Some(offset)) =
                (calibrated.get(dimension), offsets.get(dimension))
            {
                calibrated.set(dimension, mode.apply(value, offset));
            }
        }
        *row.calibrated_mut() = Some(calibrated);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::table::test::{feature, identification};
    use crate::table::CorrectionMode;
    use quickcheck_macros::quickcheck;

    fn offsets(mz: f64, rt: f64, mobility: f64) -> RunOffsets {
        RunOffsets {
            offsets: vec![
                (Dimension::Mz, mz),
                (Dimension::Rt, rt),
                (Dimension::Mobility, mobility),
            ],
        }
    }

    #[test]
    fn identifications_and_features() {
        let mut ids = vec![
            identification("PEPTIDEK2", 500.0, 10.0, Some(1.0)),
            identification("LESLIEK2", 600.0, 20.0, None),
        ];
        let modes = OffsetModes::default();
        calibrate(&mut ids, &offsets(1E-5, 0.5, 0.01), &modes);

        let c = ids[0].calibrated.unwrap();
        assert!((c.mz - 500.0 * (1.0 - 1E-5)).abs() < 1E-9);
        assert_eq!(c.rt, 9.5);
        assert!((c.mobility.unwrap() - 0.99).abs() < 1E-12);
        assert_eq!(ids[1].calibrated.unwrap().mobility, None);
        // measured values are untouched
        assert_eq!(ids[0].measured.rt, 10.0);

        let mut features = vec![feature(0, 500.0, 10.0, Some(1.0))];
        calibrate(&mut features, &offsets(0.0, -1.0, 0.0), &modes.without(Dimension::Mobility));
        let c = features[0].calibrated.unwrap();
        assert_eq!(c.rt, 11.0);
        assert_eq!(c.mobility, Some(1.0));
    }

    #[test]
    fn overwrites_previous_calibration() {
        let mut ids = vec![identification("PEPTIDEK2", 500.0, 10.0, None)];
        let modes = OffsetModes::new([(Dimension::Rt, CorrectionMode::Absolute)]);
        calibrate(&mut ids, &offsets(0.0, 2.0, 0.0), &modes);
        calibrate(&mut ids, &offsets(0.0, 1.0, 0.0), &modes);
        assert_eq!(ids[0].calibrated.unwrap().rt, 9.0);
    }

    #[quickcheck]
    fn round_trip(rt: i16, shift: i16, mz: u16, ppm: i8) -> bool {
        let rt = rt as f64 / 10.0;
        let shift = shift as f64 / 100.0;
        let mz = 100.0 + mz as f64 / 10.0;
        let rel = ppm as f64 * 1E-6;

        let mut ids = vec![identification("PEPTIDEK2", mz, rt, None)];
        let modes = OffsetModes::new([
            (Dimension::Mz, CorrectionMode::Relative),
            (Dimension::Rt, CorrectionMode::Absolute),
        ]);
        calibrate(&mut ids, &offsets(rel, shift, 0.0), &modes);
        let c = ids[0].calibrated.unwrap();

        (c.rt + shift - rt).abs() < 1E-9 && (c.mz / (1.0 - rel) - mz).abs() < 1E-9
    }
}
