//! Calibrated histogram of precursor mass shifts

use serde::Serialize;

use crate::parameters::Parameters;
use crate::psm::Psm;

#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    pub left: f64,
    pub width: f64,
    /// Indices of member PSMs in the input slice
    pub members: Vec<usize>,
}

impl Bin {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn center(&self) -> f64 {
        self.left + self.width / 2.0
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Histogram {
    #[serde(skip)]
    pub bins: Vec<Bin>,
    /// Nominal bin width; the last bin may be narrower
    pub width: f64,
    pub min: f64,
    pub max: f64,
    /// Systematic offset subtracted from every mass shift
    pub offset: f64,
    /// Number of PSMs outside of the histogram range
    pub dropped: usize,
    /// Calibrated mass shift of every input PSM, parallel to the input
    #[serde(skip)]
    pub shifts: Vec<f64>,
}

impl Histogram {
    /// Calibrate the mass shifts of `psms` against the zero peak, and bin them
    pub fn build(psms: &[Psm], params: &Parameters) -> Histogram {
        let raw = psms.iter().map(|psm| psm.mass_shift).collect::<Vec<_>>();
        // Calibrate over the whole open search range, even when only a
        // specific window is analyzed
        let provisional = Histogram::over(raw.clone(), params.open_search_range, params.bin_width);

        let offset = match provisional.calibration_offset(params) {
            Some(offset) => {
                log::info!("calibrating mass shifts by {:+.5} Da", -offset);
                offset
            }
            None => {
                log::warn!(
                    "no histogram bin within {} Da of zero exceeds relative intensity {}, mass shifts are not calibrated",
                    params.zero_window,
                    params.min_intensity
                );
                0.0
            }
        };

        let shifts = raw.into_iter().map(|shift| shift - offset).collect();
        let mut histogram = Histogram::new(shifts, params);
        histogram.offset = offset;
        log::info!(
            "binned {} PSMs into {} bins, dropped {} outside of [{}, {}]",
            histogram.binned(),
            histogram.bins.len(),
            histogram.dropped,
            histogram.min,
            histogram.max
        );
        histogram
    }

    /// Bin `shifts` without calibration
    pub fn new(shifts: Vec<f64>, params: &Parameters) -> Histogram {
        Histogram::over(shifts, params.histogram_range(), params.bin_width)
    }

    fn over(shifts: Vec<f64>, (min, max): (f64, f64), width: f64) -> Histogram {
        let n = (((max - min) / width) - 1e-9).ceil().max(1.0) as usize;

        let mut bins = (0..n)
            .map(|i| {
                let left = min + i as f64 * width;
                Bin {
                    left,
                    width,
                    members: Vec::new(),
                }
            })
            .collect::<Vec<_>>();
        // Truncate the last bin so that the bins cover the range exactly
        if let Some(last) = bins.last_mut() {
            last.width = max - last.left;
        }

        let mut histogram = Histogram {
            bins,
            width,
            min,
            max,
            offset: 0.0,
            dropped: 0,
            shifts: Vec::new(),
        };

        for (idx, shift) in shifts.iter().enumerate() {
            match histogram.bin_index(*shift) {
                Some(bin) => histogram.bins[bin].members.push(idx),
                None => histogram.dropped += 1,
            }
        }
        histogram.shifts = shifts;
        histogram
    }

    /// Index of the bin holding `shift`: `[left, right)`, or `[left, max]` for
    /// the last bin
    pub fn bin_index(&self, shift: f64) -> Option<usize> {
        if !shift.is_finite() || shift < self.min || shift > self.max || self.bins.is_empty() {
            return None;
        }
        let last = self.bins.len() - 1;
        let mut idx = (((shift - self.min) / self.width).floor() as usize).min(last);
        // Correct for rounding of the division at bin edges
        if idx > 0 && shift < self.bins[idx].left {
            idx -= 1;
        } else if idx < last && shift >= self.bins[idx + 1].left {
            idx += 1;
        }
        Some(idx)
    }

    pub fn counts(&self) -> Vec<usize> {
        self.bins.iter().map(Bin::count).collect()
    }

    pub fn binned(&self) -> usize {
        self.bins.iter().map(Bin::count).sum()
    }

    /// Offset defined by the zero peak: mean shift of the members of the
    /// qualifying bin nearest zero
    fn calibration_offset(&self, params: &Parameters) -> Option<f64> {
        let max_count = self.bins.iter().map(Bin::count).max().unwrap_or(0);
        if max_count == 0 {
            return None;
        }

        let bin = self
            .bins
            .iter()
            .filter(|bin| {
                bin.count() as f64 / max_count as f64 > params.min_intensity
                    && bin.center().abs() <= params.zero_window
            })
            .min_by(|a, b| a.center().abs().total_cmp(&b.center().abs()))?;

        let sum = bin.members.iter().map(|&m| self.shifts[m]).sum::<f64>();
        Some(sum / bin.count() as f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parameters::Builder;

    fn params(width: f64, range: (f64, f64)) -> Parameters {
        Builder {
            bin_width: Some(width),
            open_search_range: Some(range),
            shifting_window: Some(width * 5.0),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    fn psm(mass_shift: f64) -> Psm {
        Psm {
            sequence: "PEPTIDE".into(),
            mass_shift,
            ..Default::default()
        }
    }

    #[test]
    fn exact_cover() {
        let params = params(0.3, (-1.0, 1.0));
        let shifts = vec![-1.0, -0.95, -0.7, 0.0, 0.49, 0.5, 0.8, 0.99, 1.0, 1.01, -1.2, f64::NAN];
        let hist = Histogram::new(shifts.clone(), &params);

        assert_eq!(hist.bins.len(), 7);
        assert_eq!(hist.bins[0].left, -1.0);
        assert!((hist.bins[6].right() - 1.0).abs() < 1e-12);
        assert!((hist.bins[6].width - 0.2).abs() < 1e-9);
        for pair in hist.bins.windows(2) {
            assert!((pair[0].right() - pair[1].left).abs() < 1e-12);
        }
        assert_eq!(hist.binned() + hist.dropped, shifts.len());
        assert_eq!(hist.dropped, 3);

        // The maximum belongs to the last bin, 0.5 is its own bin's left edge
        assert_eq!(hist.bin_index(1.0), Some(6));
        assert_eq!(hist.bin_index(0.5), Some(5));
        assert_eq!(hist.bin_index(-1.0), Some(0));
        for (bin, b) in hist.bins.iter().enumerate() {
            for &m in &b.members {
                let s = shifts[m];
                assert!(s >= b.left && (s < b.right() || (bin == 6 && s <= 1.0)));
            }
        }
    }

    #[test]
    fn calibration() {
        let params = params(0.01, (-5.0, 5.0));
        let mut psms = (0..100)
            .map(|i| psm(0.012 + (i % 3) as f64 * 0.001))
            .collect::<Vec<_>>();
        psms.extend((0..40).map(|_| psm(1.0)));
        psms.push(psm(7.0));

        let hist = Histogram::build(&psms, &params);
        assert!((hist.offset - 0.013).abs() < 1e-3, "{}", hist.offset);
        assert!(hist.shifts[0].abs() < 0.002);
        assert!((hist.shifts[100] - 0.987).abs() < 1e-3);
        assert_eq!(hist.dropped, 1);
        assert_eq!(hist.binned(), 140);
    }

    #[test]
    fn specific_window_keeps_calibration() {
        let params = Parameters {
            specific_window: Some((0.9, 1.1)),
            ..params(0.01, (-5.0, 5.0))
        };
        let mut psms = (0..100)
            .map(|i| psm(0.012 + (i % 3) as f64 * 0.001))
            .collect::<Vec<_>>();
        psms.extend((0..40).map(|_| psm(1.0)));

        let hist = Histogram::build(&psms, &params);
        assert!((hist.offset - 0.013).abs() < 1e-3, "{}", hist.offset);
        assert_eq!((hist.min, hist.max), (0.9, 1.1));
        assert_eq!(hist.binned(), 40);
        assert_eq!(hist.dropped, 100);
        // Shifts outside of the window are still calibrated
        assert!(hist.shifts[0].abs() < 0.002);
    }

    #[test]
    fn no_calibration_peak() {
        let params = params(0.01, (-5.0, 5.0));
        let psms = (0..10).map(|_| psm(2.5)).collect::<Vec<_>>();
        let hist = Histogram::build(&psms, &params);
        assert_eq!(hist.offset, 0.0);
        assert_eq!(hist.shifts, vec![2.5; 10]);
    }
}
