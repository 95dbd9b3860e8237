//! Gaussian fitting of peaks in the mass shift histogram

use rayon::prelude::*;
use serde::Serialize;

use crate::histogram::Histogram;
use crate::ml::gaussian::{self, FitError};
use crate::parameters::Parameters;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FitStatus {
    Passed,
    Failed,
    NoFit,
}

/// A Gaussian fitted to one window of the histogram. Masses are in Da
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PeakFit {
    pub center: f64,
    pub amplitude: f64,
    pub sigma: f64,
    pub center_error: f64,
    pub amplitude_error: f64,
    pub sigma_error: f64,
    pub status: FitStatus,
    /// Inclusive range of histogram bins the fit was made on
    pub bins: (usize, usize),
}

/// Outcome of fitting every candidate window
#[derive(Clone, Debug, Default, Serialize)]
pub struct Fits {
    /// Passed fits, merged, in ascending center order
    pub passed: Vec<PeakFit>,
    /// Every fit attempted, including those later removed by merging
    pub all: Vec<PeakFit>,
}

impl Fits {
    pub fn count(&self, status: FitStatus) -> usize {
        self.all.iter().filter(|fit| fit.status == status).count()
    }
}

pub struct PeakFitter<'a> {
    histogram: &'a Histogram,
    params: &'a Parameters,
    counts: Vec<usize>,
}

impl<'a> PeakFitter<'a> {
    pub fn new(histogram: &'a Histogram, params: &'a Parameters) -> Self {
        Self {
            histogram,
            params,
            counts: histogram.counts(),
        }
    }

    /// Centers of all windows that are local maxima with enough PSMs
    pub fn candidates(&self) -> Vec<usize> {
        let w = self.params.half_window;
        let n = self.counts.len();
        if n < 2 * w + 1 {
            return Vec::new();
        }
        (w..n - w)
            .filter(|&c| {
                let window = &self.counts[c - w..=c + w];
                self.counts[c] > 0
                    && window.iter().all(|&count| count <= self.counts[c])
                    && window.iter().sum::<usize>() >= self.params.min_psm_count
            })
            .collect()
    }

    /// Fit and classify the window centered on bin `c`
    pub fn fit_window(&self, c: usize) -> PeakFit {
        let w = self.params.half_window;
        let (lo, hi) = (c - w, c + w);
        let xs = (lo..=hi)
            .map(|bin| bin as f64 - c as f64)
            .collect::<Vec<_>>();
        let ys = self.counts[lo..=hi]
            .iter()
            .map(|&count| count as f64)
            .collect::<Vec<_>>();

        let width = self.params.bin_width;
        let origin = self.histogram.bins[c].left + width / 2.0;
        let no_fit = |reason: FitError| {
            log::trace!("window at {:.4}: no fit, {}", origin, reason);
            PeakFit {
                center: origin,
                amplitude: self.counts[c] as f64,
                sigma: 0.0,
                center_error: f64::NAN,
                amplitude_error: f64::NAN,
                sigma_error: f64::NAN,
                status: FitStatus::NoFit,
                bins: (lo, hi),
            }
        };

        let guess = match gaussian::initial_guess(&xs, &ys) {
            Some(guess) => guess,
            None => return no_fit(FitError::EmptyData),
        };
        let fit = match gaussian::fit(&xs, &ys, guess) {
            Ok(fit) => fit,
            Err(e) => return no_fit(e),
        };

        let (p, e) = (fit.params, fit.errors);
        let passed = p.center.abs() <= w as f64
            && p.height > 0.0
            && e.center < self.params.max_deviation_center
            && e.sigma / p.sigma < self.params.max_deviation_sigma
            && e.height / p.height < self.params.max_deviation_height;

        PeakFit {
            center: origin + p.center * width,
            amplitude: p.height,
            sigma: p.sigma * width,
            center_error: e.center * width,
            amplitude_error: e.height,
            sigma_error: e.sigma * width,
            status: match passed {
                true => FitStatus::Passed,
                false => FitStatus::Failed,
            },
            bins: (lo, hi),
        }
    }

    /// Fit all candidate windows in parallel batches, and merge the passed fits
    pub fn fit(&self) -> Fits {
        let candidates = self.candidates();
        log::info!(
            "fitting {} candidate windows in batches of {}",
            candidates.len(),
            self.params.batch_size
        );

        let mut all = candidates
            .par_chunks(self.params.batch_size)
            .flat_map_iter(|batch| {
                batch
                    .iter()
                    .map(|&c| self.fit_window(c))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        all.sort_by(|a, b| a.center.total_cmp(&b.center));

        let passed = all
            .iter()
            .filter(|fit| fit.status == FitStatus::Passed)
            .copied()
            .collect::<Vec<_>>();
        let passed = merge(passed, self.params.merge_distance());

        let fits = Fits { passed, all };
        log::info!(
            "fits: {} passed, {} failed, {} not converged; {} peaks after merging",
            fits.count(FitStatus::Passed),
            fits.count(FitStatus::Failed),
            fits.count(FitStatus::NoFit),
            fits.passed.len()
        );
        fits
    }
}

/// Walk fits in ascending center order; of two fits closer than `distance`,
/// only the one with larger amplitude is kept
pub fn merge(mut fits: Vec<PeakFit>, distance: f64) -> Vec<PeakFit> {
    fits.sort_by(|a, b| a.center.total_cmp(&b.center));
    let mut kept: Vec<PeakFit> = Vec::with_capacity(fits.len());
    for fit in fits {
        match kept.last_mut() {
            Some(last) if fit.center - last.center < distance => {
                if fit.amplitude > last.amplitude {
                    *last = fit;
                }
            }
            _ => kept.push(fit),
        }
    }
    kept
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parameters::Builder;
    use crate::psm::Psm;

    fn params(batch_size: usize) -> Parameters {
        Builder {
            bin_width: Some(0.001),
            open_search_range: Some((-0.2, 0.2)),
            shifting_window: Some(0.015),
            min_psm_count: Some(50),
            batch_size: Some(batch_size),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    /// Deterministic, bell shaped sample around `center` with spread `sigma`
    fn peak(center: f64, sigma: f64, n: usize) -> Vec<Psm> {
        (0..n)
            .map(|i| {
                // Evenly spaced quantiles of a logistic, close enough to a Gaussian
                let q = (i as f64 + 0.5) / n as f64;
                let z = (q / (1.0 - q)).ln() * 0.55;
                Psm {
                    sequence: "PEPTIDE".into(),
                    mass_shift: center + z * sigma,
                    score: 1.0,
                    ..Default::default()
                }
            })
            .collect()
    }

    fn fit(center: f64, amplitude: f64) -> PeakFit {
        PeakFit {
            center,
            amplitude,
            sigma: 0.002,
            center_error: 0.0,
            amplitude_error: 0.0,
            sigma_error: 0.0,
            status: FitStatus::Passed,
            bins: (0, 0),
        }
    }

    #[test]
    fn finds_peaks() {
        let mut psms = peak(0.0, 0.0015, 2000);
        psms.extend(peak(0.1, 0.0015, 500));

        let params = params(1);
        let histogram = Histogram::new(psms.iter().map(|p| p.mass_shift).collect(), &params);
        let fitter = PeakFitter::new(&histogram, &params);
        let fits = fitter.fit();

        assert_eq!(fits.passed.len(), 2, "{:#?}", fits.passed);
        assert!(fits.passed[0].center.abs() < 0.0005);
        assert!((fits.passed[1].center - 0.1).abs() < 0.0005);
        assert!((fits.passed[0].sigma - 0.0015).abs() < 0.0005);
        assert!(fits.passed[0].amplitude > fits.passed[1].amplitude);
        for fit in &fits.passed {
            assert_eq!(fit.bins.1 - fit.bins.0, 2 * params.half_window);
        }

        // Batching never changes the result
        let params = params_with_batch(&params, 900);
        let fitter = PeakFitter::new(&histogram, &params);
        assert_eq!(fitter.fit().passed, fits.passed);
    }

    fn params_with_batch(params: &Parameters, batch_size: usize) -> Parameters {
        Parameters {
            batch_size,
            ..params.clone()
        }
    }

    #[test]
    fn window_at_edge_is_skipped() {
        let params = params(10);
        let psms = peak(-0.2, 0.0005, 500);
        let histogram = Histogram::new(psms.iter().map(|p| p.mass_shift).collect(), &params);
        let fitter = PeakFitter::new(&histogram, &params);
        assert!(fitter
            .candidates()
            .iter()
            .all(|&c| c >= params.half_window));
    }

    #[test]
    fn flat_window_fails() {
        let params = params(10);
        // Uniform counts: a local maximum with no peak shape
        let psms = (0..400)
            .map(|i| Psm {
                mass_shift: -0.05 + (i % 40) as f64 * 0.001 + 0.0005,
                ..Default::default()
            })
            .collect::<Vec<_>>();
        let histogram = Histogram::new(psms.iter().map(|p| p.mass_shift).collect(), &params);
        let fitter = PeakFitter::new(&histogram, &params);
        let fits = fitter.fit();
        assert!(!fits.all.is_empty());
        assert!(fits.passed.is_empty(), "{:#?}", fits.passed);
    }

    #[test]
    fn merge_keeps_larger() {
        let fits = vec![fit(0.0, 10.0), fit(0.004, 30.0), fit(0.02, 5.0), fit(0.5, 1.0)];
        let merged = merge(fits, 0.01);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].center, 0.004);
        assert_eq!(merged[1].center, 0.02);

        // Idempotent
        assert_eq!(merge(merged.clone(), 0.01), merged);
        for pair in merged.windows(2) {
            assert!(pair[1].center - pair[0].center >= 0.01);
        }
    }
}
