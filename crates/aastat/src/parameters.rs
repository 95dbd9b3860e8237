use serde::{Deserialize, Serialize};

use crate::enzyme::{Enzyme, EnzymeBuilder};
use crate::ion_series::Kind;
use crate::mass::{Tolerance, STANDARD_AA, VALID_AA};

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    BinWidth(f64),
    Range(f64, f64),
    /// The fit window covers fewer than 5 bins
    Window { shifting_window: f64, bins: usize },
    Fdr(f64),
    NonPositive(&'static str, f64),
    ZeroCount(&'static str),
    EmptyLabels,
    InvalidLabel(char),
    FragmentTolerance(Tolerance),
    EmptyIonKinds,
    EmptyDecoyPrefix,
    /// Relative intensity outside of [0, 1)
    MinIntensity(f64),
    /// Significance level outside of (0, 1]
    PValue(f64),
    CleavageRule(String),
    SpecificWindow(f64, f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::BinWidth(w) => write!(f, "bin width must be positive, got {}", w),
            ConfigError::Range(lo, hi) => {
                write!(f, "invalid open search range [{}, {}]", lo, hi)
            }
            ConfigError::Window {
                shifting_window,
                bins,
            } => write!(
                f,
                "shifting window of {} Da spans {} bins, at least 5 are required",
                shifting_window, bins
            ),
            ConfigError::Fdr(fdr) => write!(f, "FDR must be within (0, 1], got {}", fdr),
            ConfigError::NonPositive(name, value) => {
                write!(f, "`{}` must be positive, got {}", name, value)
            }
            ConfigError::ZeroCount(name) => write!(f, "`{}` must be at least 1", name),
            ConfigError::EmptyLabels => f.write_str("no residue labels to analyze"),
            ConfigError::InvalidLabel(c) => write!(f, "invalid residue label `{}`", c),
            ConfigError::FragmentTolerance(t) => {
                write!(f, "invalid fragment tolerance {:?}", t)
            }
            ConfigError::EmptyIonKinds => f.write_str("at least one ion kind is required"),
            ConfigError::EmptyDecoyPrefix => f.write_str("decoy prefix must not be empty"),
            ConfigError::MinIntensity(x) => {
                write!(f, "`min_intensity` must be within [0, 1), got {}", x)
            }
            ConfigError::PValue(p) => {
                write!(f, "`p_value_threshold` must be within (0, 1], got {}", p)
            }
            ConfigError::CleavageRule(s) => {
                write!(f, "cleavage rule contains non-residue characters: `{}`", s)
            }
            ConfigError::SpecificWindow(lo, hi) => {
                write!(f, "invalid specific mass shift window [{}, {}]", lo, hi)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
/// Analysis parameters as read from a configuration file. Missing values
/// take their defaults in [`Builder::make_parameters`]
pub struct Builder {
    /// Histogram bin width, Da
    pub bin_width: Option<f64>,
    /// Histogram range, Da
    pub open_search_range: Option<(f64, f64)>,
    /// Only analyze mass shifts within this window, Da. PSMs around zero are
    /// still filtered to serve as the reference
    pub specific_window: Option<(f64, f64)>,
    /// Width of the window a Gaussian is fitted over, Da
    pub shifting_window: Option<f64>,
    /// Minimum number of PSMs in a window before a fit is attempted
    pub min_psm_count: Option<usize>,
    pub fdr: Option<f64>,
    /// Double the FDR bound during interval filtering
    pub fdr_correction: Option<bool>,
    /// Sort PSMs ascending by score (e-values and the like)
    pub lower_score_is_better: Option<bool>,
    /// Maximum center standard error, in bins
    pub max_deviation_center: Option<f64>,
    pub max_deviation_sigma: Option<f64>,
    pub max_deviation_height: Option<f64>,
    /// Fits closer than this many bins are merged
    pub shift_error: Option<usize>,
    /// Tolerance around zero for calibration and the reference interval, Da
    pub zero_window: Option<f64>,
    /// Relative intensity a bin must exceed to be used for calibration
    pub min_intensity: Option<f64>,
    /// Residues to analyze, e.g. "ACDEFGHIKLMNPQRSTVWY"
    pub labels: Option<String>,
    pub decoy_prefix: Option<String>,
    /// Peptides are cut into fully cleaved pieces before residues are counted
    pub cleavage_rule: Option<EnzymeBuilder>,
    pub fragment_tol: Option<Tolerance>,
    pub ion_kinds: Option<Vec<Kind>>,
    pub isotope_tolerance: Option<f64>,
    pub max_isotope_error: Option<u8>,
    pub min_matched_peaks: Option<usize>,
    pub frequency_threshold: Option<f64>,
    pub p_value_threshold: Option<f64>,
    /// Number of fit windows processed per parallel batch
    pub batch_size: Option<usize>,
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    match value.is_finite() && value > 0.0 {
        true => Ok(value),
        false => Err(ConfigError::NonPositive(name, value)),
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    match value {
        0 => Err(ConfigError::ZeroCount(name)),
        x => Ok(x),
    }
}

fn parse_labels(labels: Option<String>) -> Result<Vec<u8>, ConfigError> {
    let mut residues = match labels {
        Some(s) => s
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match VALID_AA.contains(&(c as u8)) && c.is_ascii() {
                true => Ok(c as u8),
                false => Err(ConfigError::InvalidLabel(c)),
            })
            .collect::<Result<Vec<u8>, _>>()?,
        None => STANDARD_AA.to_vec(),
    };
    residues.sort_unstable();
    residues.dedup();
    match residues.is_empty() {
        true => Err(ConfigError::EmptyLabels),
        false => Ok(residues),
    }
}

impl Builder {
    /// Apply defaults and validate every value. Nothing is analyzed with an
    /// invalid configuration
    pub fn make_parameters(self) -> Result<Parameters, ConfigError> {
        let bin_width = self.bin_width.unwrap_or(0.001);
        if !(bin_width.is_finite() && bin_width > 0.0) {
            return Err(ConfigError::BinWidth(bin_width));
        }

        let (lo, hi) = self.open_search_range.unwrap_or((-500.0, 500.0));
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(ConfigError::Range(lo, hi));
        }

        let specific_window = match self.specific_window {
            Some((lo, hi)) if !(lo.is_finite() && hi.is_finite() && lo < hi) => {
                return Err(ConfigError::SpecificWindow(lo, hi));
            }
            window => window,
        };

        let shifting_window = positive("shifting_window", self.shifting_window.unwrap_or(0.03))?;
        let bins = (shifting_window / bin_width + 1e-9).floor() as usize;
        // Round up to an odd number of bins, so the window is centered
        let window_bins = bins | 1;
        if window_bins < 5 {
            return Err(ConfigError::Window {
                shifting_window,
                bins,
            });
        }

        let fdr = self.fdr.unwrap_or(0.02);
        if !(fdr > 0.0 && fdr <= 1.0) {
            return Err(ConfigError::Fdr(fdr));
        }

        let fragment_tol = self.fragment_tol.unwrap_or(Tolerance::Da(-0.02, 0.02));
        if !fragment_tol.is_valid() {
            return Err(ConfigError::FragmentTolerance(fragment_tol));
        }

        let ion_kinds = self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]);
        if ion_kinds.is_empty() {
            return Err(ConfigError::EmptyIonKinds);
        }

        let p_value_threshold = self.p_value_threshold.unwrap_or(0.05);
        if !(p_value_threshold > 0.0 && p_value_threshold <= 1.0) {
            return Err(ConfigError::PValue(p_value_threshold));
        }

        let min_intensity = self.min_intensity.unwrap_or(0.05);
        if !(0.0..1.0).contains(&min_intensity) {
            return Err(ConfigError::MinIntensity(min_intensity));
        }

        let decoy_prefix = self.decoy_prefix.unwrap_or_else(|| "DECOY_".into());
        if decoy_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyDecoyPrefix);
        }

        let cleavage_rule = self
            .cleavage_rule
            .unwrap_or_default()
            .build()
            .map_err(ConfigError::CleavageRule)?;

        Ok(Parameters {
            bin_width,
            open_search_range: (lo, hi),
            specific_window,
            shifting_window,
            half_window: window_bins / 2,
            min_psm_count: at_least_one("min_psm_count", self.min_psm_count.unwrap_or(200))?,
            fdr,
            fdr_correction: self.fdr_correction.unwrap_or(true),
            lower_score_is_better: self.lower_score_is_better.unwrap_or(false),
            max_deviation_center: positive(
                "max_deviation_center",
                self.max_deviation_center.unwrap_or(1.0),
            )?,
            max_deviation_sigma: positive(
                "max_deviation_sigma",
                self.max_deviation_sigma.unwrap_or(0.1),
            )?,
            max_deviation_height: positive(
                "max_deviation_height",
                self.max_deviation_height.unwrap_or(0.5),
            )?,
            shift_error: at_least_one("shift_error", self.shift_error.unwrap_or(10))?,
            zero_window: positive("zero_window", self.zero_window.unwrap_or(0.05))?,
            min_intensity,
            labels: parse_labels(self.labels)?,
            decoy_prefix,
            cleavage_rule,
            fragment_tol,
            ion_kinds,
            isotope_tolerance: positive(
                "isotope_tolerance",
                self.isotope_tolerance.unwrap_or(0.015),
            )?,
            max_isotope_error: self.max_isotope_error.unwrap_or(3),
            min_matched_peaks: at_least_one(
                "min_matched_peaks",
                self.min_matched_peaks.unwrap_or(4),
            )?,
            frequency_threshold: positive(
                "frequency_threshold",
                self.frequency_threshold.unwrap_or(1.5),
            )?,
            p_value_threshold,
            batch_size: at_least_one("batch_size", self.batch_size.unwrap_or(900))?,
        })
    }
}

/// Validated, immutable analysis configuration
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Parameters {
    pub bin_width: f64,
    pub open_search_range: (f64, f64),
    pub specific_window: Option<(f64, f64)>,
    pub shifting_window: f64,
    /// Half-width of the fit window in bins; the window spans `2 * half_window + 1` bins
    pub half_window: usize,
    pub min_psm_count: usize,
    pub fdr: f64,
    pub fdr_correction: bool,
    pub lower_score_is_better: bool,
    pub max_deviation_center: f64,
    pub max_deviation_sigma: f64,
    pub max_deviation_height: f64,
    pub shift_error: usize,
    pub zero_window: f64,
    pub min_intensity: f64,
    pub labels: Vec<u8>,
    pub decoy_prefix: String,
    /// `None` when cleavage is disabled
    pub cleavage_rule: Option<Enzyme>,
    pub fragment_tol: Tolerance,
    pub ion_kinds: Vec<Kind>,
    pub isotope_tolerance: f64,
    pub max_isotope_error: u8,
    pub min_matched_peaks: usize,
    pub frequency_threshold: f64,
    pub p_value_threshold: f64,
    pub batch_size: usize,
}

impl Parameters {
    /// FDR bound used by interval filtering
    pub fn fdr_bound(&self) -> f64 {
        match self.fdr_correction {
            true => self.fdr * 2.0,
            false => self.fdr,
        }
    }

    /// Range covered by the histogram and the peak fits
    pub fn histogram_range(&self) -> (f64, f64) {
        self.specific_window.unwrap_or(self.open_search_range)
    }

    /// Build a reference interval around zero separately from the fitted
    /// peaks, because the analyzed window does not include zero
    pub fn separate_reference(&self) -> bool {
        matches!(self.specific_window, Some((lo, hi)) if lo > 0.0 || hi < 0.0)
    }

    /// Distance below which two fitted peaks are merged, Da
    pub fn merge_distance(&self) -> f64 {
        self.shift_error as f64 * self.bin_width
    }
}

impl Default for Parameters {
    fn default() -> Self {
        // The defaults are valid by construction
        match Builder::default().make_parameters() {
            Ok(params) => params,
            Err(e) => unreachable!("BUG: default parameters are invalid: {}", e),
        }
    }
}
