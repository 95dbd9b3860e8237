use serde::Serialize;

use crate::candidates::{self, IntervalCandidates};
use crate::fdr::Intervals;
use crate::fit::{Fits, PeakFitter};
use crate::frequency::{self, IntervalFrequencies};
use crate::histogram::Histogram;
use crate::localization::{Localization, LocalizationEngine, LocalizationSummary};
use crate::modification::ModificationDatabase;
use crate::parameters::Parameters;
use crate::psm::Psm;
use crate::spectrum::SpectrumIndex;

/// Everything computed by one analysis run
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisResults {
    pub parameters: Parameters,
    pub histogram: Histogram,
    pub fits: Fits,
    pub intervals: Intervals,
    pub frequencies: Vec<IntervalFrequencies>,
    pub candidates: Vec<IntervalCandidates>,
    /// Empty if no spectra were supplied
    pub localization_summaries: Vec<LocalizationSummary>,
    pub localizations: Vec<Localization>,
}

pub struct Analysis;

impl Analysis {
    /// Run every stage in order: histogram, peak fitting, interval
    /// filtering, residue statistics, candidate resolution and, when spectra
    /// are available, localization
    pub fn run(
        psms: &[Psm],
        spectra: Option<&SpectrumIndex>,
        database: &ModificationDatabase,
        params: &Parameters,
    ) -> AnalysisResults {
        let histogram = Histogram::build(psms, params);
        let fits = PeakFitter::new(&histogram, params).fit();
        let intervals = Intervals::build(&fits.passed, &histogram, psms, params);
        let frequencies = frequency::analyze(&intervals, psms, params);
        let candidates = candidates::resolve(&intervals, &frequencies, database, params);

        let (localizations, localization_summaries) = match spectra {
            Some(spectra) => {
                LocalizationEngine::new(params, &intervals, &candidates, spectra).localize(psms)
            }
            None => {
                log::info!("no spectra supplied, skipping localization");
                (Vec::new(), Vec::new())
            }
        };

        AnalysisResults {
            parameters: params.clone(),
            histogram,
            fits,
            intervals,
            frequencies,
            candidates,
            localization_summaries,
            localizations,
        }
    }
}
