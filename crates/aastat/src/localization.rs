//! Spectrum-based localization of mass shifts to residues
//!
//! For every accepted PSM of an interval, each candidate placement of the
//! interval's mass (an *isoform*) is scored against the PSM's fragment
//! spectrum with a hyperscore. The best isoform is accepted only when it is
//! the single scoreable isoform, or beats the runner-up by a nonzero margin.

use std::collections::BTreeMap;

use fnv::FnvHashMap;
use rayon::prelude::*;
use serde::Serialize;

use crate::candidates::IntervalCandidates;
use crate::fdr::{IntervalIx, Intervals};
use crate::ion_series::IonSeries;
use crate::mass::{format_shift, Residue, VALID_AA};
use crate::modification::Terminus;
use crate::parameters::Parameters;
use crate::psm::Psm;
use crate::spectrum::{select_most_intense_peak, Peak, SpectrumIndex};

/// Scores closer than this are considered tied
pub const SCORE_EPSILON: f64 = 1e-6;

/// A mass placed on a residue, `position` is 0-based. Terminal sites sit on
/// the first or last residue
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Site {
    pub position: usize,
    pub residue: char,
    pub mass: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminus: Option<Terminus>,
}

impl Site {
    /// Report key, e.g. `M_+15.9949` or `N-term_+42.0106`
    pub fn key(&self) -> String {
        match self.terminus {
            Some(terminus) => format!("{}_{}", terminus.label(), format_shift(self.mass)),
            None => format!("{}_{}", self.residue, format_shift(self.mass)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NoScoreableIsoform,
    Ambiguous,
    InvalidSequence,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Localized {
        sites: Vec<Site>,
        score: f64,
        /// Score difference to the runner-up, `None` if there was none
        margin: Option<f64>,
    },
    NonLocalized(Reason),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Localization {
    /// Index of the PSM in the input
    pub psm: usize,
    pub spectrum: String,
    pub peptide: String,
    pub interval: IntervalIx,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LocalizationSummary {
    pub interval: IntervalIx,
    /// Number of peptides localized per site key
    pub counts: BTreeMap<String, usize>,
    pub non_localized: usize,
    /// PSMs whose spectrum is not available
    pub no_spectrum: usize,
}

/// Candidate placement of one or two masses on a peptide
#[derive(Clone, Debug, PartialEq)]
pub struct Isoform {
    pub residues: Vec<Residue>,
    pub sites: Vec<Site>,
}

impl Isoform {
    fn new(sequence: &[u8], sites: Vec<Site>) -> Self {
        let mut residues = sequence.iter().copied().map(Residue::Just).collect::<Vec<_>>();
        for site in &sites {
            residues[site.position] = Residue::Mod(sequence[site.position], site.mass as f32);
        }
        Isoform { residues, sites }
    }
}

fn lnfact(n: u16) -> f64 {
    (1..=n).map(|i| (i as f64).ln()).sum()
}

/// X!Tandem style hyperscore
pub fn hyperscore(matched_b: u16, matched_y: u16, summed_b: f32, summed_y: f32) -> f64 {
    let i = (summed_b + 1.0) as f64 * (summed_y + 1.0) as f64;
    i.ln() + lnfact(matched_b) + lnfact(matched_y)
}

/// Calculate upper bound (excluded) of the fragment charge range (1..N)
fn max_fragment_charge(precursor_charge: u8) -> u8 {
    precursor_charge.max(2)
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct IsoformScore {
    pub matched_b: u16,
    pub matched_y: u16,
    pub summed_b: f32,
    pub summed_y: f32,
}

impl IsoformScore {
    pub fn matched(&self) -> usize {
        (self.matched_b + self.matched_y) as usize
    }

    pub fn hyperscore(&self) -> f64 {
        hyperscore(self.matched_b, self.matched_y, self.summed_b, self.summed_y)
    }
}

pub struct LocalizationEngine<'a> {
    params: &'a Parameters,
    intervals: &'a Intervals,
    spectra: &'a SpectrumIndex,
    candidates: FnvHashMap<IntervalIx, &'a IntervalCandidates>,
}

impl<'a> LocalizationEngine<'a> {
    pub fn new(
        params: &'a Parameters,
        intervals: &'a Intervals,
        candidates: &'a [IntervalCandidates],
        spectra: &'a SpectrumIndex,
    ) -> Self {
        Self {
            params,
            intervals,
            spectra,
            candidates: candidates.iter().map(|c| (c.interval, c)).collect(),
        }
    }

    /// Mass used for fragment ions: isotope peaks carry their base peak's mass
    pub fn modification_mass(&self, ix: IntervalIx) -> f64 {
        match self.candidates.get(&ix).and_then(|c| c.isotope_of) {
            Some((base, _)) => self.intervals[base].center,
            None => self.intervals[ix].center,
        }
    }

    fn residues_of(&self, ix: IntervalIx, direct: bool) -> Vec<u8> {
        match self.candidates.get(&ix) {
            Some(c) if direct => c.direct_residues().collect(),
            Some(c) => c.residues().collect(),
            None => Vec::new(),
        }
    }

    /// Enumerate every placement of the interval's mass on a candidate residue
    /// or terminus, and of shift-sum constituent pairs on two distinct candidate
    /// residues
    pub fn isoforms(&self, sequence: &[u8], ix: IntervalIx) -> Vec<Isoform> {
        let mut isoforms = Vec::new();
        let mass = self.modification_mass(ix);
        let residues = self.residues_of(ix, false);
        for (position, residue) in sequence.iter().enumerate() {
            if residues.contains(residue) {
                let site = Site {
                    position,
                    residue: *residue as char,
                    mass,
                    terminus: None,
                };
                isoforms.push(Isoform::new(sequence, vec![site]));
            }
        }

        let termini = self
            .candidates
            .get(&ix)
            .map(|c| c.termini.as_slice())
            .unwrap_or_default();
        for &terminus in termini {
            let position = match terminus {
                Terminus::N => 0,
                Terminus::C => sequence.len().saturating_sub(1),
            };
            if let Some(residue) = sequence.get(position) {
                let site = Site {
                    position,
                    residue: *residue as char,
                    mass,
                    terminus: Some(terminus),
                };
                isoforms.push(Isoform::new(sequence, vec![site]));
            }
        }

        let pairs = self
            .candidates
            .get(&ix)
            .map(|c| c.sum_of.as_slice())
            .unwrap_or_default();
        for &(j, k) in pairs {
            let (mass_j, mass_k) = (self.modification_mass(j), self.modification_mass(k));
            let (residues_j, residues_k) = (self.residues_of(j, true), self.residues_of(k, true));
            for (p, rp) in sequence.iter().enumerate() {
                if !residues_j.contains(rp) {
                    continue;
                }
                for (q, rq) in sequence.iter().enumerate() {
                    // Identical constituents: (p, q) and (q, p) are the same isoform
                    if q == p || (j == k && q < p) || !residues_k.contains(rq) {
                        continue;
                    }
                    let sites = vec![
                        Site {
                            position: p,
                            residue: *rp as char,
                            mass: mass_j,
                            terminus: None,
                        },
                        Site {
                            position: q,
                            residue: *rq as char,
                            mass: mass_k,
                            terminus: None,
                        },
                    ];
                    isoforms.push(Isoform::new(sequence, sites));
                }
            }
        }
        isoforms
    }

    /// Match theoretical fragments of `isoform` against `peaks`
    pub fn score(&self, isoform: &Isoform, peaks: &[Peak], charge: u8) -> IsoformScore {
        let mut score = IsoformScore::default();
        let max_fragment_charge = max_fragment_charge(charge);
        for kind in &self.params.ion_kinds {
            for ion in IonSeries::new(&isoform.residues, *kind) {
                for charge in 1..max_fragment_charge {
                    if let Some(peak) =
                        select_most_intense_peak(peaks, ion.mz(charge), self.params.fragment_tol)
                    {
                        match kind.is_n_terminal() {
                            true => {
                                score.matched_b += 1;
                                score.summed_b += peak.intensity;
                            }
                            false => {
                                score.matched_y += 1;
                                score.summed_y += peak.intensity;
                            }
                        }
                    }
                }
            }
        }
        score
    }

    /// Decide between the isoforms of one PSM
    pub fn localize_psm(&self, psm: &Psm, peaks: &[Peak], ix: IntervalIx) -> Outcome {
        let sequence = psm.sequence.as_bytes();
        if sequence.is_empty() || !sequence.iter().all(|r| VALID_AA.contains(r)) {
            return Outcome::NonLocalized(Reason::InvalidSequence);
        }

        let mut scored = self
            .isoforms(sequence, ix)
            .into_iter()
            .filter_map(|isoform| {
                let score = self.score(&isoform, peaks, psm.charge);
                match score.matched() >= self.params.min_matched_peaks {
                    true => Some((isoform, score.hyperscore())),
                    false => None,
                }
            })
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut scored = scored.into_iter();
        match (scored.next(), scored.next()) {
            (None, _) => Outcome::NonLocalized(Reason::NoScoreableIsoform),
            (Some((best, score)), None) => Outcome::Localized {
                sites: best.sites,
                score,
                margin: None,
            },
            (Some((best, score)), Some((_, runner_up))) => {
                let margin = score - runner_up;
                match margin > SCORE_EPSILON {
                    true => Outcome::Localized {
                        sites: best.sites,
                        score,
                        margin: Some(margin),
                    },
                    false => Outcome::NonLocalized(Reason::Ambiguous),
                }
            }
        }
    }

    /// Localize every accepted PSM of every accepted interval other than the
    /// reference. Per-PSM results are in interval, then PSM order
    pub fn localize(&self, psms: &[Psm]) -> (Vec<Localization>, Vec<LocalizationSummary>) {
        let jobs = self
            .intervals
            .accepted()
            .filter(|(ix, _)| Some(*ix) != self.intervals.reference)
            .flat_map(|(ix, interval)| interval.psms.iter().map(move |&psm| (ix, psm)))
            .collect::<Vec<_>>();

        let results = jobs
            .par_iter()
            .map(|&(ix, idx)| {
                let psm = &psms[idx];
                let spectrum = self.spectra.get(&psm.spectrum)?;
                Some(Localization {
                    psm: idx,
                    spectrum: psm.spectrum.clone(),
                    peptide: psm.sequence.clone(),
                    interval: ix,
                    outcome: self.localize_psm(psm, spectrum.peaks(), ix),
                })
            })
            .collect::<Vec<_>>();

        let mut summaries: BTreeMap<IntervalIx, LocalizationSummary> = BTreeMap::new();
        for (ix, _) in &jobs {
            summaries.entry(*ix).or_insert_with(|| LocalizationSummary {
                interval: *ix,
                ..Default::default()
            });
        }

        let mut localizations = Vec::with_capacity(results.len());
        for ((ix, _), result) in jobs.iter().zip(results) {
            let summary = summaries.entry(*ix).or_default();
            match &result {
                None => summary.no_spectrum += 1,
                Some(Localization {
                    outcome: Outcome::Localized { sites, .. },
                    ..
                }) => {
                    for site in sites {
                        *summary.counts.entry(site.key()).or_default() += 1;
                    }
                }
                Some(_) => summary.non_localized += 1,
            }
            localizations.extend(result);
        }

        let summaries = summaries.into_values().collect::<Vec<_>>();
        log::info!(
            "localized {} of {} PSMs with spectra; {} PSMs have no spectrum",
            localizations
                .iter()
                .filter(|l| matches!(l.outcome, Outcome::Localized { .. }))
                .count(),
            localizations.len(),
            summaries.iter().map(|s| s.no_spectrum).sum::<usize>()
        );
        (localizations, summaries)
    }
}
