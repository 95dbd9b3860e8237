//! Group-specific target/decoy FDR filtering of the PSMs under each fitted peak

use std::ops::Index;

use fnv::FnvHashSet;
use rayon::prelude::*;
use serde::Serialize;

use crate::fit::PeakFit;
use crate::histogram::Histogram;
use crate::parameters::Parameters;
use crate::psm::Psm;

/// Index into the interval arena
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IntervalIx(pub u32);

impl IntervalIx {
    pub fn new(idx: usize) -> Self {
        IntervalIx(idx as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalStatus {
    Accepted,
    Rejected,
}

#[derive(Clone, Debug, Serialize)]
pub struct Interval {
    /// `None` for a reference interval built around zero without a fit
    pub fit: Option<PeakFit>,
    /// Fitted peak center, Da
    pub center: f64,
    /// Mass bounds of the window (left edge of the first bin, right edge of the last)
    pub lower: f64,
    pub upper: f64,
    /// PSMs passing the FDR filter, as indices into the input
    #[serde(skip)]
    pub psms: Vec<usize>,
    pub targets: usize,
    pub decoys: usize,
    /// Achieved `decoys / targets` of the accepted subset
    pub fdr: f64,
    pub status: IntervalStatus,
}

impl Interval {
    pub fn is_accepted(&self) -> bool {
        self.status == IntervalStatus::Accepted
    }

    /// Number of accepted PSMs
    pub fn len(&self) -> usize {
        self.psms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psms.is_empty()
    }
}

/// All intervals in ascending center order, and the reference interval
#[derive(Clone, Debug, Default, Serialize)]
pub struct Intervals {
    pub intervals: Vec<Interval>,
    pub reference: Option<IntervalIx>,
}

impl Index<IntervalIx> for Intervals {
    type Output = Interval;

    fn index(&self, index: IntervalIx) -> &Self::Output {
        &self.intervals[index.index()]
    }
}

impl Intervals {
    /// Filter the PSMs of every fit in parallel, and select the reference interval
    pub fn build(fits: &[PeakFit], histogram: &Histogram, psms: &[Psm], params: &Parameters) -> Self {
        let mut intervals = fits
            .par_iter()
            .map(|fit| filter(fit, histogram, psms, params))
            .collect::<Vec<_>>();
        if params.separate_reference() {
            intervals.push(zero_interval(histogram, psms, params));
        }
        intervals.sort_by(|a, b| a.center.total_cmp(&b.center));

        let reference = intervals
            .iter()
            .enumerate()
            .filter(|(_, interval)| {
                interval.is_accepted() && interval.center.abs() <= params.zero_window
            })
            .min_by(|(_, a), (_, b)| a.center.abs().total_cmp(&b.center.abs()))
            .map(|(idx, _)| IntervalIx::new(idx));

        let accepted = intervals.iter().filter(|i| i.is_accepted()).count();
        log::info!(
            "{} of {} intervals pass FDR filtering",
            accepted,
            intervals.len()
        );
        match reference {
            Some(ix) => log::info!(
                "reference interval at {:+.4} Da with {} PSMs",
                intervals[ix.index()].center,
                intervals[ix.index()].len()
            ),
            None => log::warn!(
                "no accepted interval within {} Da of zero, normalized frequencies are undefined",
                params.zero_window
            ),
        }

        Intervals {
            intervals,
            reference,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntervalIx, &Interval)> {
        self.intervals
            .iter()
            .enumerate()
            .map(|(idx, interval)| (IntervalIx::new(idx), interval))
    }

    pub fn accepted(&self) -> impl Iterator<Item = (IntervalIx, &Interval)> {
        self.iter().filter(|(_, interval)| interval.is_accepted())
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Length, targets and decoys of the longest prefix of `decoys` whose
/// `decoys / targets` is at most `bound`
pub fn longest_passing_prefix<I>(decoys: I, bound: f64) -> Option<(usize, usize, usize)>
where
    I: IntoIterator<Item = bool>,
{
    let mut target = 0;
    let mut decoy = 0;
    let mut best = None;
    for (idx, is_decoy) in decoys.into_iter().enumerate() {
        match is_decoy {
            true => decoy += 1,
            false => target += 1,
        }
        if target > 0 && decoy as f64 / target as f64 <= bound {
            best = Some((idx + 1, target, decoy));
        }
    }
    best
}

/// Sort `members` best score first, keep the best scoring PSM of each peptide
/// and cut at the longest prefix passing the FDR bound
fn filter_members(
    mut members: Vec<usize>,
    psms: &[Psm],
    params: &Parameters,
) -> Option<(Vec<usize>, usize, usize)> {
    // Members are pushed in input order per bin; restore global input order
    // so that the stable sort below breaks ties by input position
    members.sort_unstable();
    match params.lower_score_is_better {
        true => members.sort_by(|&a, &b| psms[a].score.total_cmp(&psms[b].score)),
        false => members.sort_by(|&a, &b| psms[b].score.total_cmp(&psms[a].score)),
    }

    let mut seen = FnvHashSet::default();
    members.retain(|&m| seen.insert(psms[m].sequence.as_str()));

    let (k, targets, decoys) =
        longest_passing_prefix(members.iter().map(|&m| psms[m].decoy), params.fdr_bound())?;
    members.truncate(k);
    Some((members, targets, decoys))
}

fn interval(
    fit: Option<PeakFit>,
    center: f64,
    (lower, upper): (f64, f64),
    members: Vec<usize>,
    psms: &[Psm],
    params: &Parameters,
) -> Interval {
    match filter_members(members, psms, params) {
        Some((members, targets, decoys)) => {
            log::debug!(
                "interval {:+.4}: {} targets, {} decoys",
                center,
                targets,
                decoys
            );
            Interval {
                fit,
                center,
                lower,
                upper,
                psms: members,
                targets,
                decoys,
                fdr: decoys as f64 / targets as f64,
                status: IntervalStatus::Accepted,
            }
        }
        None => {
            log::debug!("interval {:+.4}: no PSMs pass FDR filtering", center);
            Interval {
                fit,
                center,
                lower,
                upper,
                psms: Vec::new(),
                targets: 0,
                decoys: 0,
                fdr: 0.0,
                status: IntervalStatus::Rejected,
            }
        }
    }
}

/// Target/decoy filtering of the PSMs in the bin range of `fit`
pub fn filter(fit: &PeakFit, histogram: &Histogram, psms: &[Psm], params: &Parameters) -> Interval {
    let (lo, hi) = fit.bins;
    let members = histogram.bins[lo..=hi]
        .iter()
        .flat_map(|bin| bin.members.iter().copied())
        .collect::<Vec<_>>();
    let bounds = (histogram.bins[lo].left, histogram.bins[hi].right());
    interval(Some(*fit), fit.center, bounds, members, psms, params)
}

/// Target/decoy filtering of the PSMs within half a fit window of zero. Used
/// as the reference when the analyzed window excludes zero
pub fn zero_interval(histogram: &Histogram, psms: &[Psm], params: &Parameters) -> Interval {
    let half = (params.half_window as f64 + 0.5) * params.bin_width;
    let members = histogram
        .shifts
        .iter()
        .enumerate()
        .filter(|(_, shift)| shift.abs() <= half)
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    interval(None, 0.0, (-half, half), members, psms, params)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fit::FitStatus;
    use crate::parameters::Builder;

    fn parameters(correction: bool) -> Parameters {
        Builder {
            bin_width: Some(0.001),
            open_search_range: Some((-1.0, 20.0)),
            fdr: Some(0.02),
            fdr_correction: Some(correction),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    fn psm(sequence: String, mass_shift: f64, score: f64, decoy: bool) -> Psm {
        Psm {
            sequence,
            mass_shift,
            score,
            decoy,
            ..Default::default()
        }
    }

    /// `targets` high scoring targets, followed by `decoys` low scoring decoys
    fn filtered(targets: usize, decoys: usize, params: &Parameters) -> (Interval, Vec<Psm>) {
        let mut psms = (0..targets)
            .map(|i| psm(format!("PEPT{}K", i), 15.9943, 100.0 - i as f64 * 0.01, false))
            .collect::<Vec<_>>();
        psms.extend(
            (0..decoys).map(|i| psm(format!("DECOY{}K", i), 15.9943, 10.0 - i as f64, true)),
        );

        let histogram = Histogram::new(psms.iter().map(|p| p.mass_shift).collect(), params);
        let c = histogram.bin_index(15.9943).unwrap();
        let fit = PeakFit {
            center: 15.9943,
            amplitude: 505.0,
            sigma: 0.001,
            center_error: 0.0,
            amplitude_error: 0.0,
            sigma_error: 0.0,
            status: FitStatus::Passed,
            bins: (c - params.half_window, c + params.half_window),
        };
        assert_eq!(fit.bins.1 - fit.bins.0, 2 * params.half_window);
        (filter(&fit, &histogram, &psms, params), psms)
    }

    #[test]
    fn accepts_full_set() {
        let params = parameters(false);
        let (interval, _) = filtered(500, 5, &params);
        assert!(interval.is_accepted());
        assert_eq!(interval.len(), 505);
        assert_eq!((interval.targets, interval.decoys), (500, 5));
        assert!((interval.fdr - 0.01).abs() < 1e-12);

        let (interval, _) = filtered(500, 6, &params);
        assert_eq!(interval.len(), 506);
    }

    #[test]
    fn trims_prefix() {
        let params = parameters(false);
        let (interval, psms) = filtered(500, 11, &params);
        assert!(interval.is_accepted());
        assert_eq!((interval.targets, interval.decoys), (500, 10));
        assert!(interval.decoys as f64 / interval.targets as f64 <= 0.02);
        assert_eq!(interval.len(), 510);
        // The lowest scoring decoy was cut
        assert!(interval.psms.iter().all(|&m| psms[m].score > 0.5));

        // With correction the bound doubles
        let params = parameters(true);
        let (interval, _) = filtered(500, 11, &params);
        assert_eq!(interval.len(), 511);
    }

    #[test]
    fn maximal_prefix() {
        let flags = [false, true, false, false, true, true, false, true, true];
        // 2/3 and 3/3 fail, and so does 3/4 once a target is added back
        assert_eq!(longest_passing_prefix(flags, 0.5), Some((4, 3, 1)));
        assert_eq!(longest_passing_prefix(flags, 0.75), Some((7, 4, 3)));

        assert_eq!(longest_passing_prefix([true, true], 0.5), None);
        assert_eq!(longest_passing_prefix(Vec::new(), 0.5), None);
    }

    #[test]
    fn rejected_interval() {
        let params = parameters(false);
        let (interval, _) = filtered(0, 5, &params);
        assert_eq!(interval.status, IntervalStatus::Rejected);
        assert!(interval.is_empty());
        assert_eq!(interval.targets, 0);
    }

    #[test]
    fn lower_score_is_better() {
        let params = Parameters {
            lower_score_is_better: true,
            ..parameters(false)
        };
        // Decoys have the lowest scores, and are now ranked first
        let (interval, _) = filtered(500, 11, &params);
        assert_eq!(interval.status, IntervalStatus::Rejected);
    }

    #[test]
    fn best_psm_per_peptide() {
        let params = parameters(false);
        // Twenty PSMs of one peptide count once, with its best score
        let mut psms = (0..20)
            .map(|i| psm("SAMGEAR".into(), 15.9943, 50.0 - i as f64, false))
            .collect::<Vec<_>>();
        psms.extend((0..49).map(|i| psm(format!("PEPT{}K", i), 15.9943, 40.0, false)));
        psms.push(psm("DECOYK".into(), 15.9943, 1.0, true));
        psms.push(psm("DECOYK".into(), 15.9943, 0.5, true));

        let members = (0..psms.len()).collect::<Vec<_>>();
        let (kept, targets, decoys) = filter_members(members, &psms, &params).unwrap();
        assert_eq!((targets, decoys), (50, 1));
        assert_eq!(kept.len(), 51);
        assert_eq!(kept[0], 0);
        assert_eq!(kept.iter().filter(|&&m| psms[m].sequence == "SAMGEAR").count(), 1);
        assert_eq!(kept[50], 69);
    }

    #[test]
    fn zero_reference_outside_of_window() {
        let params = Parameters {
            specific_window: Some((15.9, 16.1)),
            ..parameters(false)
        };
        let mut psms = (0..100)
            .map(|i| psm(format!("PEPT{}K", i), 0.0001 * (i % 5) as f64, 50.0, false))
            .collect::<Vec<_>>();
        psms.push(psm("DECOYK".into(), 0.0, 1.0, true));
        psms.push(psm("FAR".into(), 0.5, 50.0, false));
        let histogram = Histogram::build(&psms, &params);
        assert_eq!(histogram.binned(), 0);

        let intervals = Intervals::build(&[], &histogram, &psms, &params);
        assert_eq!(intervals.len(), 1);
        let reference = intervals.reference.unwrap();
        let zero = &intervals[reference];
        assert!(zero.fit.is_none());
        assert_eq!(zero.center, 0.0);
        assert_eq!((zero.targets, zero.decoys), (100, 1));
    }
}
