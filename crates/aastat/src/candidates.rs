//! Localization candidates for each accepted interval, with provenance

use std::collections::{BTreeMap, BTreeSet};

use fnv::FnvHashMap;
use serde::Serialize;

use crate::fdr::{IntervalIx, Intervals};
use crate::frequency::IntervalFrequencies;
use crate::mass::NEUTRON;
use crate::modification::{ModificationDatabase, Terminus, UNIMOD_TOLERANCE};
use crate::parameters::Parameters;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Unimod,
    AaStat,
    Isotope,
    ShiftSum,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub residue: char,
    pub sources: BTreeSet<Source>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IntervalCandidates {
    pub interval: IntervalIx,
    /// Sorted by residue
    pub candidates: Vec<Candidate>,
    /// Names of modifications in the database matching the interval center
    pub modifications: Vec<String>,
    /// Peptide termini that may carry the mass, from the database
    pub termini: Vec<Terminus>,
    /// Base interval and isotope index, if this interval is an isotope peak
    pub isotope_of: Option<(IntervalIx, u8)>,
    /// Pairs of intervals whose centers add up to this one
    pub sum_of: Vec<(IntervalIx, IntervalIx)>,
}

impl IntervalCandidates {
    pub fn residues(&self) -> impl Iterator<Item = u8> + '_ {
        self.candidates.iter().map(|c| c.residue as u8)
    }

    /// Residues that are candidates for this interval's own mass, i.e. not only
    /// through a shift sum
    pub fn direct_residues(&self) -> impl Iterator<Item = u8> + '_ {
        self.candidates
            .iter()
            .filter(|c| c.sources.iter().any(|s| *s != Source::ShiftSum))
            .map(|c| c.residue as u8)
    }

    pub fn contains(&self, residue: u8) -> bool {
        self.candidates.iter().any(|c| c.residue as u8 == residue)
    }
}

type ResidueSources = BTreeMap<u8, BTreeSet<Source>>;

fn add_all<I: IntoIterator<Item = u8>>(map: &mut ResidueSources, residues: I, source: Source) {
    for residue in residues {
        map.entry(residue).or_default().insert(source);
    }
}

/// Combine database, frequency, isotope and shift-sum evidence into candidate
/// residues for every accepted interval. Output is in ascending center order
pub fn resolve(
    intervals: &Intervals,
    frequencies: &[IntervalFrequencies],
    database: &ModificationDatabase,
    params: &Parameters,
) -> Vec<IntervalCandidates> {
    let accepted = intervals
        .accepted()
        .map(|(ix, interval)| (ix, interval.center))
        .collect::<Vec<_>>();
    let aa_stat = frequencies
        .iter()
        .map(|f| (f.interval, f.candidates().collect::<Vec<_>>()))
        .collect::<FnvHashMap<_, _>>();

    // Database and frequency candidates
    let mut modifications = Vec::with_capacity(accepted.len());
    let mut termini = Vec::with_capacity(accepted.len());
    let mut direct = Vec::with_capacity(accepted.len());
    for (ix, center) in &accepted {
        let (residues, names) = database.residues(*center, UNIMOD_TOLERANCE);
        termini.push(database.termini(*center, UNIMOD_TOLERANCE));
        let mut map = ResidueSources::new();
        add_all(&mut map, residues, Source::Unimod);
        if let Some(residues) = aa_stat.get(ix) {
            add_all(&mut map, residues.iter().copied(), Source::AaStat);
        }
        modifications.push(names);
        direct.push(map);
    }

    // Isotope peaks inherit the candidates of their base peak
    let mut isotope_of = vec![None; accepted.len()];
    let mut inherited = direct.clone();
    for (i, (_, ci)) in accepted.iter().enumerate() {
        let base = accepted.iter().enumerate().find_map(|(j, (_, cj))| {
            if i == j {
                return None;
            }
            (1..=params.max_isotope_error)
                .find(|k| (ci - cj - *k as f64 * NEUTRON).abs() <= params.isotope_tolerance)
                .map(|k| (j, k))
        });
        if let Some((j, k)) = base {
            isotope_of[i] = Some((accepted[j].0, k));
            let residues = direct[j].keys().copied().collect::<Vec<_>>();
            add_all(&mut inherited[i], residues, Source::Isotope);
            let base = termini[j].clone();
            termini[i].extend(base);
            termini[i].sort_unstable();
            termini[i].dedup();
        }
    }

    // Shift sums gain the candidates of both constituents
    let mut resolved = inherited.clone();
    let mut sum_of = vec![Vec::new(); accepted.len()];
    for (i, (_, ci)) in accepted.iter().enumerate() {
        let eligible = |j: usize| j != i && Some(accepted[j].0) != intervals.reference;
        for j in (0..accepted.len()).filter(|&j| eligible(j)) {
            for k in (j..accepted.len()).filter(|&k| eligible(k)) {
                let (cj, ck) = (accepted[j].1, accepted[k].1);
                if (cj + ck - ci).abs() <= params.isotope_tolerance {
                    sum_of[i].push((accepted[j].0, accepted[k].0));
                    let residues = inherited[j]
                        .keys()
                        .chain(inherited[k].keys())
                        .copied()
                        .collect::<Vec<_>>();
                    add_all(&mut resolved[i], residues, Source::ShiftSum);
                }
            }
        }
    }

    let candidates = accepted
        .iter()
        .zip(resolved)
        .zip(modifications.into_iter().zip(termini))
        .zip(isotope_of.into_iter().zip(sum_of))
        .map(
            |((((ix, _), residues), (modifications, termini)), (isotope_of, sum_of))| IntervalCandidates {
                interval: *ix,
                candidates: residues
                    .into_iter()
                    .map(|(residue, sources)| Candidate {
                        residue: residue as char,
                        sources,
                    })
                    .collect(),
                modifications,
                termini,
                isotope_of,
                sum_of,
            },
        )
        .collect::<Vec<_>>();

    log::info!(
        "resolved candidates: {} isotope peaks, {} shift sums",
        candidates.iter().filter(|c| c.isotope_of.is_some()).count(),
        candidates.iter().filter(|c| !c.sum_of.is_empty()).count()
    );
    candidates
}
