//! Amino acid occurrence statistics of the peptides in each interval,
//! normalized against the reference interval

use fnv::{FnvHashMap, FnvHashSet};
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::enzyme::Enzyme;
use crate::fdr::{IntervalIx, Intervals};
use crate::parameters::Parameters;
use crate::psm::Psm;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enrichment {
    Enriched,
    Depleted,
    Unchanged,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AaFrequency {
    pub residue: char,
    /// Occurrences across distinct fully cleaved peptides
    pub count: usize,
    /// `count` divided by the number of residues in distinct cleaved peptides
    pub frequency: f64,
    /// Frequency relative to the reference interval, `None` if undefined
    pub normalized: Option<f64>,
    pub p_value: Option<f64>,
    /// Percentage of distinct peptides containing the residue
    pub peptide_percentage: f64,
    pub enrichment: Option<Enrichment>,
    /// Normalized frequency exceeds the candidate threshold
    pub candidate: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct IntervalFrequencies {
    pub interval: IntervalIx,
    pub peptides: usize,
    pub frequencies: Vec<AaFrequency>,
}

impl IntervalFrequencies {
    /// Residues flagged as localization candidates
    pub fn candidates(&self) -> impl Iterator<Item = u8> + '_ {
        self.frequencies
            .iter()
            .filter(|f| f.candidate)
            .map(|f| f.residue as u8)
    }
}

/// Residue counts over a set of distinct peptide sequences. Residues are
/// counted over the distinct pieces left after cleaving every peptide with
/// `enzyme`, peptide percentages over the uncleaved peptides
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composition {
    pub peptides: usize,
    pub residues: usize,
    counts: FnvHashMap<u8, usize>,
    containing: FnvHashMap<u8, usize>,
}

impl Composition {
    pub fn new<'s, I>(sequences: I, enzyme: Option<&Enzyme>) -> Self
    where
        I: IntoIterator<Item = &'s str>,
    {
        let distinct = sequences.into_iter().collect::<FnvHashSet<_>>();
        let mut composition = Composition::default();
        let mut pieces = FnvHashSet::default();
        for &sequence in &distinct {
            composition.peptides += 1;
            let mut seen = FnvHashSet::default();
            for residue in sequence.bytes() {
                if seen.insert(residue) {
                    *composition.containing.entry(residue).or_default() += 1;
                }
            }
            match enzyme {
                Some(enzyme) => pieces.extend(enzyme.cleave(sequence)),
                None => {
                    pieces.insert(sequence);
                }
            }
        }
        for piece in pieces {
            for residue in piece.bytes() {
                composition.residues += 1;
                *composition.counts.entry(residue).or_default() += 1;
            }
        }
        composition
    }

    pub fn count(&self, residue: u8) -> usize {
        self.counts.get(&residue).copied().unwrap_or_default()
    }

    pub fn frequency(&self, residue: u8) -> f64 {
        match self.residues {
            0 => 0.0,
            n => self.count(residue) as f64 / n as f64,
        }
    }

    pub fn peptide_percentage(&self, residue: u8) -> f64 {
        match self.peptides {
            0 => 0.0,
            n => 100.0 * self.containing.get(&residue).copied().unwrap_or_default() as f64 / n as f64,
        }
    }
}

/// Two-sided two-proportion z-test with pooled variance
pub fn two_proportion_p_value(x1: usize, n1: usize, x2: usize, n2: usize) -> Option<f64> {
    if n1 == 0 || n2 == 0 {
        return None;
    }
    let (x1, n1, x2, n2) = (x1 as f64, n1 as f64, x2 as f64, n2 as f64);
    let pooled = (x1 + x2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if !(se > 0.0) {
        return Some(1.0);
    }
    let z = (x1 / n1 - x2 / n2) / se;
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some((2.0 * normal.sf(z.abs())).min(1.0))
}

fn statistics(
    composition: &Composition,
    reference: Option<&Composition>,
    params: &Parameters,
) -> Vec<AaFrequency> {
    params
        .labels
        .iter()
        .map(|&residue| {
            let count = composition.count(residue);
            let frequency = composition.frequency(residue);

            let reference = reference.filter(|r| r.count(residue) > 0);
            let normalized = reference.map(|r| frequency / r.frequency(residue));
            let p_value = reference.and_then(|r| {
                two_proportion_p_value(count, composition.residues, r.count(residue), r.residues)
            });
            let enrichment = match (normalized, p_value) {
                (Some(n), Some(p)) if p < params.p_value_threshold && n > 1.0 => {
                    Some(Enrichment::Enriched)
                }
                (Some(n), Some(p)) if p < params.p_value_threshold && n < 1.0 => {
                    Some(Enrichment::Depleted)
                }
                (Some(_), _) => Some(Enrichment::Unchanged),
                (None, _) => None,
            };

            AaFrequency {
                residue: residue as char,
                count,
                frequency,
                normalized,
                p_value,
                peptide_percentage: composition.peptide_percentage(residue),
                enrichment,
                candidate: normalized.map_or(false, |n| n > params.frequency_threshold),
            }
        })
        .collect()
}

fn composition(interval: &crate::fdr::Interval, psms: &[Psm], params: &Parameters) -> Composition {
    Composition::new(
        interval.psms.iter().map(|&m| psms[m].sequence.as_str()),
        params.cleavage_rule.as_ref(),
    )
}

/// Frequency records for every accepted interval, in interval order
pub fn analyze(intervals: &Intervals, psms: &[Psm], params: &Parameters) -> Vec<IntervalFrequencies> {
    let reference = intervals
        .reference
        .map(|ix| composition(&intervals[ix], psms, params));

    let accepted = intervals.accepted().collect::<Vec<_>>();
    let frequencies = accepted
        .par_iter()
        .map(|(ix, interval)| {
            let composition = composition(interval, psms, params);
            IntervalFrequencies {
                interval: *ix,
                peptides: composition.peptides,
                frequencies: statistics(&composition, reference.as_ref(), params),
            }
        })
        .collect::<Vec<_>>();

    log::info!(
        "computed residue statistics for {} intervals",
        frequencies.len()
    );
    frequencies
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> Parameters {
        crate::parameters::Builder {
            labels: Some("ACKM".into()),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    #[test]
    fn composition_counts_distinct_peptides() {
        let c = Composition::new(["MAK", "MAK", "CMMK", "AK"], None);
        assert_eq!(c.peptides, 3);
        assert_eq!(c.residues, 9);
        assert_eq!(c.count(b'M'), 3);
        assert_eq!(c.count(b'K'), 3);
        assert_eq!(c.count(b'W'), 0);
        assert!((c.frequency(b'A') - 2.0 / 9.0).abs() < 1e-12);
        assert!((c.peptide_percentage(b'M') - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(c.peptide_percentage(b'K'), 100.0);
    }

    #[test]
    fn composition_of_cleaved_peptides() {
        let trypsin = crate::enzyme::Enzyme::new("KR", Some('P'), true)
            .unwrap()
            .unwrap();
        // AKMK and MK share the MK piece, AKPR is not cut before P
        let c = Composition::new(["AKMK", "MK", "AKPR"], Some(&trypsin));
        assert_eq!(c.peptides, 3);
        assert_eq!(c.residues, 8);
        assert_eq!(c.count(b'K'), 3);
        assert_eq!(c.count(b'M'), 1);
        assert!((c.peptide_percentage(b'M') - 200.0 / 3.0).abs() < 1e-9);

        let uncleaved = Composition::new(["AKMK", "MK", "AKPR"], None);
        assert_eq!(uncleaved.residues, 10);
        assert_eq!(uncleaved.count(b'M'), 2);
    }

    #[test]
    fn reference_against_itself() {
        let params = params();
        let c = Composition::new(["MAK", "CMMK", "AK", "AAAK"], None);
        let stats = statistics(&c, Some(&c), &params);
        for s in &stats {
            assert_eq!(s.normalized, Some(1.0), "{:?}", s);
            assert_eq!(s.p_value, Some(1.0));
            assert_eq!(s.enrichment, Some(Enrichment::Unchanged));
            assert!(!s.candidate);
        }
    }

    #[test]
    fn undefined_normalization() {
        let params = params();
        let reference = Composition::new(["AAK", "AK"], None);
        let c = Composition::new(["MMK", "CMK"], None);
        let stats = statistics(&c, Some(&reference), &params);
        let m = stats.iter().find(|s| s.residue == 'M').unwrap();
        assert_eq!(m.count, 3);
        assert_eq!(m.normalized, None);
        assert_eq!(m.p_value, None);
        assert_eq!(m.enrichment, None);
        assert!(!m.candidate);

        let k = stats.iter().find(|s| s.residue == 'K').unwrap();
        // 2/6 against 2/5
        assert!((k.normalized.unwrap() - (2.0 / 6.0) / (2.0 / 5.0)).abs() < 1e-12);

        // No reference at all
        let stats = statistics(&c, None, &params);
        assert!(stats.iter().all(|s| s.normalized.is_none() && s.p_value.is_none()));
    }

    #[test]
    fn enrichment() {
        let params = params();
        // 50 distinct sequences each, methionine rich against methionine poor
        let seqs = (0..200)
            .map(|i| format!("{}MMMMK", "A".repeat(1 + i % 50)))
            .collect::<Vec<_>>();
        let reference_seqs = (0..200)
            .map(|i| format!("{}MK", "A".repeat(8 + i % 50)))
            .collect::<Vec<_>>();

        let c = Composition::new(seqs.iter().map(String::as_str), None);
        let r = Composition::new(reference_seqs.iter().map(String::as_str), None);
        let stats = statistics(&c, Some(&r), &params);
        let m = stats.iter().find(|s| s.residue == 'M').unwrap();
        assert_eq!(m.enrichment, Some(Enrichment::Enriched));
        assert!(m.p_value.unwrap() < 1e-6);
        assert!(m.candidate);

        let a = stats.iter().find(|s| s.residue == 'A').unwrap();
        assert_eq!(a.enrichment, Some(Enrichment::Depleted));
        assert!(!a.candidate);
    }

    #[test]
    fn p_values() {
        assert_eq!(two_proportion_p_value(0, 0, 1, 10), None);
        assert_eq!(two_proportion_p_value(0, 10, 0, 10), Some(1.0));
        let p = two_proportion_p_value(60, 100, 40, 100).unwrap();
        let z: f64 = 0.2 / (0.25f64 * 0.02).sqrt();
        assert!((z - 2.828).abs() < 1e-3);
        assert!((p - 0.00468).abs() < 1e-4, "{}", p);
    }
}
