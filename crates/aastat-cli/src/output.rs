use std::collections::HashMap;

use aastat_core::analysis::AnalysisResults;
use aastat_core::candidates::IntervalCandidates;
use aastat_core::fdr::{IntervalIx, IntervalStatus};
use aastat_core::fit::FitStatus;
use aastat_core::frequency::Enrichment;
use aastat_core::localization::{Outcome, Reason, Site};
use aastat_core::psm::Psm;
use rayon::prelude::*;

use crate::runner::Runner;

const NA: &[u8] = b"NA";

fn float(x: f64) -> Vec<u8> {
    match x.is_finite() {
        true => ryu::Buffer::new().format(x).as_bytes().to_vec(),
        false => NA.to_vec(),
    }
}

fn optional(x: Option<f64>) -> Vec<u8> {
    x.map(float).unwrap_or_else(|| NA.to_vec())
}

fn sites(sites: &[Site]) -> String {
    sites
        .iter()
        .map(|site| format!("{}@{}", site.key(), site.position + 1))
        .collect::<Vec<_>>()
        .join(";")
}

impl Runner {
    fn write_table(
        &self,
        file_name: &str,
        headers: &[&str],
        records: Vec<csv::ByteRecord>,
    ) -> anyhow::Result<String> {
        let path = self.make_path(file_name);

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);
        wtr.write_byte_record(&csv::ByteRecord::from(headers.to_vec()))?;
        for record in records {
            wtr.write_byte_record(&record)?;
        }
        wtr.flush()?;

        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    /// Non-empty bins of the calibrated mass shift histogram
    pub fn write_histogram(&self, results: &AnalysisResults) -> anyhow::Result<String> {
        let records = results
            .histogram
            .bins
            .iter()
            .filter(|bin| bin.count() > 0)
            .map(|bin| {
                let mut record = csv::ByteRecord::new();
                record.push_field(&float(bin.left));
                record.push_field(&float(bin.center()));
                record.push_field(itoa::Buffer::new().format(bin.count()).as_bytes());
                record
            })
            .collect();
        self.write_table("histogram.tsv", &["left", "center", "count"], records)
    }

    pub fn write_fits(&self, results: &AnalysisResults) -> anyhow::Result<String> {
        let records = results
            .fits
            .all
            .iter()
            .map(|fit| {
                let mut record = csv::ByteRecord::new();
                record.push_field(&float(fit.center));
                record.push_field(&float(fit.amplitude));
                record.push_field(&float(fit.sigma));
                record.push_field(&float(fit.center_error));
                record.push_field(&float(fit.amplitude_error));
                record.push_field(&float(fit.sigma_error));
                record.push_field(match fit.status {
                    FitStatus::Passed => b"PASSED",
                    FitStatus::Failed => b"FAILED",
                    FitStatus::NoFit => b"NO_FIT",
                });
                record
            })
            .collect();
        self.write_table(
            "fits.tsv",
            &[
                "center",
                "amplitude",
                "sigma",
                "center_error",
                "amplitude_error",
                "sigma_error",
                "status",
            ],
            records,
        )
    }

    /// One row per interval, with FDR counts and localization candidates
    pub fn write_intervals(&self, results: &AnalysisResults) -> anyhow::Result<String> {
        let intervals = &results.intervals;
        let candidates = results
            .candidates
            .iter()
            .map(|c| (c.interval, c))
            .collect::<HashMap<IntervalIx, &IntervalCandidates>>();
        let center = |ix: IntervalIx| float(intervals[ix].center);

        let records = intervals
            .iter()
            .map(|(ix, interval)| {
                let mut record = csv::ByteRecord::new();
                record.push_field(&float(interval.center));
                record.push_field(&float(interval.lower));
                record.push_field(&float(interval.upper));
                record.push_field(match interval.status {
                    IntervalStatus::Accepted => b"ACCEPTED",
                    IntervalStatus::Rejected => b"REJECTED",
                });
                record.push_field(itoa::Buffer::new().format(interval.targets).as_bytes());
                record.push_field(itoa::Buffer::new().format(interval.decoys).as_bytes());
                record.push_field(&float(interval.fdr));
                record.push_field(match Some(ix) == intervals.reference {
                    true => b"1",
                    false => b"0",
                });

                let c = candidates.get(&ix);
                match c.and_then(|c| c.isotope_of) {
                    Some((base, k)) => {
                        record.push_field(&center(base));
                        record.push_field(itoa::Buffer::new().format(k).as_bytes());
                    }
                    None => {
                        record.push_field(NA);
                        record.push_field(NA);
                    }
                }
                let sums = c
                    .map(|c| {
                        c.sum_of
                            .iter()
                            .map(|&(j, k)| {
                                format!("{:.4}+{:.4}", intervals[j].center, intervals[k].center)
                            })
                            .collect::<Vec<_>>()
                            .join(";")
                    })
                    .unwrap_or_default();
                record.push_field(sums.as_bytes());
                let modifications = c.map(|c| c.modifications.join(";")).unwrap_or_default();
                record.push_field(modifications.as_bytes());
                let residues = c
                    .map(|c| c.residues().map(char::from).collect::<String>())
                    .unwrap_or_default();
                record.push_field(residues.as_bytes());
                let termini = c
                    .map(|c| {
                        c.termini
                            .iter()
                            .map(|t| t.label())
                            .collect::<Vec<_>>()
                            .join(";")
                    })
                    .unwrap_or_default();
                record.push_field(termini.as_bytes());
                record
            })
            .collect();

        self.write_table(
            "intervals.tsv",
            &[
                "center",
                "lower",
                "upper",
                "status",
                "targets",
                "decoys",
                "fdr",
                "reference",
                "isotope_of",
                "isotope_index",
                "sum_of",
                "modifications",
                "candidates",
                "termini",
            ],
            records,
        )
    }

    /// Long format residue statistics: one row per interval and residue
    pub fn write_frequencies(&self, results: &AnalysisResults) -> anyhow::Result<String> {
        let records = results
            .frequencies
            .iter()
            .flat_map(|f| {
                let center = results.intervals[f.interval].center;
                f.frequencies.iter().map(move |aa| (center, aa))
            })
            .map(|(center, aa)| {
                let mut record = csv::ByteRecord::new();
                record.push_field(&float(center));
                record.push_field(aa.residue.to_string().as_bytes());
                record.push_field(itoa::Buffer::new().format(aa.count).as_bytes());
                record.push_field(&float(aa.frequency));
                record.push_field(&optional(aa.normalized));
                record.push_field(&optional(aa.p_value));
                record.push_field(&float(aa.peptide_percentage));
                record.push_field(match aa.enrichment {
                    Some(Enrichment::Enriched) => b"enriched".as_slice(),
                    Some(Enrichment::Depleted) => b"depleted",
                    Some(Enrichment::Unchanged) => b"unchanged",
                    None => NA,
                });
                record.push_field(match aa.candidate {
                    true => b"1",
                    false => b"0",
                });
                record
            })
            .collect();

        self.write_table(
            "aa_statistics.tsv",
            &[
                "interval",
                "residue",
                "count",
                "frequency",
                "normalized_frequency",
                "p_value",
                "peptide_percentage",
                "enrichment",
                "candidate",
            ],
            records,
        )
    }

    pub fn write_localization_summary(&self, results: &AnalysisResults) -> anyhow::Result<String> {
        let records = results
            .localization_summaries
            .iter()
            .map(|summary| {
                let localized = summary
                    .counts
                    .iter()
                    .map(|(key, count)| format!("{}:{}", key, count))
                    .collect::<Vec<_>>()
                    .join(";");
                let mut record = csv::ByteRecord::new();
                record.push_field(&float(results.intervals[summary.interval].center));
                record.push_field(localized.as_bytes());
                record.push_field(itoa::Buffer::new().format(summary.non_localized).as_bytes());
                record.push_field(itoa::Buffer::new().format(summary.no_spectrum).as_bytes());
                record
            })
            .collect();

        self.write_table(
            "localization.tsv",
            &["interval", "localized", "non_localized", "no_spectrum"],
            records,
        )
    }

    /// Per-PSM localization outcomes
    pub fn write_localizations(
        &self,
        results: &AnalysisResults,
        psms: &[Psm],
    ) -> anyhow::Result<String> {
        let records = results
            .localizations
            .par_iter()
            .map(|l| {
                let mut record = csv::ByteRecord::new();
                record.push_field(l.spectrum.as_bytes());
                record.push_field(l.peptide.as_bytes());
                record.push_field(itoa::Buffer::new().format(psms[l.psm].charge).as_bytes());
                record.push_field(&float(results.intervals[l.interval].center));
                match &l.outcome {
                    Outcome::Localized {
                        sites: placed,
                        score,
                        margin,
                    } => {
                        record.push_field(b"localized");
                        record.push_field(sites(placed).as_bytes());
                        record.push_field(&float(*score));
                        record.push_field(&optional(*margin));
                    }
                    Outcome::NonLocalized(reason) => {
                        record.push_field(match reason {
                            Reason::Ambiguous => b"ambiguous".as_slice(),
                            Reason::NoScoreableIsoform => b"no_scoreable_isoform",
                            Reason::InvalidSequence => b"invalid_sequence",
                        });
                        record.push_field(b"");
                        record.push_field(NA);
                        record.push_field(NA);
                    }
                }
                record
            })
            .collect::<Vec<_>>();

        self.write_table(
            "localizations.tsv",
            &[
                "spectrum",
                "peptide",
                "charge",
                "interval",
                "outcome",
                "sites",
                "score",
                "margin",
            ],
            records,
        )
    }
}
