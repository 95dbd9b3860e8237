use std::path::{Path, PathBuf};
use std::time::Instant;

use aastat_core::analysis::{Analysis, AnalysisResults};
use aastat_core::modification::{Modification, ModificationDatabase};
use aastat_core::psm::{is_decoy, Psm};
use aastat_core::spectrum::{Spectrum, SpectrumIndex};
use anyhow::{bail, ensure, Context};
use log::info;
use serde::Serialize;

use crate::input::{Columns, Settings, SpectrumRecord};

pub struct Runner {
    pub parameters: Settings,
    start: Instant,
}

/// Contents of `results.json`
#[derive(Serialize)]
struct Report<'a> {
    settings: &'a Settings,
    results: &'a AnalysisResults,
}

/// Residue letters of a peptide, dropping modification annotations such as
/// `M[+15.99]` or `n[42]`
pub fn normalize_sequence(peptide: &str) -> String {
    let peptide = peptide.trim();
    // Flanking residues, e.g. `K.PEPTIDE.R`
    let bytes = peptide.as_bytes();
    let peptide = match bytes.len() > 4 && bytes[1] == b'.' && bytes[bytes.len() - 2] == b'.' {
        true => &peptide[2..peptide.len() - 2],
        false => peptide,
    };
    let mut sequence = String::with_capacity(peptide.len());
    let mut depth = 0usize;
    for c in peptide.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            c if depth == 0 && c.is_ascii_uppercase() => sequence.push(c),
            _ => {}
        }
    }
    sequence
}

fn parse_decoy(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "-1" | "decoy" | "yes" => Some(true),
        "false" | "0" | "target" | "no" => Some(false),
        _ => None,
    }
}

fn delimiter<P: AsRef<Path>>(path: P) -> u8 {
    match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

/// Column deciding whether a PSM is a decoy
#[derive(Copy, Clone)]
enum Label {
    Flag(usize),
    Proteins(usize),
}

/// Read a delimited PSM table with a header row. `.csv` files are comma
/// separated, everything else is tab separated
pub fn read_psm_table<P: AsRef<Path>>(
    path: P,
    columns: &Columns,
    decoy_prefix: &str,
) -> anyhow::Result<Vec<Psm>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter(path))
        .from_path(path)?;

    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let required = |name: &str| {
        column(name).with_context(|| format!("missing column `{}` in `{}`", name, path.display()))
    };

    let peptide = required(&columns.peptide)?;
    let mass_shift = required(&columns.mass_shift)?;
    let score = required(&columns.score)?;
    let spectrum = required(&columns.spectrum)?;
    let charge = column(&columns.charge);
    // An explicit decoy flag wins over protein accessions
    let label = match (column(&columns.decoy), column(&columns.proteins)) {
        (Some(idx), _) => Label::Flag(idx),
        (None, Some(idx)) => Label::Proteins(idx),
        (None, None) => bail!(
            "`{}` needs either a `{}` or a `{}` column",
            path.display(),
            columns.decoy,
            columns.proteins
        ),
    };

    let mut psms = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |idx: usize| record.get(idx).unwrap_or_default().trim();
        let float = |idx: usize| {
            field(idx).parse::<f64>().with_context(|| {
                format!("line {}: invalid number `{}`", line, field(idx))
            })
        };

        let decoy = match label {
            Label::Flag(idx) => match parse_decoy(field(idx)) {
                Some(flag) => flag,
                None => bail!("line {}: invalid decoy flag `{}`", line, field(idx)),
            },
            Label::Proteins(idx) => {
                let accessions = field(idx)
                    .split(columns.protein_delimiter)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>();
                is_decoy(&accessions, decoy_prefix)
            }
        };

        psms.push(Psm {
            sequence: normalize_sequence(field(peptide)),
            mass_shift: float(mass_shift)?,
            score: float(score)?,
            decoy,
            spectrum: field(spectrum).to_string(),
            charge: match charge {
                Some(idx) => field(idx)
                    .trim_end_matches('+')
                    .parse()
                    .with_context(|| format!("line {}: invalid charge `{}`", line, field(idx)))?,
                None => 2,
            },
        });
    }
    Ok(psms)
}

impl Runner {
    pub fn new(parameters: Settings) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    // Create a path for `file_name` in the output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn read_psms(&self) -> anyhow::Result<Vec<Psm>> {
        let mut psms = Vec::new();
        for path in &self.parameters.psm_paths {
            let start = Instant::now();
            let table = read_psm_table(
                path,
                &self.parameters.columns,
                &self.parameters.parameters.decoy_prefix,
            )
            .with_context(|| format!("Failed to read PSMs from `{path}`"))?;
            info!(
                "- read {} PSMs from {} in {} ms",
                table.len(),
                path,
                start.elapsed().as_millis()
            );
            psms.extend(table);
        }
        Ok(psms)
    }

    pub fn read_spectra(&self) -> anyhow::Result<Option<SpectrumIndex>> {
        let path = match &self.parameters.spectra_path {
            Some(path) => path,
            None => return Ok(None),
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read spectra from `{path}`"))?;
        let records: Vec<SpectrumRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse spectra from `{path}`"))?;

        let mut spectra = SpectrumIndex::default();
        for record in records {
            ensure!(
                record.mz.len() == record.intensity.len(),
                "spectrum `{}`: {} m/z values but {} intensities",
                record.id,
                record.mz.len(),
                record.intensity.len()
            );
            spectra.insert(Spectrum::from_arrays(
                record.id,
                &record.mz,
                &record.intensity,
            ));
        }
        info!("- read {} spectra", spectra.len());
        Ok(Some(spectra))
    }

    pub fn read_modifications(&self) -> anyhow::Result<ModificationDatabase> {
        match &self.parameters.modifications_path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read modifications from `{path}`"))?;
                let modifications: Vec<Modification> = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse modifications from `{path}`"))?;
                Ok(ModificationDatabase::new(modifications))
            }
            None => Ok(ModificationDatabase::builtin()),
        }
    }

    pub fn run(mut self) -> anyhow::Result<Settings> {
        let psms = self.read_psms()?;
        ensure!(!psms.is_empty(), "no PSMs to analyze");
        info!(
            "analyzing {} PSMs ({} decoys)",
            psms.len(),
            psms.iter().filter(|psm| psm.decoy).count()
        );
        let spectra = self.read_spectra()?;
        let database = self.read_modifications()?;

        let results = Analysis::run(
            &psms,
            spectra.as_ref(),
            &database,
            &self.parameters.parameters,
        );
        log::trace!("writing outputs");

        let mut outputs = vec![
            self.write_histogram(&results)?,
            self.write_fits(&results)?,
            self.write_intervals(&results)?,
            self.write_frequencies(&results)?,
        ];
        if spectra.is_some() {
            outputs.push(self.write_localization_summary(&results)?);
            outputs.push(self.write_localizations(&results, &psms)?);
        }
        self.parameters.output_paths.extend(outputs);

        let path = self.make_path("results.json");
        self.parameters.output_paths.push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let report = Report {
            settings: &self.parameters,
            results: &results,
        };
        let bytes = serde_json::to_vec_pretty(&report)?;
        std::fs::write(&path, bytes)?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}
